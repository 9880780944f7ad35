//! Sync package model.

use ledgerlink_crypto::Envelope;
use ledgerlink_types::{
    Account, Budget, Clock, Counterparty, Currency, Deletion, Icon, InstallationId, Tag,
    Transaction, Wallet,
};
use serde::{Deserialize, Serialize};

/// Current package format version.
pub const PACKAGE_VERSION: u32 = 1;

/// A plaintext bundle of entity deltas from one installation.
///
/// Every record carries its id and clock; relations are inline id arrays, so
/// each package is importable on its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncPackage {
    pub version: u32,
    pub sender_id: InstallationId,
    pub created_at: Clock,
    /// Watermark this package was exported from.
    pub since: Clock,
    #[serde(default)]
    pub icons: Vec<Icon>,
    #[serde(default)]
    pub tags: Vec<Tag>,
    #[serde(default)]
    pub wallets: Vec<Wallet>,
    #[serde(default)]
    pub accounts: Vec<Account>,
    #[serde(default)]
    pub counterparties: Vec<Counterparty>,
    #[serde(default)]
    pub currencies: Vec<Currency>,
    #[serde(default)]
    pub transactions: Vec<Transaction>,
    #[serde(default)]
    pub budgets: Vec<Budget>,
    #[serde(default)]
    pub deletions: Vec<Deletion>,
}

impl SyncPackage {
    /// An empty package stamped with the current clock.
    pub fn new(sender_id: InstallationId, since: Clock) -> Self {
        Self {
            version: PACKAGE_VERSION,
            sender_id,
            created_at: Clock::now(),
            since,
            icons: Vec::new(),
            tags: Vec::new(),
            wallets: Vec::new(),
            accounts: Vec::new(),
            counterparties: Vec::new(),
            currencies: Vec::new(),
            transactions: Vec::new(),
            budgets: Vec::new(),
            deletions: Vec::new(),
        }
    }

    /// Number of records (tombstones included) in the package.
    pub fn record_count(&self) -> usize {
        self.icons.len()
            + self.tags.len()
            + self.wallets.len()
            + self.accounts.len()
            + self.counterparties.len()
            + self.currencies.len()
            + self.transactions.len()
            + self.budgets.len()
            + self.deletions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.record_count() == 0
    }
}

/// A [`SyncPackage`] sealed for a set of installations.
///
/// On the wire: `{sender_id, iv, ciphertext, recipient_keys}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedSyncPackage {
    pub sender_id: InstallationId,
    #[serde(flatten)]
    pub envelope: Envelope,
}
