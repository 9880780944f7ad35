//! Shared helpers for sync tests.

#![allow(dead_code)]

use ledgerlink_store::{LedgerStore, MaintenanceFlags};
use ledgerlink_sync::transport::mock::InMemoryRelay;
use ledgerlink_sync::{Identity, SyncConfig, SyncOrchestrator};
use ledgerlink_types::{
    system_tags, Account, Clock, Currency, EntityId, FixedPoint, InstallationId, Line, Sign,
    Transaction, Wallet,
};
use std::sync::Arc;

/// Reference data shared by every simulated device: one wallet, one
/// currency and two accounts with fixed ids and clocks.
#[derive(Debug, Clone)]
pub struct Fixture {
    pub wallet: Wallet,
    pub currency: Currency,
    pub checking: Account,
    pub savings: Account,
}

impl Fixture {
    pub fn new() -> Self {
        let wallet = Wallet {
            id: EntityId::new(),
            name: "Personal".into(),
            color: "#336699".into(),
            clock: Clock::new(10),
            tag_ids: vec![],
        };
        let currency = Currency {
            id: EntityId::new(),
            precision: 2,
            clock: Clock::new(10),
            tag_ids: vec![system_tags::FIAT],
            rate: None,
        };
        let account = |clock| Account {
            id: EntityId::new(),
            wallet_id: wallet.id,
            currency_id: currency.id,
            clock: Clock::new(clock),
            tag_ids: vec![],
        };
        Self {
            checking: account(11),
            savings: account(12),
            wallet,
            currency,
        }
    }

    /// Saves the reference data with the given clocks preserved.
    pub fn install(&self, store: &LedgerStore) {
        with_fixed_clocks(store, |s| {
            s.save_wallet(self.wallet.clone()).unwrap();
            s.save_currency(self.currency.clone()).unwrap();
            s.save_account(self.checking.clone()).unwrap();
            s.save_account(self.savings.clone()).unwrap();
        });
    }
}

/// Runs `f` with auto-touch off so saved records keep their given clocks.
pub fn with_fixed_clocks<T>(store: &LedgerStore, f: impl FnOnce(&LedgerStore) -> T) -> T {
    let previous = store.maintenance().replace(MaintenanceFlags {
        auto_touch: false,
        ..store.maintenance().flags()
    });
    let result = f(store);
    store.maintenance().replace(previous);
    result
}

pub fn line(account_id: EntityId, sign: Sign, amount: u64) -> Line {
    Line {
        id: EntityId::new(),
        account_id,
        tag_id: system_tags::TRANSFER,
        sign,
        magnitude: FixedPoint::from_integer(amount),
        rate: FixedPoint::from_integer(1),
    }
}

/// Moves `amount` from `from` to `to`.
pub fn transfer(from: EntityId, to: EntityId, amount: u64, clock: i64) -> Transaction {
    Transaction {
        id: EntityId::new(),
        timestamp: 1_700_000_000,
        clock: Clock::new(clock),
        counterparty_id: None,
        note: None,
        lines: vec![line(from, Sign::Negative, amount), line(to, Sign::Positive, amount)],
    }
}

/// A simulated installation talking through a shared in-memory relay.
pub struct Device {
    pub id: InstallationId,
    pub store: LedgerStore,
    pub sync: Arc<SyncOrchestrator>,
}

impl Device {
    pub fn new(relay: &InMemoryRelay, name: &str) -> Self {
        Self::with_config(relay, name, test_config())
    }

    pub fn with_config(relay: &InMemoryRelay, name: &str, config: SyncConfig) -> Self {
        let token = format!("token-{name}");
        let identity = Identity::generate(token.clone());
        let id = identity.installation_id();
        relay.register(id, &token);
        let store = LedgerStore::open_in_memory().unwrap();
        let sync = Arc::new(SyncOrchestrator::new(
            identity,
            store.clone(),
            Arc::new(relay.clone()),
            config,
        ));
        Self { id, store, sync }
    }

    pub fn public_key(&self) -> ledgerlink_crypto::PublicKey {
        self.sync.identity().public_key()
    }
}

pub fn test_config() -> SyncConfig {
    SyncConfig {
        relay_url: "http://relay.invalid".into(),
        full_history_batch_size: 100,
        sync_interval_secs: 1,
        push_debounce_ms: 50,
        ..SyncConfig::default()
    }
}
