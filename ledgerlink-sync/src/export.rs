//! Package exporter.

use crate::error::SyncResult;
use crate::package::SyncPackage;
use ledgerlink_store::{repo, Connection, LedgerStore};
use ledgerlink_types::{system_tags, Clock, InstallationId};
use tracing::debug;

/// Default number of transactions per full-history chunk.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Builds delta and full-history packages from the local ledger.
#[derive(Debug, Clone)]
pub struct PackageExporter {
    store: LedgerStore,
    sender_id: InstallationId,
}

impl PackageExporter {
    pub fn new(store: LedgerStore, sender_id: InstallationId) -> Self {
        Self { store, sender_id }
    }

    /// Everything whose clock (or deletion time) is at or after `watermark`.
    ///
    /// Reserved system tags exist on every installation and are never
    /// exported.
    pub fn export_since(&self, watermark: Clock) -> SyncResult<SyncPackage> {
        let package = self.store.read(|conn| {
            let mut package = SyncPackage::new(self.sender_id, watermark);
            fill_reference_data(conn, &mut package, watermark)?;
            package.transactions = repo::transactions_since(conn, watermark)?;
            package.deletions = repo::deletions_since(conn, watermark)?;
            Ok(package)
        })?;
        debug!(
            since = %watermark,
            records = package.record_count(),
            "exported delta package"
        );
        Ok(package)
    }

    /// The whole ledger, split into chunks of at most `batch_size`
    /// transactions.
    ///
    /// Every chunk repeats all non-transaction data so that each one imports
    /// on its own, in any order. An empty ledger still yields one chunk.
    pub fn export_full_history_chunked(&self, batch_size: usize) -> SyncResult<Vec<SyncPackage>> {
        let batch_size = batch_size.max(1);
        let (template, transactions) = self.store.read(|conn| {
            let mut template = SyncPackage::new(self.sender_id, Clock::ZERO);
            fill_reference_data(conn, &mut template, Clock::ZERO)?;
            template.deletions = repo::deletions_since(conn, Clock::ZERO)?;
            Ok((template, repo::transactions_since(conn, Clock::ZERO)?))
        })?;

        if transactions.is_empty() {
            return Ok(vec![template]);
        }

        let chunks: Vec<SyncPackage> = transactions
            .chunks(batch_size)
            .map(|batch| {
                let mut chunk = template.clone();
                chunk.transactions = batch.to_vec();
                chunk
            })
            .collect();
        debug!(
            transactions = transactions.len(),
            chunks = chunks.len(),
            "exported full history"
        );
        Ok(chunks)
    }
}

fn fill_reference_data(
    conn: &Connection,
    package: &mut SyncPackage,
    since: Clock,
) -> ledgerlink_store::StorageResult<()> {
    package.icons = repo::icons_since(conn, since)?;
    package.tags = repo::tags_since(conn, since)?
        .into_iter()
        .filter(|t| !system_tags::is_system_tag(&t.id))
        .collect();
    package.wallets = repo::wallets_since(conn, since)?;
    package.accounts = repo::accounts_since(conn, since)?;
    package.counterparties = repo::counterparties_since(conn, since)?;
    package.currencies = repo::currencies_since(conn, since)?;
    package.budgets = repo::budgets_since(conn, since)?;
    Ok(())
}
