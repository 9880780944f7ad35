//! Scoped bulk-merge context.
//!
//! Entering a [`MergeContext`]:
//! 1. takes the connection lock for the context's lifetime
//! 2. turns referential-integrity checks off
//! 3. suspends auto-touch, auto-balance and change notifications
//! 4. opens one SQLite transaction
//!
//! [`MergeContext::commit`] recomputes the balance of every touched account
//! and commits. Dropping the context without committing rolls back. Either
//! way, integrity checks and maintenance flags are restored on drop.

use crate::balance;
use crate::error::StorageResult;
use crate::maintenance::{Maintenance, MaintenanceFlags};
use crate::repo;
use crate::store::LedgerStore;
use ledgerlink_types::{Clock, EntityId, EntityKind};
use rusqlite::Connection;
use std::collections::BTreeSet;
use std::sync::MutexGuard;
use tracing::{debug, warn};

/// What to do with an incoming entity version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Absent locally: insert it.
    Insert,
    /// Present with an older clock: replace it.
    Update,
    /// Present with an equal or newer clock: keep the local version.
    KeepLocal,
    /// Absent locally, but a remembered tombstone is newer.
    Tombstoned,
}

impl Resolution {
    pub fn applies(self) -> bool {
        matches!(self, Resolution::Insert | Resolution::Update)
    }
}

pub struct MergeContext<'a> {
    conn: MutexGuard<'a, Connection>,
    maintenance: &'a Maintenance,
    saved: MaintenanceFlags,
    touched: BTreeSet<EntityId>,
    open: bool,
}

impl LedgerStore {
    /// Starts a bulk merge. See the module docs for what is switched off.
    pub fn begin_merge(&self) -> StorageResult<MergeContext<'_>> {
        let conn = self.lock()?;
        let maintenance = self.maintenance();
        let saved = maintenance.replace(MaintenanceFlags::SUSPENDED);
        let mut ctx = MergeContext {
            conn,
            maintenance,
            saved,
            touched: BTreeSet::new(),
            open: false,
        };
        // The pragma is a no-op inside a transaction, so it goes first.
        ctx.conn
            .execute_batch("PRAGMA foreign_keys = OFF; BEGIN IMMEDIATE;")?;
        ctx.open = true;
        debug!("merge context opened");
        Ok(ctx)
    }
}

impl MergeContext<'_> {
    /// The connection, inside the merge transaction.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Compares an incoming version against local state.
    ///
    /// Present entities are replaced only by a strictly greater clock. An
    /// absent entity is inserted unless a stored tombstone is strictly newer
    /// than the incoming clock.
    pub fn resolve(&self, kind: EntityKind, id: EntityId, incoming: Clock) -> StorageResult<Resolution> {
        match repo::clock_of(&self.conn, kind, id)? {
            Some(local) if incoming.supersedes(&local) => Ok(Resolution::Update),
            Some(_) => Ok(Resolution::KeepLocal),
            None => match repo::tombstone_of(&self.conn, kind, id)? {
                Some(deleted_at) if deleted_at.supersedes(&incoming) => Ok(Resolution::Tombstoned),
                _ => Ok(Resolution::Insert),
            },
        }
    }

    /// Marks accounts whose balance must be recomputed before commit.
    pub fn touch_accounts(&mut self, ids: impl IntoIterator<Item = EntityId>) {
        self.touched.extend(ids);
    }

    pub fn touched_accounts(&self) -> &BTreeSet<EntityId> {
        &self.touched
    }

    /// Recomputes touched balances and commits. Returns the accounts whose
    /// balance was recomputed.
    pub fn commit(mut self) -> StorageResult<BTreeSet<EntityId>> {
        balance::recompute_balances(&self.conn, &self.touched)?;
        self.conn.execute_batch("COMMIT")?;
        self.open = false;
        debug!(accounts = self.touched.len(), "merge context committed");
        Ok(std::mem::take(&mut self.touched))
    }
}

impl Drop for MergeContext<'_> {
    fn drop(&mut self) {
        if self.open {
            if let Err(e) = self.conn.execute_batch("ROLLBACK") {
                warn!("merge rollback failed: {e}");
            } else {
                debug!("merge context rolled back");
            }
        }
        if let Err(e) = self.conn.execute_batch("PRAGMA foreign_keys = ON;") {
            warn!("failed to restore integrity checks: {e}");
        }
        self.maintenance.replace(self.saved);
    }
}
