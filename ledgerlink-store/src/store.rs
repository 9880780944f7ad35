//! The ledger store handle and local (incremental-mode) edits.

use crate::balance::{self, BalanceDrift};
use crate::error::{StorageError, StorageResult};
use crate::maintenance::{ChangeNotice, Maintenance, MaintenanceFlags};
use crate::repo::{self, Membership};
use crate::schema;
use ledgerlink_types::{
    system_tags, Account, Balance, Budget, Clock, Counterparty, Currency, Deletion, EntityId,
    EntityKind, ExchangeRate, FixedPoint, Icon, Tag, Transaction, Wallet,
};
use rusqlite::{params, Connection};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;
use tracing::debug;

const CHANGE_CHANNEL_CAPACITY: usize = 256;

/// Embedded ledger database shared by the local edit path and the merge
/// engine.
///
/// Cloning is cheap; clones share one connection, one set of maintenance
/// flags and one change channel. Every operation holds the connection lock
/// for its whole duration, so there is one outstanding storage operation at
/// a time.
#[derive(Clone)]
pub struct LedgerStore {
    conn: Arc<Mutex<Connection>>,
    maintenance: Arc<Maintenance>,
    changes: broadcast::Sender<ChangeNotice>,
}

impl LedgerStore {
    /// Opens (or creates) a ledger store at the given path.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let conn = Connection::open(path.as_ref())?;
        Self::with_connection(conn)
    }

    /// Opens an in-memory ledger store (for testing).
    pub fn open_in_memory() -> StorageResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> StorageResult<Self> {
        schema::init(&conn)?;
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            maintenance: Arc::new(Maintenance::new(MaintenanceFlags::default())),
            changes,
        })
    }

    pub(crate) fn lock(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StorageError::LockPoisoned)
    }

    pub fn maintenance(&self) -> &Maintenance {
        &self.maintenance
    }

    /// Receives a [`ChangeNotice`] for every local write made while
    /// notifications are enabled.
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeNotice> {
        self.changes.subscribe()
    }

    /// Runs a local write in one transaction, then announces it.
    ///
    /// Whether to announce is read while the connection lock is still held;
    /// a merge flips the flags only under that lock.
    fn local_write<T>(
        &self,
        kind: EntityKind,
        write: impl FnOnce(&Connection) -> StorageResult<T>,
        id_of: impl FnOnce(&T) -> EntityId,
    ) -> StorageResult<T> {
        let (out, announce) =
            self.atomic(|conn| Ok((write(conn)?, self.maintenance.notifications())))?;
        let id = id_of(&out);
        if announce {
            // No subscribers is fine.
            let _ = self.changes.send(ChangeNotice { kind, id });
        } else {
            debug!("change notice for {kind} {id} suppressed");
        }
        Ok(out)
    }

    /// Runs `f` against the connection without opening a transaction.
    pub fn read<T>(&self, f: impl FnOnce(&Connection) -> StorageResult<T>) -> StorageResult<T> {
        let conn = self.lock()?;
        f(&conn)
    }

    /// Runs `f` inside one SQLite transaction: committed when `f` returns
    /// `Ok`, rolled back otherwise.
    pub fn atomic<T>(&self, f: impl FnOnce(&Connection) -> StorageResult<T>) -> StorageResult<T> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }

    /// The clock a local write should carry: a fresh touch when auto-touch
    /// is on, the caller's own clock otherwise.
    fn touch(&self, conn: &Connection, kind: EntityKind, id: EntityId, proposed: Clock) -> StorageResult<Clock> {
        if !self.maintenance.auto_touch() {
            return Ok(proposed);
        }
        let current = repo::clock_of(conn, kind, id)?.unwrap_or(Clock::ZERO);
        Ok(current.next_after())
    }

    // ── Local edits ──────────────────────────────────────────────

    pub fn save_icon(&self, mut icon: Icon) -> StorageResult<Icon> {
        self.local_write(
            EntityKind::Icon,
            |conn| {
                icon.clock = self.touch(conn, EntityKind::Icon, icon.id, icon.clock)?;
                repo::upsert_icon(conn, &icon)?;
                Ok(icon)
            },
            |icon| icon.id,
        )
    }

    /// Saves a tag and its hierarchy edges.
    ///
    /// Tags gaining or losing an edge to this one are touched as well, so
    /// that their own relation snapshot is never older than the edge.
    pub fn save_tag(&self, mut tag: Tag) -> StorageResult<Tag> {
        if system_tags::is_system_tag(&tag.id) {
            return Err(StorageError::ReadOnly(tag.id));
        }
        self.local_write(
            EntityKind::Tag,
            |conn| {
                tag.clock = self.touch(conn, EntityKind::Tag, tag.id, tag.clock)?;
                let before = repo::get_tag(conn, tag.id)?
                    .map(|t| neighbours(&t))
                    .unwrap_or_default();
                repo::upsert_tag(conn, &tag)?;
                repo::replace_tag_edges(conn, &tag)?;

                if self.maintenance.auto_touch() {
                    let after = neighbours(&tag);
                    for other in before.symmetric_difference(&after) {
                        if system_tags::is_system_tag(other) {
                            continue;
                        }
                        if let Some(clock) = repo::clock_of(conn, EntityKind::Tag, *other)? {
                            conn.execute(
                                "UPDATE tags SET clock = ?1 WHERE id = ?2",
                                params![clock.next_after().as_secs(), other.to_string()],
                            )?;
                        }
                    }
                }
                Ok(tag)
            },
            |tag| tag.id,
        )
    }

    pub fn save_wallet(&self, mut wallet: Wallet) -> StorageResult<Wallet> {
        self.local_write(
            EntityKind::Wallet,
            |conn| {
                wallet.clock = self.touch(conn, EntityKind::Wallet, wallet.id, wallet.clock)?;
                repo::upsert_wallet(conn, &wallet)?;
                repo::replace_memberships(conn, Membership::Wallet, wallet.id, &wallet.tag_ids)?;
                Ok(wallet)
            },
            |wallet| wallet.id,
        )
    }

    pub fn save_account(&self, mut account: Account) -> StorageResult<Account> {
        self.local_write(
            EntityKind::Account,
            |conn| {
                let existed = repo::clock_of(conn, EntityKind::Account, account.id)?.is_some();
                account.clock = self.touch(conn, EntityKind::Account, account.id, account.clock)?;
                repo::upsert_account(conn, &account)?;
                repo::replace_memberships(conn, Membership::Account, account.id, &account.tag_ids)?;
                if !existed && self.maintenance.auto_balance() {
                    balance::recompute_balances(conn, &BTreeSet::from([account.id]))?;
                }
                Ok(account)
            },
            |account| account.id,
        )
    }

    pub fn save_counterparty(&self, mut cp: Counterparty) -> StorageResult<Counterparty> {
        self.local_write(
            EntityKind::Counterparty,
            |conn| {
                cp.clock = self.touch(conn, EntityKind::Counterparty, cp.id, cp.clock)?;
                repo::upsert_counterparty(conn, &cp)?;
                repo::replace_memberships(conn, Membership::Counterparty, cp.id, &cp.tag_ids)?;
                Ok(cp)
            },
            |cp| cp.id,
        )
    }

    /// Saves a currency; a rate carried on the record is recorded as well.
    pub fn save_currency(&self, mut currency: Currency) -> StorageResult<Currency> {
        self.local_write(
            EntityKind::Currency,
            |conn| {
                currency.clock = self.touch(conn, EntityKind::Currency, currency.id, currency.clock)?;
                repo::upsert_currency(conn, &currency)?;
                repo::replace_memberships(conn, Membership::Currency, currency.id, &currency.tag_ids)?;
                if let Some(rate) = &currency.rate {
                    repo::insert_rate(conn, currency.id, rate)?;
                }
                Ok(currency)
            },
            |currency| currency.id,
        )
    }

    /// Records a freshly looked-up exchange rate for a known currency.
    ///
    /// Rates are local-only: the currency clock is left alone and no change
    /// notice goes out. Each installation refreshes its own rates, and a
    /// peer only adopts a rate for a currency it does not have yet.
    pub fn set_exchange_rate(&self, currency_id: EntityId, rate: FixedPoint) -> StorageResult<ExchangeRate> {
        self.atomic(|conn| {
            if repo::clock_of(conn, EntityKind::Currency, currency_id)?.is_none() {
                return Err(StorageError::NotFound {
                    kind: EntityKind::Currency,
                    id: currency_id,
                });
            }
            let rate = ExchangeRate {
                rate,
                recorded_at: Clock::now(),
            };
            repo::insert_rate(conn, currency_id, &rate)?;
            Ok(rate)
        })
    }

    /// Saves a transaction, replacing all of its lines.
    ///
    /// With auto-balance on, the previous lines' contributions are removed
    /// from their accounts and the new lines' contributions added.
    pub fn save_transaction(&self, mut tx: Transaction) -> StorageResult<Transaction> {
        tx.validate()?;
        self.local_write(
            EntityKind::Transaction,
            |conn| {
                let old_lines = repo::lines_of(conn, tx.id)?;
                tx.clock = self.touch(conn, EntityKind::Transaction, tx.id, tx.clock)?;
                repo::upsert_transaction_header(conn, &tx)?;
                repo::replace_lines(conn, tx.id, &tx.lines)?;

                if self.maintenance.auto_balance() {
                    for (account_id, delta) in balance::line_deltas(&old_lines) {
                        balance::adjust_balance(conn, account_id, -delta)?;
                    }
                    for (account_id, delta) in balance::line_deltas(&tx.lines) {
                        balance::adjust_balance(conn, account_id, delta)?;
                    }
                }
                Ok(tx)
            },
            |tx| tx.id,
        )
    }

    pub fn save_budget(&self, mut budget: Budget) -> StorageResult<Budget> {
        self.local_write(
            EntityKind::Budget,
            |conn| {
                budget.clock = self.touch(conn, EntityKind::Budget, budget.id, budget.clock)?;
                repo::upsert_budget(conn, &budget)?;
                Ok(budget)
            },
            |budget| budget.id,
        )
    }

    /// Deletes an entity locally and leaves a tombstone for other devices.
    ///
    /// The tombstone's deletion time is strictly later than the entity's
    /// last clock, so it wins over every copy of that version elsewhere.
    pub fn delete_entity(&self, kind: EntityKind, id: EntityId) -> StorageResult<Deletion> {
        if kind == EntityKind::Tag && system_tags::is_system_tag(&id) {
            return Err(StorageError::ReadOnly(id));
        }
        self.local_write(
            kind,
            |conn| {
                let clock = repo::clock_of(conn, kind, id)?.ok_or(StorageError::NotFound { kind, id })?;
                if kind == EntityKind::Transaction && self.maintenance.auto_balance() {
                    let lines = repo::lines_of(conn, id)?;
                    for (account_id, delta) in balance::line_deltas(&lines) {
                        balance::adjust_balance(conn, account_id, -delta)?;
                    }
                }
                repo::delete_entity(conn, kind, id)?;
                let deletion = Deletion::new(kind, id, clock.next_after());
                repo::record_deletion(conn, &deletion)?;
                Ok(deletion)
            },
            |_| id,
        )
    }

    // ── Reads ────────────────────────────────────────────────────

    /// Cached balance of an account.
    pub fn balance(&self, account_id: EntityId) -> StorageResult<Balance> {
        self.read(|conn| {
            balance::balance_of(conn, account_id)?.ok_or(StorageError::NotFound {
                kind: EntityKind::Account,
                id: account_id,
            })
        })
    }

    /// Accounts whose cached balance disagrees with their lines.
    pub fn verify_balances(&self) -> StorageResult<Vec<BalanceDrift>> {
        self.read(balance::verify_balances)
    }
}

fn neighbours(tag: &Tag) -> BTreeSet<EntityId> {
    tag.parent_ids
        .iter()
        .chain(tag.child_ids.iter())
        .copied()
        .collect()
}

impl std::fmt::Debug for LedgerStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerStore")
            .field("maintenance", &self.maintenance.flags())
            .finish_non_exhaustive()
    }
}
