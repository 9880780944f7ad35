//! Repository queries over a borrowed connection.
//!
//! Every function takes `&Connection` so it runs unchanged inside
//! [`LedgerStore::atomic`](crate::LedgerStore::atomic), inside a
//! [`MergeContext`](crate::MergeContext), or on a plain read lock.
//! None of these functions touch clocks, balances or notifications; that is
//! the job of the callers that own a maintenance mode.

use crate::error::StorageResult;
use crate::row;
use ledgerlink_types::{
    Account, Budget, Clock, Counterparty, Currency, Deletion, EntityId, EntityKind, ExchangeRate,
    Icon, Line, Tag, Transaction, Wallet,
};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;

/// Tag-membership tables, one per owning entity kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Membership {
    Wallet,
    Account,
    Counterparty,
    Currency,
}

impl Membership {
    const fn table(self) -> &'static str {
        match self {
            Membership::Wallet => "wallet_tags",
            Membership::Account => "account_tags",
            Membership::Counterparty => "counterparty_tags",
            Membership::Currency => "currency_tags",
        }
    }
}

/// Replaces the full tag-membership set of `owner`.
pub fn replace_memberships(
    conn: &Connection,
    membership: Membership,
    owner: EntityId,
    tag_ids: &[EntityId],
) -> StorageResult<()> {
    let table = membership.table();
    conn.execute(
        &format!("DELETE FROM {table} WHERE owner_id = ?1"),
        params![owner.to_string()],
    )?;
    let mut stmt = conn.prepare_cached(&format!(
        "INSERT OR IGNORE INTO {table} (owner_id, tag_id) VALUES (?1, ?2)"
    ))?;
    for tag_id in tag_ids {
        stmt.execute(params![owner.to_string(), tag_id.to_string()])?;
    }
    Ok(())
}

/// Tag ids `owner` belongs to, in id order.
pub fn memberships(
    conn: &Connection,
    membership: Membership,
    owner: EntityId,
) -> StorageResult<Vec<EntityId>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT tag_id FROM {} WHERE owner_id = ?1 ORDER BY tag_id",
        membership.table()
    ))?;
    let ids = stmt
        .query_map(params![owner.to_string()], |r| row::entity_id(r, 0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(ids)
}

fn clear_memberships(conn: &Connection, membership: Membership, owner: EntityId) -> StorageResult<()> {
    replace_memberships(conn, membership, owner, &[])
}

// ── Icons ────────────────────────────────────────────────────────

pub fn upsert_icon(conn: &Connection, icon: &Icon) -> StorageResult<()> {
    conn.execute(
        "INSERT INTO icons (id, name, data, clock) VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(id) DO UPDATE SET name = excluded.name, data = excluded.data, clock = excluded.clock",
        params![icon.id.to_string(), icon.name, icon.data, icon.clock.as_secs()],
    )?;
    Ok(())
}

fn map_icon(r: &rusqlite::Row<'_>) -> rusqlite::Result<Icon> {
    Ok(Icon {
        id: row::entity_id(r, 0)?,
        name: r.get(1)?,
        data: r.get(2)?,
        clock: row::clock(r, 3)?,
    })
}

pub fn get_icon(conn: &Connection, id: EntityId) -> StorageResult<Option<Icon>> {
    let icon = conn
        .query_row(
            "SELECT id, name, data, clock FROM icons WHERE id = ?1",
            params![id.to_string()],
            map_icon,
        )
        .optional()?;
    Ok(icon)
}

pub fn icons_since(conn: &Connection, since: Clock) -> StorageResult<Vec<Icon>> {
    let mut stmt = conn.prepare_cached(
        "SELECT id, name, data, clock FROM icons WHERE clock >= ?1 ORDER BY clock, id",
    )?;
    let icons = stmt
        .query_map(params![since.as_secs()], map_icon)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(icons)
}

// ── Tags ─────────────────────────────────────────────────────────

/// Writes the tag row only; hierarchy edges go through [`replace_tag_edges`].
pub fn upsert_tag(conn: &Connection, tag: &Tag) -> StorageResult<()> {
    conn.execute(
        "INSERT INTO tags (id, name, icon_id, clock) VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(id) DO UPDATE SET name = excluded.name, icon_id = excluded.icon_id, clock = excluded.clock",
        params![
            tag.id.to_string(),
            tag.name,
            tag.icon_id.map(|i| i.to_string()),
            tag.clock.as_secs()
        ],
    )?;
    Ok(())
}

/// Replaces every hierarchy edge touching `tag` with its parent and child
/// sets.
pub fn replace_tag_edges(conn: &Connection, tag: &Tag) -> StorageResult<()> {
    let id = tag.id.to_string();
    conn.execute(
        "DELETE FROM tag_edges WHERE parent_id = ?1 OR child_id = ?1",
        params![id],
    )?;
    let mut stmt = conn
        .prepare_cached("INSERT OR IGNORE INTO tag_edges (parent_id, child_id) VALUES (?1, ?2)")?;
    for parent in &tag.parent_ids {
        stmt.execute(params![parent.to_string(), id])?;
    }
    for child in &tag.child_ids {
        stmt.execute(params![id, child.to_string()])?;
    }
    Ok(())
}

fn tag_edges(conn: &Connection, id: EntityId) -> StorageResult<(Vec<EntityId>, Vec<EntityId>)> {
    let mut parents = conn
        .prepare_cached("SELECT parent_id FROM tag_edges WHERE child_id = ?1 ORDER BY parent_id")?;
    let parent_ids = parents
        .query_map(params![id.to_string()], |r| row::entity_id(r, 0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    let mut children = conn
        .prepare_cached("SELECT child_id FROM tag_edges WHERE parent_id = ?1 ORDER BY child_id")?;
    let child_ids = children
        .query_map(params![id.to_string()], |r| row::entity_id(r, 0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok((parent_ids, child_ids))
}

fn map_tag(r: &rusqlite::Row<'_>) -> rusqlite::Result<Tag> {
    Ok(Tag {
        id: row::entity_id(r, 0)?,
        name: r.get(1)?,
        icon_id: row::opt_entity_id(r, 2)?,
        clock: row::clock(r, 3)?,
        parent_ids: Vec::new(),
        child_ids: Vec::new(),
    })
}

fn with_edges(conn: &Connection, mut tag: Tag) -> StorageResult<Tag> {
    let (parent_ids, child_ids) = tag_edges(conn, tag.id)?;
    tag.parent_ids = parent_ids;
    tag.child_ids = child_ids;
    Ok(tag)
}

pub fn get_tag(conn: &Connection, id: EntityId) -> StorageResult<Option<Tag>> {
    let tag = conn
        .query_row(
            "SELECT id, name, icon_id, clock FROM tags WHERE id = ?1",
            params![id.to_string()],
            map_tag,
        )
        .optional()?;
    tag.map(|t| with_edges(conn, t)).transpose()
}

pub fn tags_since(conn: &Connection, since: Clock) -> StorageResult<Vec<Tag>> {
    let mut stmt = conn.prepare_cached(
        "SELECT id, name, icon_id, clock FROM tags WHERE clock >= ?1 ORDER BY clock, id",
    )?;
    let tags = stmt
        .query_map(params![since.as_secs()], map_tag)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    tags.into_iter().map(|t| with_edges(conn, t)).collect()
}

// ── Wallets ──────────────────────────────────────────────────────

pub fn upsert_wallet(conn: &Connection, wallet: &Wallet) -> StorageResult<()> {
    conn.execute(
        "INSERT INTO wallets (id, name, color, clock) VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(id) DO UPDATE SET name = excluded.name, color = excluded.color, clock = excluded.clock",
        params![wallet.id.to_string(), wallet.name, wallet.color, wallet.clock.as_secs()],
    )?;
    Ok(())
}

fn map_wallet(r: &rusqlite::Row<'_>) -> rusqlite::Result<Wallet> {
    Ok(Wallet {
        id: row::entity_id(r, 0)?,
        name: r.get(1)?,
        color: r.get(2)?,
        clock: row::clock(r, 3)?,
        tag_ids: Vec::new(),
    })
}

pub fn get_wallet(conn: &Connection, id: EntityId) -> StorageResult<Option<Wallet>> {
    let wallet = conn
        .query_row(
            "SELECT id, name, color, clock FROM wallets WHERE id = ?1",
            params![id.to_string()],
            map_wallet,
        )
        .optional()?;
    wallet
        .map(|mut w| -> StorageResult<Wallet> {
            w.tag_ids = memberships(conn, Membership::Wallet, w.id)?;
            Ok(w)
        })
        .transpose()
}

pub fn wallets_since(conn: &Connection, since: Clock) -> StorageResult<Vec<Wallet>> {
    let mut stmt = conn.prepare_cached(
        "SELECT id, name, color, clock FROM wallets WHERE clock >= ?1 ORDER BY clock, id",
    )?;
    let wallets = stmt
        .query_map(params![since.as_secs()], map_wallet)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    wallets
        .into_iter()
        .map(|mut w| -> StorageResult<Wallet> {
            w.tag_ids = memberships(conn, Membership::Wallet, w.id)?;
            Ok(w)
        })
        .collect()
}

// ── Accounts ─────────────────────────────────────────────────────

/// Writes the account row, leaving an existing cached balance untouched.
pub fn upsert_account(conn: &Connection, account: &Account) -> StorageResult<()> {
    conn.execute(
        "INSERT INTO accounts (id, wallet_id, currency_id, balance, clock) VALUES (?1, ?2, ?3, '0', ?4)
         ON CONFLICT(id) DO UPDATE SET wallet_id = excluded.wallet_id,
             currency_id = excluded.currency_id, clock = excluded.clock",
        params![
            account.id.to_string(),
            account.wallet_id.to_string(),
            account.currency_id.to_string(),
            account.clock.as_secs()
        ],
    )?;
    Ok(())
}

fn map_account(r: &rusqlite::Row<'_>) -> rusqlite::Result<Account> {
    Ok(Account {
        id: row::entity_id(r, 0)?,
        wallet_id: row::entity_id(r, 1)?,
        currency_id: row::entity_id(r, 2)?,
        clock: row::clock(r, 3)?,
        tag_ids: Vec::new(),
    })
}

pub fn get_account(conn: &Connection, id: EntityId) -> StorageResult<Option<Account>> {
    let account = conn
        .query_row(
            "SELECT id, wallet_id, currency_id, clock FROM accounts WHERE id = ?1",
            params![id.to_string()],
            map_account,
        )
        .optional()?;
    account
        .map(|mut a| -> StorageResult<Account> {
            a.tag_ids = memberships(conn, Membership::Account, a.id)?;
            Ok(a)
        })
        .transpose()
}

pub fn accounts_since(conn: &Connection, since: Clock) -> StorageResult<Vec<Account>> {
    let mut stmt = conn.prepare_cached(
        "SELECT id, wallet_id, currency_id, clock FROM accounts WHERE clock >= ?1 ORDER BY clock, id",
    )?;
    let accounts = stmt
        .query_map(params![since.as_secs()], map_account)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    accounts
        .into_iter()
        .map(|mut a| -> StorageResult<Account> {
            a.tag_ids = memberships(conn, Membership::Account, a.id)?;
            Ok(a)
        })
        .collect()
}

// ── Counterparties ───────────────────────────────────────────────

pub fn upsert_counterparty(conn: &Connection, cp: &Counterparty) -> StorageResult<()> {
    conn.execute(
        "INSERT INTO counterparties (id, name, note, clock) VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(id) DO UPDATE SET name = excluded.name, note = excluded.note, clock = excluded.clock",
        params![cp.id.to_string(), cp.name, cp.note, cp.clock.as_secs()],
    )?;
    Ok(())
}

fn map_counterparty(r: &rusqlite::Row<'_>) -> rusqlite::Result<Counterparty> {
    Ok(Counterparty {
        id: row::entity_id(r, 0)?,
        name: r.get(1)?,
        note: r.get(2)?,
        clock: row::clock(r, 3)?,
        tag_ids: Vec::new(),
    })
}

pub fn get_counterparty(conn: &Connection, id: EntityId) -> StorageResult<Option<Counterparty>> {
    let cp = conn
        .query_row(
            "SELECT id, name, note, clock FROM counterparties WHERE id = ?1",
            params![id.to_string()],
            map_counterparty,
        )
        .optional()?;
    cp.map(|mut c| -> StorageResult<Counterparty> {
        c.tag_ids = memberships(conn, Membership::Counterparty, c.id)?;
        Ok(c)
    })
    .transpose()
}

pub fn counterparties_since(conn: &Connection, since: Clock) -> StorageResult<Vec<Counterparty>> {
    let mut stmt = conn.prepare_cached(
        "SELECT id, name, note, clock FROM counterparties WHERE clock >= ?1 ORDER BY clock, id",
    )?;
    let cps = stmt
        .query_map(params![since.as_secs()], map_counterparty)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    cps.into_iter()
        .map(|mut c| -> StorageResult<Counterparty> {
            c.tag_ids = memberships(conn, Membership::Counterparty, c.id)?;
            Ok(c)
        })
        .collect()
}

// ── Currencies ───────────────────────────────────────────────────

/// Writes the currency row only; rates go through [`insert_rate`].
pub fn upsert_currency(conn: &Connection, currency: &Currency) -> StorageResult<()> {
    conn.execute(
        "INSERT INTO currencies (id, precision, clock) VALUES (?1, ?2, ?3)
         ON CONFLICT(id) DO UPDATE SET precision = excluded.precision, clock = excluded.clock",
        params![
            currency.id.to_string(),
            i64::from(currency.precision),
            currency.clock.as_secs()
        ],
    )?;
    Ok(())
}

/// Records an exchange rate observation. A second observation with the same
/// timestamp replaces the first.
pub fn insert_rate(conn: &Connection, currency_id: EntityId, rate: &ExchangeRate) -> StorageResult<()> {
    conn.execute(
        "INSERT OR REPLACE INTO currency_rates (currency_id, rate, recorded_at) VALUES (?1, ?2, ?3)",
        params![
            currency_id.to_string(),
            rate.rate.to_string(),
            rate.recorded_at.as_secs()
        ],
    )?;
    Ok(())
}

/// The most recent exchange rate recorded for a currency.
pub fn latest_rate(conn: &Connection, currency_id: EntityId) -> StorageResult<Option<ExchangeRate>> {
    let rate = conn
        .query_row(
            "SELECT rate, recorded_at FROM currency_rates WHERE currency_id = ?1
             ORDER BY recorded_at DESC LIMIT 1",
            params![currency_id.to_string()],
            |r| {
                Ok(ExchangeRate {
                    rate: row::fixed_point(r, 0)?,
                    recorded_at: row::clock(r, 1)?,
                })
            },
        )
        .optional()?;
    Ok(rate)
}

fn map_currency(r: &rusqlite::Row<'_>) -> rusqlite::Result<Currency> {
    let precision: i64 = r.get(1)?;
    Ok(Currency {
        id: row::entity_id(r, 0)?,
        precision: u8::try_from(precision).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Integer, Box::new(e))
        })?,
        clock: row::clock(r, 2)?,
        tag_ids: Vec::new(),
        rate: None,
    })
}

fn with_currency_relations(conn: &Connection, mut currency: Currency) -> StorageResult<Currency> {
    currency.tag_ids = memberships(conn, Membership::Currency, currency.id)?;
    currency.rate = latest_rate(conn, currency.id)?;
    Ok(currency)
}

pub fn get_currency(conn: &Connection, id: EntityId) -> StorageResult<Option<Currency>> {
    let currency = conn
        .query_row(
            "SELECT id, precision, clock FROM currencies WHERE id = ?1",
            params![id.to_string()],
            map_currency,
        )
        .optional()?;
    currency.map(|c| with_currency_relations(conn, c)).transpose()
}

pub fn currencies_since(conn: &Connection, since: Clock) -> StorageResult<Vec<Currency>> {
    let mut stmt = conn.prepare_cached(
        "SELECT id, precision, clock FROM currencies WHERE clock >= ?1 ORDER BY clock, id",
    )?;
    let currencies = stmt
        .query_map(params![since.as_secs()], map_currency)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    currencies
        .into_iter()
        .map(|c| with_currency_relations(conn, c))
        .collect()
}

// ── Transactions ─────────────────────────────────────────────────

/// Writes the transaction header (counterparty link and note included).
pub fn upsert_transaction_header(conn: &Connection, tx: &Transaction) -> StorageResult<()> {
    conn.execute(
        "INSERT INTO transactions (id, timestamp, counterparty_id, note, clock) VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(id) DO UPDATE SET timestamp = excluded.timestamp,
             counterparty_id = excluded.counterparty_id, note = excluded.note, clock = excluded.clock",
        params![
            tx.id.to_string(),
            tx.timestamp,
            tx.counterparty_id.map(|c| c.to_string()),
            tx.note,
            tx.clock.as_secs()
        ],
    )?;
    Ok(())
}

/// Deletes every line of a transaction and inserts `lines` in their place.
pub fn replace_lines(conn: &Connection, transaction_id: EntityId, lines: &[Line]) -> StorageResult<()> {
    delete_lines(conn, transaction_id)?;
    let mut stmt = conn.prepare_cached(
        "INSERT INTO lines (id, transaction_id, account_id, tag_id, sign, magnitude, rate)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    )?;
    for line in lines {
        stmt.execute(params![
            line.id.to_string(),
            transaction_id.to_string(),
            line.account_id.to_string(),
            line.tag_id.to_string(),
            line.sign.as_i64(),
            line.magnitude.to_string(),
            line.rate.to_string()
        ])?;
    }
    Ok(())
}

fn delete_lines(conn: &Connection, transaction_id: EntityId) -> StorageResult<()> {
    conn.execute(
        "DELETE FROM lines WHERE transaction_id = ?1",
        params![transaction_id.to_string()],
    )?;
    Ok(())
}

fn map_line(r: &rusqlite::Row<'_>) -> rusqlite::Result<(EntityId, Line)> {
    Ok((
        row::entity_id(r, 0)?,
        Line {
            id: row::entity_id(r, 1)?,
            account_id: row::entity_id(r, 2)?,
            tag_id: row::entity_id(r, 3)?,
            sign: row::sign(r, 4)?,
            magnitude: row::fixed_point(r, 5)?,
            rate: row::fixed_point(r, 6)?,
        },
    ))
}

/// Lines of one transaction, in id order.
pub fn lines_of(conn: &Connection, transaction_id: EntityId) -> StorageResult<Vec<Line>> {
    let mut stmt = conn.prepare_cached(
        "SELECT transaction_id, id, account_id, tag_id, sign, magnitude, rate
         FROM lines WHERE transaction_id = ?1 ORDER BY id",
    )?;
    let lines = stmt
        .query_map(params![transaction_id.to_string()], map_line)?
        .map(|r| r.map(|(_, line)| line))
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(lines)
}

fn map_transaction(r: &rusqlite::Row<'_>) -> rusqlite::Result<Transaction> {
    Ok(Transaction {
        id: row::entity_id(r, 0)?,
        timestamp: r.get(1)?,
        counterparty_id: row::opt_entity_id(r, 2)?,
        note: r.get(3)?,
        clock: row::clock(r, 4)?,
        lines: Vec::new(),
    })
}

pub fn get_transaction(conn: &Connection, id: EntityId) -> StorageResult<Option<Transaction>> {
    let tx = conn
        .query_row(
            "SELECT id, timestamp, counterparty_id, note, clock FROM transactions WHERE id = ?1",
            params![id.to_string()],
            map_transaction,
        )
        .optional()?;
    tx.map(|mut t| -> StorageResult<Transaction> {
        t.lines = lines_of(conn, t.id)?;
        Ok(t)
    })
    .transpose()
}

/// Transactions with `clock >= since`, each with its lines attached.
///
/// Lines are fetched in one scan and grouped by header id.
pub fn transactions_since(conn: &Connection, since: Clock) -> StorageResult<Vec<Transaction>> {
    let mut stmt = conn.prepare_cached(
        "SELECT id, timestamp, counterparty_id, note, clock FROM transactions
         WHERE clock >= ?1 ORDER BY clock, id",
    )?;
    let mut txs = stmt
        .query_map(params![since.as_secs()], map_transaction)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut stmt = conn.prepare_cached(
        "SELECT l.transaction_id, l.id, l.account_id, l.tag_id, l.sign, l.magnitude, l.rate
         FROM lines l JOIN transactions t ON t.id = l.transaction_id
         WHERE t.clock >= ?1 ORDER BY l.id",
    )?;
    let mut grouped: HashMap<EntityId, Vec<Line>> = HashMap::new();
    for entry in stmt.query_map(params![since.as_secs()], map_line)? {
        let (tx_id, line) = entry?;
        grouped.entry(tx_id).or_default().push(line);
    }
    for tx in &mut txs {
        tx.lines = grouped.remove(&tx.id).unwrap_or_default();
    }
    Ok(txs)
}

// ── Budgets ──────────────────────────────────────────────────────

pub fn upsert_budget(conn: &Connection, budget: &Budget) -> StorageResult<()> {
    conn.execute(
        "INSERT INTO budgets (id, starts_at, ends_at, tag_id, amount, clock) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(id) DO UPDATE SET starts_at = excluded.starts_at, ends_at = excluded.ends_at,
             tag_id = excluded.tag_id, amount = excluded.amount, clock = excluded.clock",
        params![
            budget.id.to_string(),
            budget.starts_at,
            budget.ends_at,
            budget.tag_id.to_string(),
            budget.amount.to_string(),
            budget.clock.as_secs()
        ],
    )?;
    Ok(())
}

fn map_budget(r: &rusqlite::Row<'_>) -> rusqlite::Result<Budget> {
    Ok(Budget {
        id: row::entity_id(r, 0)?,
        starts_at: r.get(1)?,
        ends_at: r.get(2)?,
        tag_id: row::entity_id(r, 3)?,
        amount: row::fixed_point(r, 4)?,
        clock: row::clock(r, 5)?,
    })
}

pub fn get_budget(conn: &Connection, id: EntityId) -> StorageResult<Option<Budget>> {
    let budget = conn
        .query_row(
            "SELECT id, starts_at, ends_at, tag_id, amount, clock FROM budgets WHERE id = ?1",
            params![id.to_string()],
            map_budget,
        )
        .optional()?;
    Ok(budget)
}

pub fn budgets_since(conn: &Connection, since: Clock) -> StorageResult<Vec<Budget>> {
    let mut stmt = conn.prepare_cached(
        "SELECT id, starts_at, ends_at, tag_id, amount, clock FROM budgets
         WHERE clock >= ?1 ORDER BY clock, id",
    )?;
    let budgets = stmt
        .query_map(params![since.as_secs()], map_budget)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(budgets)
}

// ── Per-kind dispatch ────────────────────────────────────────────

const fn table_of(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Icon => "icons",
        EntityKind::Tag => "tags",
        EntityKind::Wallet => "wallets",
        EntityKind::Account => "accounts",
        EntityKind::Counterparty => "counterparties",
        EntityKind::Currency => "currencies",
        EntityKind::Transaction => "transactions",
        EntityKind::Budget => "budgets",
    }
}

/// The local logical clock of an entity, or `None` if it does not exist.
pub fn clock_of(conn: &Connection, kind: EntityKind, id: EntityId) -> StorageResult<Option<Clock>> {
    let clock = conn
        .query_row(
            &format!("SELECT clock FROM {} WHERE id = ?1", table_of(kind)),
            params![id.to_string()],
            |r| row::clock(r, 0),
        )
        .optional()?;
    Ok(clock)
}

/// Removes an entity row together with the relation rows it owns.
///
/// Returns whether a row was removed. References held by *other* entities
/// (lines pointing at an account, budgets pointing at a tag) are left to the
/// integrity checks when they are enabled.
pub fn delete_entity(conn: &Connection, kind: EntityKind, id: EntityId) -> StorageResult<bool> {
    let key = id.to_string();
    match kind {
        EntityKind::Icon => {
            conn.execute("UPDATE tags SET icon_id = NULL WHERE icon_id = ?1", params![key])?;
        }
        EntityKind::Tag => {
            conn.execute(
                "DELETE FROM tag_edges WHERE parent_id = ?1 OR child_id = ?1",
                params![key],
            )?;
            for membership in [
                Membership::Wallet,
                Membership::Account,
                Membership::Counterparty,
                Membership::Currency,
            ] {
                conn.execute(
                    &format!("DELETE FROM {} WHERE tag_id = ?1", membership.table()),
                    params![key],
                )?;
            }
        }
        EntityKind::Wallet => clear_memberships(conn, Membership::Wallet, id)?,
        EntityKind::Account => clear_memberships(conn, Membership::Account, id)?,
        EntityKind::Counterparty => {
            clear_memberships(conn, Membership::Counterparty, id)?;
            conn.execute(
                "UPDATE transactions SET counterparty_id = NULL WHERE counterparty_id = ?1",
                params![key],
            )?;
        }
        EntityKind::Currency => {
            clear_memberships(conn, Membership::Currency, id)?;
            conn.execute("DELETE FROM currency_rates WHERE currency_id = ?1", params![key])?;
        }
        EntityKind::Transaction => delete_lines(conn, id)?,
        EntityKind::Budget => {}
    }
    let removed = conn.execute(
        &format!("DELETE FROM {} WHERE id = ?1", table_of(kind)),
        params![key],
    )?;
    Ok(removed > 0)
}

// ── Tombstones ───────────────────────────────────────────────────

/// Remembers a deletion, keeping the latest deletion time per entity.
pub fn record_deletion(conn: &Connection, deletion: &Deletion) -> StorageResult<()> {
    conn.execute(
        "INSERT INTO deletions (kind, entity_id, deleted_at) VALUES (?1, ?2, ?3)
         ON CONFLICT(kind, entity_id) DO UPDATE SET deleted_at = MAX(deleted_at, excluded.deleted_at)",
        params![
            deletion.kind.as_str(),
            deletion.entity_id.to_string(),
            deletion.deleted_at.as_secs()
        ],
    )?;
    Ok(())
}

/// The remembered deletion time of an entity, if any.
pub fn tombstone_of(conn: &Connection, kind: EntityKind, id: EntityId) -> StorageResult<Option<Clock>> {
    let at = conn
        .query_row(
            "SELECT deleted_at FROM deletions WHERE kind = ?1 AND entity_id = ?2",
            params![kind.as_str(), id.to_string()],
            |r| row::clock(r, 0),
        )
        .optional()?;
    Ok(at)
}

pub fn deletions_since(conn: &Connection, since: Clock) -> StorageResult<Vec<Deletion>> {
    let mut stmt = conn.prepare_cached(
        "SELECT kind, entity_id, deleted_at FROM deletions WHERE deleted_at >= ?1
         ORDER BY deleted_at, entity_id",
    )?;
    let rows = stmt
        .query_map(params![since.as_secs()], |r| {
            Ok((r.get::<_, String>(0)?, row::entity_id(r, 1)?, row::clock(r, 2)?))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    rows.into_iter()
        .map(|(kind, id, at)| -> StorageResult<Deletion> {
            Ok(Deletion::new(kind.parse()?, id, at))
        })
        .collect()
}
