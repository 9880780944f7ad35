//! Cached account balances.
//!
//! An account's balance is an index over its lines, never a source of
//! truth. Two maintenance modes keep it exact:
//! - incremental: [`adjust_balance`] applies the signed delta of the lines a
//!   local edit added or removed
//! - bulk: [`recompute_balances`] re-sums every line of a set of accounts in
//!   one scan, used once at the end of a merge

use crate::error::StorageResult;
use crate::row;
use ledgerlink_types::{Balance, EntityId, Line};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::collections::{BTreeMap, BTreeSet};

// Stays well under SQLite's bound-parameter limit.
const IN_CLAUSE_CHUNK: usize = 500;

/// Net signed contribution of `lines` to each account they reference.
pub fn line_deltas(lines: &[Line]) -> BTreeMap<EntityId, Balance> {
    let mut deltas: BTreeMap<EntityId, Balance> = BTreeMap::new();
    for line in lines {
        *deltas.entry(line.account_id).or_default() += Balance::of_line(line.sign, &line.magnitude);
    }
    deltas
}

/// The cached balance of an account, or `None` if the account is unknown.
pub fn balance_of(conn: &Connection, account_id: EntityId) -> StorageResult<Option<Balance>> {
    let balance = conn
        .query_row(
            "SELECT balance FROM accounts WHERE id = ?1",
            params![account_id.to_string()],
            |r| row::balance(r, 0),
        )
        .optional()?;
    Ok(balance)
}

fn write_balance(conn: &Connection, account_id: EntityId, balance: Balance) -> StorageResult<()> {
    conn.execute(
        "UPDATE accounts SET balance = ?1 WHERE id = ?2",
        params![balance.to_string(), account_id.to_string()],
    )?;
    Ok(())
}

/// Incremental mode: adds `delta` to the cached balance of one account.
///
/// Unknown accounts are ignored; their balance is computed from scratch when
/// they arrive.
pub fn adjust_balance(conn: &Connection, account_id: EntityId, delta: Balance) -> StorageResult<()> {
    if delta == Balance::ZERO {
        return Ok(());
    }
    if let Some(current) = balance_of(conn, account_id)? {
        write_balance(conn, account_id, current + delta)?;
    }
    Ok(())
}

/// Sums the signed magnitudes of every line referencing `account_ids`.
///
/// Accounts without lines are present in the result with a zero sum.
pub fn sum_lines(
    conn: &Connection,
    account_ids: &BTreeSet<EntityId>,
) -> StorageResult<BTreeMap<EntityId, Balance>> {
    let mut sums: BTreeMap<EntityId, Balance> =
        account_ids.iter().map(|id| (*id, Balance::ZERO)).collect();
    let ids: Vec<String> = account_ids.iter().map(|id| id.to_string()).collect();

    for chunk in ids.chunks(IN_CLAUSE_CHUNK) {
        let placeholders = vec!["?"; chunk.len()].join(", ");
        let mut stmt = conn.prepare(&format!(
            "SELECT account_id, sign, magnitude FROM lines WHERE account_id IN ({placeholders})"
        ))?;
        let mut rows = stmt.query(params_from_iter(chunk.iter()))?;
        while let Some(r) = rows.next()? {
            let account_id = row::entity_id(r, 0)?;
            let contribution = Balance::of_line(row::sign(r, 1)?, &row::fixed_point(r, 2)?);
            *sums.entry(account_id).or_default() += contribution;
        }
    }
    Ok(sums)
}

/// Bulk mode: rewrites the cached balance of each account from its lines.
pub fn recompute_balances(conn: &Connection, account_ids: &BTreeSet<EntityId>) -> StorageResult<()> {
    if account_ids.is_empty() {
        return Ok(());
    }
    for (account_id, balance) in sum_lines(conn, account_ids)? {
        write_balance(conn, account_id, balance)?;
    }
    Ok(())
}

/// An account whose cached balance disagrees with its lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BalanceDrift {
    pub account_id: EntityId,
    pub cached: Balance,
    pub actual: Balance,
}

/// Compares every cached balance against its line sum.
pub fn verify_balances(conn: &Connection) -> StorageResult<Vec<BalanceDrift>> {
    let mut stmt = conn.prepare("SELECT id, balance FROM accounts ORDER BY id")?;
    let cached = stmt
        .query_map([], |r| Ok((row::entity_id(r, 0)?, row::balance(r, 1)?)))?
        .collect::<rusqlite::Result<BTreeMap<_, _>>>()?;

    let ids: BTreeSet<EntityId> = cached.keys().copied().collect();
    let actual = sum_lines(conn, &ids)?;

    Ok(cached
        .into_iter()
        .filter_map(|(account_id, cached)| {
            let actual = actual.get(&account_id).copied().unwrap_or_default();
            (cached != actual).then_some(BalanceDrift {
                account_id,
                cached,
                actual,
            })
        })
        .collect())
}
