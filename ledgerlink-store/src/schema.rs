//! Table layout.
//!
//! Ids are UUID text, clocks are integer seconds, and fixed-point amounts
//! and balances are decimal text so that no value ever passes through a
//! floating-point column.

use crate::error::StorageResult;
use ledgerlink_types::system_tags;
use rusqlite::{params, Connection};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS icons (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        data TEXT NOT NULL,
        clock INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS tags (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        icon_id TEXT REFERENCES icons(id),
        clock INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS tag_edges (
        parent_id TEXT NOT NULL REFERENCES tags(id),
        child_id TEXT NOT NULL REFERENCES tags(id),
        PRIMARY KEY (parent_id, child_id)
    );

    CREATE TABLE IF NOT EXISTS wallets (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        color TEXT NOT NULL,
        clock INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS wallet_tags (
        owner_id TEXT NOT NULL REFERENCES wallets(id),
        tag_id TEXT NOT NULL REFERENCES tags(id),
        PRIMARY KEY (owner_id, tag_id)
    );

    CREATE TABLE IF NOT EXISTS currencies (
        id TEXT PRIMARY KEY,
        precision INTEGER NOT NULL,
        clock INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS currency_tags (
        owner_id TEXT NOT NULL REFERENCES currencies(id),
        tag_id TEXT NOT NULL REFERENCES tags(id),
        PRIMARY KEY (owner_id, tag_id)
    );

    CREATE TABLE IF NOT EXISTS currency_rates (
        currency_id TEXT NOT NULL REFERENCES currencies(id),
        rate TEXT NOT NULL,
        recorded_at INTEGER NOT NULL,
        PRIMARY KEY (currency_id, recorded_at)
    );

    CREATE TABLE IF NOT EXISTS accounts (
        id TEXT PRIMARY KEY,
        wallet_id TEXT NOT NULL REFERENCES wallets(id),
        currency_id TEXT NOT NULL REFERENCES currencies(id),
        balance TEXT NOT NULL DEFAULT '0',
        clock INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS account_tags (
        owner_id TEXT NOT NULL REFERENCES accounts(id),
        tag_id TEXT NOT NULL REFERENCES tags(id),
        PRIMARY KEY (owner_id, tag_id)
    );

    CREATE TABLE IF NOT EXISTS counterparties (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        note TEXT,
        clock INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS counterparty_tags (
        owner_id TEXT NOT NULL REFERENCES counterparties(id),
        tag_id TEXT NOT NULL REFERENCES tags(id),
        PRIMARY KEY (owner_id, tag_id)
    );

    CREATE TABLE IF NOT EXISTS transactions (
        id TEXT PRIMARY KEY,
        timestamp INTEGER NOT NULL,
        counterparty_id TEXT REFERENCES counterparties(id),
        note TEXT,
        clock INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS lines (
        id TEXT PRIMARY KEY,
        transaction_id TEXT NOT NULL REFERENCES transactions(id),
        account_id TEXT NOT NULL REFERENCES accounts(id),
        tag_id TEXT NOT NULL REFERENCES tags(id),
        sign INTEGER NOT NULL CHECK (sign IN (1, -1)),
        magnitude TEXT NOT NULL,
        rate TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_lines_account ON lines(account_id);
    CREATE INDEX IF NOT EXISTS idx_lines_transaction ON lines(transaction_id);

    CREATE TABLE IF NOT EXISTS budgets (
        id TEXT PRIMARY KEY,
        starts_at INTEGER NOT NULL,
        ends_at INTEGER NOT NULL,
        tag_id TEXT NOT NULL REFERENCES tags(id),
        amount TEXT NOT NULL,
        clock INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS deletions (
        kind TEXT NOT NULL,
        entity_id TEXT NOT NULL,
        deleted_at INTEGER NOT NULL,
        PRIMARY KEY (kind, entity_id)
    );

    CREATE INDEX IF NOT EXISTS idx_deletions_at ON deletions(deleted_at);

    CREATE TABLE IF NOT EXISTS linked_installations (
        installation_id TEXT PRIMARY KEY,
        public_key TEXT NOT NULL,
        linked_at INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS sync_meta (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );
";

/// Creates all tables (idempotent) and seeds the reserved system tags.
pub(crate) fn init(conn: &Connection) -> StorageResult<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.execute_batch(SCHEMA)?;
    for (id, name) in system_tags::ALL {
        conn.execute(
            "INSERT OR IGNORE INTO tags (id, name, icon_id, clock) VALUES (?1, ?2, NULL, 0)",
            params![id.to_string(), name],
        )?;
    }
    Ok(())
}
