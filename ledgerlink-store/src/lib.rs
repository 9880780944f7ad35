//! SQLite ledger store for LedgerLink.
//!
//! Holds the local copy of the ledger and the replication state around it.
//!
//! # Maintenance modes
//!
//! - Local edits ([`LedgerStore::save_transaction`] and friends) touch
//!   clocks, adjust balances incrementally and emit [`ChangeNotice`]s.
//! - Merges run inside a [`MergeContext`], which suspends all of that,
//!   disables integrity checks and recomputes touched balances in bulk
//!   before committing.

mod balance;
mod error;
mod maintenance;
mod merge;
pub mod repo;
mod row;
mod schema;
mod store;
mod sync_state;

pub use balance::{
    adjust_balance, balance_of, line_deltas, recompute_balances, verify_balances, BalanceDrift,
};
pub use error::{StorageError, StorageResult};
pub use maintenance::{ChangeNotice, Maintenance, MaintenanceFlags};
pub use merge::{MergeContext, Resolution};
pub use store::LedgerStore;
pub use sync_state::{LinkOutcome, LinkState, LinkedInstallation, Watermark};

pub use rusqlite::Connection;
