//! Core type definitions for LedgerLink.
//!
//! This crate defines the types shared by the store, the package format and
//! the merge engine:
//! - Entity and installation identifiers (UUID v7)
//! - Coarse logical clocks (seconds) used for last-write-wins
//! - Fixed-point amounts and signed balances
//! - Ledger entity records and deletion tombstones
//!
//! Entity records double as wire records: relation sets (tag hierarchy edges,
//! tag memberships, transaction lines) are carried inline as id arrays.

mod amount;
mod clock;
mod entity;
mod ids;
mod kind;
pub mod system_tags;

pub use amount::{Balance, FixedPoint, Sign, FRACTION_DIGITS, FRACTION_SCALE};
pub use clock::Clock;
pub use entity::{
    Account, Budget, Counterparty, Currency, ExchangeRate, Icon, Line, Tag, Transaction, Wallet,
};
pub use ids::{EntityId, InstallationId};
pub use kind::{Deletion, EntityKind};

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid UUID: {0}")]
    InvalidUuid(#[from] uuid::Error),

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("invalid entity kind: {0}")]
    InvalidKind(String),

    #[error("invalid entity: {0}")]
    InvalidEntity(String),
}
