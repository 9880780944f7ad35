//! Error types for the ledger store.

use ledgerlink_types::{EntityId, EntityKind};
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur in storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Entity not found.
    #[error("{kind} not found: {id}")]
    NotFound { kind: EntityKind, id: EntityId },

    /// Attempt to edit a reserved system tag.
    #[error("system tag {0} is read-only")]
    ReadOnly(EntityId),

    /// A stored identifier failed to parse.
    #[error("invalid id: {0}")]
    InvalidId(#[from] uuid::Error),

    /// A record failed validation.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// The connection mutex was poisoned by a panicking thread.
    #[error("store lock poisoned")]
    LockPoisoned,
}

impl From<ledgerlink_types::Error> for StorageError {
    fn from(err: ledgerlink_types::Error) -> Self {
        StorageError::InvalidData(err.to_string())
    }
}

impl From<ledgerlink_crypto::CryptoError> for StorageError {
    fn from(err: ledgerlink_crypto::CryptoError) -> Self {
        StorageError::InvalidData(err.to_string())
    }
}
