//! Error types for the sync layer.

use ledgerlink_crypto::CryptoError;
use ledgerlink_store::StorageError;
use ledgerlink_types::InstallationId;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur in sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Network error.
    #[error("network error: {0}")]
    Network(String),

    /// The relay answered with a non-success status.
    #[error("relay returned {status}: {body}")]
    Relay { status: u16, body: String },

    /// The relay rejected our credentials.
    #[error("authentication error: {0}")]
    Auth(String),

    /// Timeout.
    #[error("operation timed out")]
    Timeout,

    /// Protocol error (unexpected package or payload shape).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Storage error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// The relay delivered a package that was not sealed for this device.
    #[error("no key for installation {0}")]
    NoKeyForInstallation(InstallationId),

    /// Decryption or authentication failure.
    #[error("crypto error: {0}")]
    Crypto(CryptoError),

    /// No linked installation to encrypt for.
    #[error("no recipients")]
    NoRecipients,

    /// Invalid configuration.
    #[error("config error: {0}")]
    Config(String),

    /// Local file I/O (identity, config).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SyncError {
    /// Transport failures that the next scheduled cycle may resolve.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SyncError::Network(_) | SyncError::Timeout | SyncError::Relay { .. }
        )
    }
}

impl From<CryptoError> for SyncError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::NoRecipientKey(id) => SyncError::NoKeyForInstallation(id),
            other => SyncError::Crypto(other),
        }
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SyncError::Timeout
        } else if err.is_decode() {
            SyncError::Protocol(err.to_string())
        } else {
            SyncError::Network(err.to_string())
        }
    }
}
