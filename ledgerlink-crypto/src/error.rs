use ledgerlink_types::InstallationId;
use thiserror::Error;

pub type CryptoResult<T> = Result<T, CryptoError>;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("could not encrypt: {0}")]
    Encryption(String),

    /// Wrong key, or the bytes were altered in transit.
    #[error("could not decrypt: {0}")]
    Decryption(String),

    /// The envelope carries no wrapped key for this installation.
    #[error("envelope has no key for installation {0}")]
    NoRecipientKey(InstallationId),

    #[error("key must be {expected} bytes, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("iv must be {expected} bytes, got {actual}")]
    InvalidIvLength { expected: usize, actual: usize },

    #[error("bad base64: {0}")]
    Encoding(#[from] base64::DecodeError),
}
