//! Encryption layer for LedgerLink.
//!
//! Every sync package is encrypted once with a fresh 256-bit key
//! (ChaCha20-Poly1305, 96-bit nonce); the key is then wrapped for each
//! recipient installation with an X25519 sealed box. The relay only ever
//! stores ciphertext and wrapped keys.
//!
//! # Modules
//! - `cipher`: symmetric AEAD over byte payloads
//! - `key`: package keys and installation keypairs
//! - `envelope`: multi-recipient hybrid envelopes
//! - `sealed`: single-recipient asymmetric boxes (device handshake)

mod cipher;
pub mod encoding;
mod envelope;
mod error;
mod key;
mod sealed;

pub use cipher::{open_payload, seal_payload, SealedPayload, IV_SIZE, TAG_SIZE};
pub use envelope::{open_envelope, seal_for_recipients, Envelope, Recipient, WrappedKey};
pub use error::{CryptoError, CryptoResult};
pub use key::{generate_package_key, InstallationKeypair, PackageKey, PublicKey, KEY_SIZE};
pub use sealed::{open_sealed, seal_to};
