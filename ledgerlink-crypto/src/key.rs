//! Package keys and installation keypairs.

use crate::encoding;
use crate::error::{CryptoError, CryptoResult};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Size of symmetric keys in bytes (256 bits for ChaCha20).
pub const KEY_SIZE: usize = 32;

/// A one-shot symmetric key protecting a single package.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct PackageKey {
    bytes: [u8; KEY_SIZE],
}

impl PackageKey {
    /// Creates a key from raw bytes.
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    /// Creates a key from an unwrapped byte slice, checking its length.
    pub fn from_slice(bytes: &[u8]) -> CryptoResult<Self> {
        let bytes: [u8; KEY_SIZE] = bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidKeyLength {
                expected: KEY_SIZE,
                actual: bytes.len(),
            })?;
        Ok(Self { bytes })
    }

    /// Returns the key bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl fmt::Debug for PackageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PackageKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Generates a fresh random package key.
pub fn generate_package_key() -> PackageKey {
    let mut bytes = [0u8; KEY_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    PackageKey::from_bytes(bytes)
}

/// An installation's public key, shared with linked devices.
///
/// Travels as standard base64 on the wire and in the store.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey([u8; KEY_SIZE]);

impl PublicKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }

    pub fn to_base64(&self) -> String {
        encoding::encode(&self.0)
    }

    pub fn from_base64(encoded: &str) -> CryptoResult<Self> {
        let bytes = encoding::decode(encoded)?;
        let bytes: [u8; KEY_SIZE] =
            bytes
                .as_slice()
                .try_into()
                .map_err(|_| CryptoError::InvalidKeyLength {
                    expected: KEY_SIZE,
                    actual: bytes.len(),
                })?;
        Ok(Self(bytes))
    }

    pub(crate) fn to_box_key(self) -> crypto_box::PublicKey {
        crypto_box::PublicKey::from(self.0)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.to_base64())
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base64())
    }
}

impl FromStr for PublicKey {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_base64(s)
    }
}

impl Serialize for PublicKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_base64())
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_base64(&s).map_err(serde::de::Error::custom)
    }
}

/// The asymmetric keypair that identifies an installation.
///
/// The secret half never leaves the device; it unwraps package keys and
/// opens handshake boxes addressed to this installation.
#[derive(Clone)]
pub struct InstallationKeypair {
    secret: crypto_box::SecretKey,
}

impl InstallationKeypair {
    /// Generates a new random keypair.
    pub fn generate() -> Self {
        Self {
            secret: crypto_box::SecretKey::generate(&mut rand::rngs::OsRng),
        }
    }

    /// Restores a keypair from its persisted secret bytes.
    pub fn from_secret_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self {
            secret: crypto_box::SecretKey::from(bytes),
        }
    }

    /// Restores a keypair from base64-encoded secret bytes.
    pub fn from_secret_base64(encoded: &str) -> CryptoResult<Self> {
        let bytes = encoding::decode(encoded)?;
        let bytes: [u8; KEY_SIZE] =
            bytes
                .as_slice()
                .try_into()
                .map_err(|_| CryptoError::InvalidKeyLength {
                    expected: KEY_SIZE,
                    actual: bytes.len(),
                })?;
        Ok(Self::from_secret_bytes(bytes))
    }

    /// Base64 of the secret bytes, for the identity collaborator to persist.
    pub fn secret_base64(&self) -> String {
        encoding::encode(&self.secret.to_bytes())
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey(*self.secret.public_key().as_bytes())
    }

    pub(crate) fn secret(&self) -> &crypto_box::SecretKey {
        &self.secret
    }
}

impl fmt::Debug for InstallationKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstallationKeypair")
            .field("public", &self.public_key())
            .field("secret", &"[REDACTED]")
            .finish()
    }
}
