//! ChaCha20-Poly1305 payload cipher.
//!
//! A package body is encrypted exactly once under its own [`PackageKey`];
//! the 12-byte IV travels next to the ciphertext in the envelope.

use crate::error::{CryptoError, CryptoResult};
use crate::key::PackageKey;
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::RngCore;

/// IV length (96 bits).
pub const IV_SIZE: usize = 12;

/// Poly1305 tag appended to every ciphertext.
pub const TAG_SIZE: usize = 16;

/// A package body after encryption.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SealedPayload {
    pub iv: [u8; IV_SIZE],
    /// Ciphertext followed by the tag.
    pub ciphertext: Vec<u8>,
}

impl SealedPayload {
    /// Reassembles a payload from envelope fields, checking both lengths
    /// before any decryption is attempted.
    pub fn from_parts(iv: &[u8], ciphertext: Vec<u8>) -> CryptoResult<Self> {
        let Ok(iv) = <[u8; IV_SIZE]>::try_from(iv) else {
            return Err(CryptoError::InvalidIvLength {
                expected: IV_SIZE,
                actual: iv.len(),
            });
        };
        if ciphertext.len() < TAG_SIZE {
            return Err(CryptoError::Decryption(format!(
                "ciphertext of {} bytes cannot hold a tag",
                ciphertext.len()
            )));
        }
        Ok(Self { iv, ciphertext })
    }

    /// Length of the plaintext this payload decrypts to.
    pub fn plaintext_len(&self) -> usize {
        self.ciphertext.len().saturating_sub(TAG_SIZE)
    }
}

fn cipher_for(key: &PackageKey) -> ChaCha20Poly1305 {
    ChaCha20Poly1305::new(Key::from_slice(key.as_bytes()))
}

/// Encrypts a package body under a fresh random IV.
pub fn seal_payload(key: &PackageKey, plaintext: &[u8]) -> CryptoResult<SealedPayload> {
    let mut iv = [0u8; IV_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut iv);

    let ciphertext = cipher_for(key)
        .encrypt(Nonce::from_slice(&iv), plaintext)
        .map_err(|_| CryptoError::Encryption("payload encryption failed".into()))?;
    Ok(SealedPayload { iv, ciphertext })
}

/// Authenticates and decrypts a package body.
pub fn open_payload(key: &PackageKey, payload: &SealedPayload) -> CryptoResult<Vec<u8>> {
    cipher_for(key)
        .decrypt(Nonce::from_slice(&payload.iv), payload.ciphertext.as_slice())
        .map_err(|_| CryptoError::Decryption("payload failed authentication".into()))
}
