//! Anonymous sealed boxes addressed to one installation.
//!
//! X25519 + XSalsa20-Poly1305 with an ephemeral sender key; only the holder
//! of the recipient's secret key can open the box.

use crate::error::{CryptoError, CryptoResult};
use crate::key::{InstallationKeypair, PublicKey};

/// Seals `plaintext` so only the owner of `recipient` can open it.
pub fn seal_to(recipient: &PublicKey, plaintext: &[u8]) -> CryptoResult<Vec<u8>> {
    recipient
        .to_box_key()
        .seal(&mut rand::rngs::OsRng, plaintext)
        .map_err(|e| CryptoError::Encryption(format!("seal failed: {e}")))
}

/// Opens a sealed box with this installation's secret key.
pub fn open_sealed(keypair: &InstallationKeypair, sealed: &[u8]) -> CryptoResult<Vec<u8>> {
    keypair
        .secret()
        .unseal(sealed)
        .map_err(|_| CryptoError::Decryption("sealed box rejected (wrong key or tampered)".into()))
}
