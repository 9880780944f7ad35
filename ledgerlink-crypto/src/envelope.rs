//! Multi-recipient hybrid envelopes.
//!
//! # Process
//! 1. Generate a random package key
//! 2. Encrypt the payload once with the package key
//! 3. Seal the raw package key to each recipient's public key
//!
//! Adding a recipient costs one sealed box (48 bytes of overhead plus the
//! key), not another copy of the payload.

use crate::cipher::{open_payload, seal_payload, SealedPayload};
use crate::encoding::base64_bytes;
use crate::error::{CryptoError, CryptoResult};
use crate::key::{generate_package_key, InstallationKeypair, PackageKey, PublicKey};
use crate::sealed::{open_sealed, seal_to};
use ledgerlink_types::InstallationId;
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

/// An installation allowed to open an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Recipient {
    pub installation_id: InstallationId,
    pub public_key: PublicKey,
}

/// The package key sealed to one recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrappedKey {
    pub installation_id: InstallationId,
    #[serde(with = "base64_bytes")]
    pub wrapped_key: Vec<u8>,
}

/// A payload encrypted once and readable by every listed recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(with = "base64_bytes")]
    pub iv: Vec<u8>,
    #[serde(with = "base64_bytes")]
    pub ciphertext: Vec<u8>,
    pub recipient_keys: Vec<WrappedKey>,
}

impl Envelope {
    /// Installations this envelope was sealed for.
    pub fn recipients(&self) -> impl Iterator<Item = &InstallationId> {
        self.recipient_keys.iter().map(|k| &k.installation_id)
    }
}

/// Encrypts `plaintext` for every recipient.
pub fn seal_for_recipients(plaintext: &[u8], recipients: &[Recipient]) -> CryptoResult<Envelope> {
    if recipients.is_empty() {
        return Err(CryptoError::Encryption("envelope needs at least one recipient".into()));
    }

    let key = generate_package_key();
    let sealed = seal_payload(&key, plaintext)?;

    let recipient_keys = recipients
        .iter()
        .map(|r| {
            Ok(WrappedKey {
                installation_id: r.installation_id,
                wrapped_key: seal_to(&r.public_key, key.as_bytes())?,
            })
        })
        .collect::<CryptoResult<Vec<_>>>()?;

    Ok(Envelope {
        iv: sealed.iv.to_vec(),
        ciphertext: sealed.ciphertext,
        recipient_keys,
    })
}

/// Decrypts an envelope as installation `me`.
///
/// Returns [`CryptoError::NoRecipientKey`] when the envelope was not sealed
/// for `me`, and [`CryptoError::Decryption`] when unwrapping or
/// authentication fails.
pub fn open_envelope(
    envelope: &Envelope,
    me: InstallationId,
    keypair: &InstallationKeypair,
) -> CryptoResult<Vec<u8>> {
    let wrapped = envelope
        .recipient_keys
        .iter()
        .find(|k| k.installation_id == me)
        .ok_or(CryptoError::NoRecipientKey(me))?;

    let mut raw_key = open_sealed(keypair, &wrapped.wrapped_key)?;
    let key = PackageKey::from_slice(&raw_key);
    raw_key.zeroize();
    let key = key?;
    let payload = SealedPayload::from_parts(&envelope.iv, envelope.ciphertext.clone())?;
    open_payload(&key, &payload)
}
