//! Package encryption for N recipients.

use crate::error::{SyncError, SyncResult};
use crate::package::{EncryptedSyncPackage, SyncPackage};
use ledgerlink_crypto::{open_envelope, seal_for_recipients, InstallationKeypair, Recipient};
use ledgerlink_types::InstallationId;

/// Serializes `package` and seals it once for every recipient.
pub fn encrypt_package(package: &SyncPackage, recipients: &[Recipient]) -> SyncResult<EncryptedSyncPackage> {
    if recipients.is_empty() {
        return Err(SyncError::NoRecipients);
    }
    let plaintext = serde_json::to_vec(package)?;
    let envelope = seal_for_recipients(&plaintext, recipients)?;
    Ok(EncryptedSyncPackage {
        sender_id: package.sender_id,
        envelope,
    })
}

/// Opens a package as installation `me`.
///
/// Fails with [`SyncError::NoKeyForInstallation`] when the package was not
/// sealed for `me`, and with [`SyncError::Protocol`] when the inner sender
/// disagrees with the outer one.
pub fn decrypt_package(
    encrypted: &EncryptedSyncPackage,
    me: InstallationId,
    keypair: &InstallationKeypair,
) -> SyncResult<SyncPackage> {
    let plaintext = open_envelope(&encrypted.envelope, me, keypair)?;
    let package: SyncPackage = serde_json::from_slice(&plaintext)?;
    if package.sender_id != encrypted.sender_id {
        return Err(SyncError::Protocol(format!(
            "sender mismatch: envelope says {}, package says {}",
            encrypted.sender_id, package.sender_id
        )));
    }
    Ok(package)
}
