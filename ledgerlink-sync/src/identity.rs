//! This installation's identity in the sync network.

use crate::error::SyncResult;
use ledgerlink_crypto::{InstallationKeypair, PublicKey, Recipient};
use ledgerlink_types::InstallationId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Installation id, relay auth token and asymmetric keypair.
#[derive(Clone)]
pub struct Identity {
    installation_id: InstallationId,
    token: String,
    keypair: InstallationKeypair,
}

#[derive(Serialize, Deserialize)]
struct IdentityFile {
    installation_id: InstallationId,
    token: String,
    secret_key: String,
}

impl Identity {
    pub fn new(installation_id: InstallationId, token: impl Into<String>, keypair: InstallationKeypair) -> Self {
        Self {
            installation_id,
            token: token.into(),
            keypair,
        }
    }

    /// A brand-new installation with a fresh id and keypair.
    pub fn generate(token: impl Into<String>) -> Self {
        Self::new(InstallationId::new(), token, InstallationKeypair::generate())
    }

    pub fn installation_id(&self) -> InstallationId {
        self.installation_id
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn keypair(&self) -> &InstallationKeypair {
        &self.keypair
    }

    pub fn public_key(&self) -> PublicKey {
        self.keypair.public_key()
    }

    /// This installation as an envelope recipient.
    pub fn recipient(&self) -> Recipient {
        Recipient {
            installation_id: self.installation_id,
            public_key: self.public_key(),
        }
    }

    /// Reads an identity previously written by [`Identity::save`].
    pub fn load(path: impl AsRef<Path>) -> SyncResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        let file: IdentityFile = serde_json::from_str(&raw)?;
        Ok(Self::new(
            file.installation_id,
            file.token,
            InstallationKeypair::from_secret_base64(&file.secret_key)?,
        ))
    }

    /// Writes the identity, secret key included, as JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> SyncResult<()> {
        let file = IdentityFile {
            installation_id: self.installation_id,
            token: self.token.clone(),
            secret_key: self.keypair.secret_base64(),
        };
        std::fs::write(path, serde_json::to_string_pretty(&file)?)?;
        Ok(())
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("installation_id", &self.installation_id)
            .field("token", &"[REDACTED]")
            .field("keypair", &self.keypair)
            .finish()
    }
}
