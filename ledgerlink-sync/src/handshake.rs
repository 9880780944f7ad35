//! Device handshake (init) protocol.
//!
//! # Flow
//!
//! 1. The new device sends `{uuid, public_key}` sealed to the target's key
//!    and trusts the target immediately.
//! 2. The target opens the payload, trusts the sender (trust on first use),
//!    pushes it the full ledger history in chunks, then introduces it to
//!    every other linked device and vice versa.
//! 3. Introduced devices run the same processing, so every pair ends up
//!    linked without a manual handshake. Payloads about an installation
//!    that is already trusted with the same key are acknowledged and
//!    dropped, which ends the fan-out.

use crate::config::SyncConfig;
use crate::crypto::encrypt_package;
use crate::error::{SyncError, SyncResult};
use crate::export::PackageExporter;
use crate::identity::Identity;
use crate::transport::{PendingInit, RelayTransport};
use ledgerlink_crypto::{open_sealed, seal_to, PublicKey, Recipient};
use ledgerlink_store::{LedgerStore, LinkOutcome};
use ledgerlink_types::InstallationId;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// The sealed body of a handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakePayload {
    pub uuid: InstallationId,
    pub public_key: PublicKey,
}

impl HandshakePayload {
    /// Serializes and seals the payload for `recipient`.
    pub fn seal_for(&self, recipient: &PublicKey) -> SyncResult<Vec<u8>> {
        Ok(seal_to(recipient, &serde_json::to_vec(self)?)?)
    }
}

/// Outcome of one poll of pending handshakes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HandshakeReport {
    /// Installations linked by this poll.
    pub new_devices: Vec<InstallationId>,
    /// Payloads acknowledged (processed or unreadable).
    pub processed: usize,
    /// Payloads left on the relay for the next poll.
    pub retained: usize,
    /// Introductions that could not be posted.
    pub failed_introductions: usize,
}

/// Handshake operations for one installation.
pub struct Handshake<'a> {
    identity: &'a Identity,
    store: &'a LedgerStore,
    transport: &'a dyn RelayTransport,
    config: &'a SyncConfig,
}

impl<'a> Handshake<'a> {
    pub fn new(
        identity: &'a Identity,
        store: &'a LedgerStore,
        transport: &'a dyn RelayTransport,
        config: &'a SyncConfig,
    ) -> Self {
        Self {
            identity,
            store,
            transport,
            config,
        }
    }

    fn own_payload(&self) -> HandshakePayload {
        HandshakePayload {
            uuid: self.identity.installation_id(),
            public_key: self.identity.public_key(),
        }
    }

    /// Starts linking with `target`, whose public key was obtained out of
    /// band.
    pub async fn send_init(&self, target: InstallationId, target_key: PublicKey) -> SyncResult<()> {
        if target == self.identity.installation_id() {
            return Err(SyncError::Protocol("cannot link an installation to itself".into()));
        }
        let sealed = self.own_payload().seal_for(&target_key)?;
        self.transport
            .post_init(target, &sealed, self.identity.token())
            .await?;
        self.store.link_installation(target, target_key)?;
        self.store.set_pending_handshake(Some(target))?;
        info!(%target, "handshake sent");
        Ok(())
    }

    /// Processes every handshake waiting on the relay for this installation.
    ///
    /// Payloads that fail for transport reasons stay on the relay for the
    /// next poll; unreadable ones are dropped.
    pub async fn poll_and_process_init(&self) -> SyncResult<HandshakeReport> {
        let me = self.identity.installation_id();
        let pending = self.transport.get_init(me, self.identity.token()).await?;
        let mut report = HandshakeReport::default();
        if pending.is_empty() {
            return Ok(report);
        }

        let mut done = Vec::with_capacity(pending.len());
        for init in &pending {
            match self.process(init, &mut report).await {
                Ok(Some(device)) => {
                    report.new_devices.push(device);
                    done.push(init.init_id.clone());
                }
                Ok(None) => done.push(init.init_id.clone()),
                Err(e) if e.is_transient() => {
                    warn!(init = %init.init_id, "handshake deferred: {e}");
                    report.retained += 1;
                }
                Err(e) => {
                    warn!(init = %init.init_id, "dropping unreadable handshake: {e}");
                    done.push(init.init_id.clone());
                }
            }
        }

        report.processed = done.len();
        self.transport.delete_init(&done, self.identity.token()).await?;
        Ok(report)
    }

    async fn process(&self, init: &PendingInit, report: &mut HandshakeReport) -> SyncResult<Option<InstallationId>> {
        let plaintext = open_sealed(self.identity.keypair(), &init.payload)?;
        let newcomer: HandshakePayload = serde_json::from_slice(&plaintext)?;

        if newcomer.uuid == self.identity.installation_id() {
            debug!("ignoring handshake describing this installation");
            return Ok(None);
        }

        let previous = self.store.linked_installation(newcomer.uuid)?;
        let outcome = self.store.link_installation(newcomer.uuid, newcomer.public_key)?;
        if outcome == LinkOutcome::Unchanged {
            debug!(device = %newcomer.uuid, "already linked");
            return Ok(None);
        }
        info!(device = %newcomer.uuid, ?outcome, "linked installation");

        if let Err(e) = self.push_full_history(&newcomer).await {
            // Put the link back as it was so the retained payload is
            // processed from scratch next time.
            match previous {
                Some(prev) => {
                    self.store.link_installation(prev.installation_id, prev.public_key)?;
                }
                None => {
                    self.store.unlink_installation(newcomer.uuid)?;
                }
            }
            return Err(e);
        }

        report.failed_introductions += self.introduce(&newcomer).await;
        Ok(Some(newcomer.uuid))
    }

    /// Pushes the whole ledger to one installation, chunk by chunk.
    pub async fn push_full_history(&self, target: &HandshakePayload) -> SyncResult<usize> {
        let exporter = PackageExporter::new(self.store.clone(), self.identity.installation_id());
        let chunks = exporter.export_full_history_chunked(self.config.full_history_batch_size)?;
        let recipients = [Recipient {
            installation_id: target.uuid,
            public_key: target.public_key,
        }];
        for chunk in &chunks {
            let encrypted = encrypt_package(chunk, &recipients)?;
            self.transport
                .push(
                    &encrypted,
                    self.identity.token(),
                    Some(self.config.chunk_push_timeout()),
                )
                .await?;
        }
        info!(device = %target.uuid, chunks = chunks.len(), "pushed full history");
        Ok(chunks.len())
    }

    /// Introduces `newcomer` to every other linked device and each of them
    /// to `newcomer`. Returns the number of introductions that failed.
    async fn introduce(&self, newcomer: &HandshakePayload) -> usize {
        let others = match self.store.linked_installations() {
            Ok(linked) => linked,
            Err(e) => {
                warn!("cannot list linked installations for introductions: {e}");
                return 0;
            }
        };

        let mut failed = 0;
        for other in others {
            if other.installation_id == newcomer.uuid
                || other.installation_id == self.identity.installation_id()
            {
                continue;
            }
            let existing = HandshakePayload {
                uuid: other.installation_id,
                public_key: other.public_key,
            };
            if let Err(e) = self.post_introduction(newcomer, &existing).await {
                warn!(to = %existing.uuid, about = %newcomer.uuid, "introduction failed: {e}");
                failed += 1;
            }
            if let Err(e) = self.post_introduction(&existing, newcomer).await {
                warn!(to = %newcomer.uuid, about = %existing.uuid, "introduction failed: {e}");
                failed += 1;
            }
        }
        failed
    }

    /// Tells `to` about `about`.
    async fn post_introduction(&self, about: &HandshakePayload, to: &HandshakePayload) -> SyncResult<()> {
        let sealed = about.seal_for(&to.public_key)?;
        self.transport
            .post_init(to.uuid, &sealed, self.identity.token())
            .await
    }
}
