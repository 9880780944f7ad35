//! Relay transport abstraction.
//!
//! The relay is a blind store-and-forward service: it sees sender and
//! recipient ids and opaque ciphertext, never a plaintext package.

use crate::error::SyncResult;
use crate::package::EncryptedSyncPackage;
use async_trait::async_trait;
use ledgerlink_crypto::encoding::base64_bytes;
use ledgerlink_types::{Clock, InstallationId};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A package waiting on the relay for this installation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PulledPackage {
    pub package_id: String,
    /// Relay receipt time; the next pull starts from here.
    pub received_at: Clock,
    pub package: EncryptedSyncPackage,
}

/// A handshake payload addressed to this installation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingInit {
    pub init_id: String,
    /// Sealed `{uuid, public_key}` of the introduced installation.
    #[serde(with = "base64_bytes")]
    pub payload: Vec<u8>,
}

/// Calls against the relay. Every call is authenticated with `token` and
/// bounded by a timeout.
#[async_trait]
pub trait RelayTransport: Send + Sync {
    /// Uploads a package for every installation in its recipient list.
    /// `timeout` overrides the default bound (full-history chunks).
    async fn push(
        &self,
        package: &EncryptedSyncPackage,
        token: &str,
        timeout: Option<Duration>,
    ) -> SyncResult<()>;

    /// Packages addressed to `installation_id` received at or after `since`
    /// and not yet acknowledged by it.
    async fn pull(
        &self,
        installation_id: InstallationId,
        since: Clock,
        token: &str,
    ) -> SyncResult<Vec<PulledPackage>>;

    /// Acknowledges packages after they were decrypted and imported.
    async fn ack(&self, package_ids: &[String], token: &str) -> SyncResult<()>;

    /// Posts a sealed handshake payload for `target`.
    async fn post_init(&self, target: InstallationId, payload: &[u8], token: &str) -> SyncResult<()>;

    /// Handshake payloads addressed to `installation_id`.
    async fn get_init(&self, installation_id: InstallationId, token: &str) -> SyncResult<Vec<PendingInit>>;

    /// Removes processed handshake payloads.
    async fn delete_init(&self, init_ids: &[String], token: &str) -> SyncResult<()>;
}

/// An in-memory relay for tests and local multi-device setups.
pub mod mock {
    use super::*;
    use crate::error::SyncError;
    use std::collections::{BTreeSet, HashMap};
    use std::sync::{Arc, Mutex, MutexGuard};

    #[derive(Debug)]
    struct StoredPackage {
        id: String,
        received_at: Clock,
        package: EncryptedSyncPackage,
        /// Recipients that have not acknowledged yet.
        pending: BTreeSet<InstallationId>,
    }

    #[derive(Debug)]
    struct StoredInit {
        id: String,
        target: InstallationId,
        payload: Vec<u8>,
    }

    #[derive(Debug, Default)]
    struct RelayState {
        tokens: HashMap<String, InstallationId>,
        packages: Vec<StoredPackage>,
        inits: Vec<StoredInit>,
        next_id: u64,
        offline: bool,
        push_timeouts: Vec<Option<Duration>>,
    }

    impl RelayState {
        fn next_id(&mut self, prefix: &str) -> String {
            self.next_id += 1;
            format!("{prefix}-{}", self.next_id)
        }

        fn caller(&self, token: &str) -> SyncResult<InstallationId> {
            if self.offline {
                return Err(SyncError::Network("relay unreachable".into()));
            }
            self.tokens
                .get(token)
                .copied()
                .ok_or_else(|| SyncError::Auth("unknown token".into()))
        }
    }

    /// Blind store-and-forward relay kept in memory.
    ///
    /// Clones share state, so several simulated devices can talk through
    /// one relay.
    #[derive(Debug, Clone, Default)]
    pub struct InMemoryRelay {
        state: Arc<Mutex<RelayState>>,
    }

    impl InMemoryRelay {
        pub fn new() -> Self {
            Self::default()
        }

        fn state(&self) -> SyncResult<MutexGuard<'_, RelayState>> {
            self.state
                .lock()
                .map_err(|_| SyncError::Network("relay state poisoned".into()))
        }

        /// Accepts `token` as the credential of `installation_id`.
        pub fn register(&self, installation_id: InstallationId, token: &str) {
            if let Ok(mut state) = self.state() {
                state.tokens.insert(token.to_string(), installation_id);
            }
        }

        /// Makes every call fail with a network error while `offline`.
        pub fn set_offline(&self, offline: bool) {
            if let Ok(mut state) = self.state() {
                state.offline = offline;
            }
        }

        /// Packages still waiting for `installation_id`.
        pub fn pending_for(&self, installation_id: InstallationId) -> usize {
            self.state()
                .map(|s| {
                    s.packages
                        .iter()
                        .filter(|p| p.pending.contains(&installation_id))
                        .count()
                })
                .unwrap_or(0)
        }

        /// Handshake payloads still waiting for `installation_id`.
        pub fn inits_for(&self, installation_id: InstallationId) -> usize {
            self.state()
                .map(|s| s.inits.iter().filter(|i| i.target == installation_id).count())
                .unwrap_or(0)
        }

        /// Timeout override passed with each push, in push order.
        pub fn push_timeouts(&self) -> Vec<Option<Duration>> {
            self.state().map(|s| s.push_timeouts.clone()).unwrap_or_default()
        }
    }

    #[async_trait]
    impl RelayTransport for InMemoryRelay {
        async fn push(
            &self,
            package: &EncryptedSyncPackage,
            token: &str,
            timeout: Option<Duration>,
        ) -> SyncResult<()> {
            let mut state = self.state()?;
            let sender = state.caller(token)?;
            if sender != package.sender_id {
                return Err(SyncError::Auth("sender does not match token".into()));
            }
            let id = state.next_id("pkg");
            state.push_timeouts.push(timeout);
            let pending = package.envelope.recipients().copied().collect();
            state.packages.push(StoredPackage {
                id,
                received_at: Clock::now(),
                package: package.clone(),
                pending,
            });
            Ok(())
        }

        async fn pull(
            &self,
            installation_id: InstallationId,
            since: Clock,
            token: &str,
        ) -> SyncResult<Vec<PulledPackage>> {
            let state = self.state()?;
            if state.caller(token)? != installation_id {
                return Err(SyncError::Auth("token does not belong to installation".into()));
            }
            Ok(state
                .packages
                .iter()
                .filter(|p| p.received_at >= since && p.pending.contains(&installation_id))
                .map(|p| PulledPackage {
                    package_id: p.id.clone(),
                    received_at: p.received_at,
                    package: p.package.clone(),
                })
                .collect())
        }

        async fn ack(&self, package_ids: &[String], token: &str) -> SyncResult<()> {
            let mut state = self.state()?;
            let caller = state.caller(token)?;
            for stored in state.packages.iter_mut() {
                if package_ids.contains(&stored.id) {
                    stored.pending.remove(&caller);
                }
            }
            state.packages.retain(|p| !p.pending.is_empty());
            Ok(())
        }

        async fn post_init(&self, target: InstallationId, payload: &[u8], token: &str) -> SyncResult<()> {
            let mut state = self.state()?;
            state.caller(token)?;
            let id = state.next_id("init");
            state.inits.push(StoredInit {
                id,
                target,
                payload: payload.to_vec(),
            });
            Ok(())
        }

        async fn get_init(&self, installation_id: InstallationId, token: &str) -> SyncResult<Vec<PendingInit>> {
            let state = self.state()?;
            if state.caller(token)? != installation_id {
                return Err(SyncError::Auth("token does not belong to installation".into()));
            }
            Ok(state
                .inits
                .iter()
                .filter(|i| i.target == installation_id)
                .map(|i| PendingInit {
                    init_id: i.id.clone(),
                    payload: i.payload.clone(),
                })
                .collect())
        }

        async fn delete_init(&self, init_ids: &[String], token: &str) -> SyncResult<()> {
            let mut state = self.state()?;
            let caller = state.caller(token)?;
            state
                .inits
                .retain(|i| !(i.target == caller && init_ids.contains(&i.id)));
            Ok(())
        }
    }
}
