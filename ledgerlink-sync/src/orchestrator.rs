//! Sync orchestration: handshakes, push, pull and the background loop.
//!
//! A cycle always pushes before it pulls, so local edits leave the device
//! before remote state is merged over them. Push and pull each carry an
//! in-flight flag; a second caller returns immediately instead of queueing.

use crate::config::SyncConfig;
use crate::crypto::{decrypt_package, encrypt_package};
use crate::error::{SyncError, SyncResult};
use crate::export::PackageExporter;
use crate::handshake::{Handshake, HandshakeReport};
use crate::identity::Identity;
use crate::importer::{ImportReport, PackageImporter};
use crate::transport::{PulledPackage, RelayTransport};
use ledgerlink_crypto::{PublicKey, Recipient};
use ledgerlink_store::{LedgerStore, LinkState, Watermark};
use ledgerlink_types::{Clock, EntityId, InstallationId};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::Notify;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Result of [`SyncOrchestrator::push_pending`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Another push was already running.
    InFlight,
    /// No linked installations to push to.
    NoRecipients,
    /// Nothing changed since the last push.
    NothingToPush,
    Pushed { records: usize, recipients: usize },
}

/// Result of one pull.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PullReport {
    /// Packages decrypted and merged.
    pub imported: usize,
    /// Packages left unacknowledged for a later pull.
    pub failed: usize,
    /// Records applied across all merged packages.
    pub records_applied: usize,
    pub currencies_needing_rates: Vec<EntityId>,
}

/// Summary of one full sync cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub new_devices: Vec<InstallationId>,
    pub pushed: Option<PushOutcome>,
    pub pull: Option<PullReport>,
    /// Steps that failed; later steps still ran.
    pub errors: Vec<String>,
}

/// Clears its flag when dropped.
struct FlightGuard<'a>(&'a AtomicBool);

impl<'a> FlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| FlightGuard(flag))
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Drives replication for one installation.
pub struct SyncOrchestrator {
    identity: Identity,
    store: LedgerStore,
    transport: Arc<dyn RelayTransport>,
    config: SyncConfig,
    exporter: PackageExporter,
    importer: PackageImporter,
    pushing: AtomicBool,
    pulling: AtomicBool,
    local_change: Notify,
}

impl SyncOrchestrator {
    pub fn new(
        identity: Identity,
        store: LedgerStore,
        transport: Arc<dyn RelayTransport>,
        config: SyncConfig,
    ) -> Self {
        let exporter = PackageExporter::new(store.clone(), identity.installation_id());
        let importer = PackageImporter::new(store.clone());
        Self {
            identity,
            store,
            transport,
            config,
            exporter,
            importer,
            pushing: AtomicBool::new(false),
            pulling: AtomicBool::new(false),
            local_change: Notify::new(),
        }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn store(&self) -> &LedgerStore {
        &self.store
    }

    fn handshake(&self) -> Handshake<'_> {
        Handshake::new(&self.identity, &self.store, self.transport.as_ref(), &self.config)
    }

    pub fn link_state(&self) -> SyncResult<LinkState> {
        Ok(self.store.link_state()?)
    }

    /// Starts linking with another installation.
    pub async fn link(&self, target: InstallationId, target_key: PublicKey) -> SyncResult<()> {
        self.handshake().send_init(target, target_key).await
    }

    /// Processes handshakes waiting on the relay.
    pub async fn process_handshakes(&self) -> SyncResult<HandshakeReport> {
        self.handshake().poll_and_process_init().await
    }

    /// Signals a local edit; the background loop pushes after the debounce.
    pub fn notify_local_change(&self) {
        self.local_change.notify_one();
    }

    // ── Push ─────────────────────────────────────────────────────

    /// Pushes everything changed since the last successful push to every
    /// linked installation, in one package.
    pub async fn push_pending(&self) -> SyncResult<PushOutcome> {
        let Some(_guard) = FlightGuard::acquire(&self.pushing) else {
            debug!("push already in flight");
            return Ok(PushOutcome::InFlight);
        };

        let recipients: Vec<Recipient> = self
            .store
            .linked_installations()?
            .into_iter()
            .map(|l| Recipient {
                installation_id: l.installation_id,
                public_key: l.public_key,
            })
            .collect();
        if recipients.is_empty() {
            return Ok(PushOutcome::NoRecipients);
        }

        let since = self.store.watermark(Watermark::Push)?;
        let package = self.exporter.export_since(since)?;
        if package.is_empty() {
            return Ok(PushOutcome::NothingToPush);
        }

        let encrypted = encrypt_package(&package, &recipients)?;
        self.transport
            .push(&encrypted, self.identity.token(), None)
            .await?;
        self.store.set_watermark(Watermark::Push, package.created_at)?;

        let records = package.record_count();
        info!(records, recipients = recipients.len(), "pushed package");
        Ok(PushOutcome::Pushed {
            records,
            recipients: recipients.len(),
        })
    }

    // ── Pull ─────────────────────────────────────────────────────

    /// Fetches, decrypts and merges every package waiting for this
    /// installation. Returns `None` if a pull was already running.
    ///
    /// A package that fails to decrypt or import is logged and left on the
    /// relay; the pull watermark stops at the oldest such package so it is
    /// retried.
    pub async fn pull(&self) -> SyncResult<Option<PullReport>> {
        let Some(_guard) = FlightGuard::acquire(&self.pulling) else {
            debug!("pull already in flight");
            return Ok(None);
        };

        let me = self.identity.installation_id();
        let since = self.store.watermark(Watermark::Pull)?;
        let pulled = self.transport.pull(me, since, self.identity.token()).await?;
        let mut report = PullReport::default();
        if pulled.is_empty() {
            return Ok(Some(report));
        }

        let mut acked = Vec::with_capacity(pulled.len());
        let mut oldest_failure: Option<Clock> = None;
        let mut newest = since;

        for item in &pulled {
            newest = newest.max(item.received_at);
            match self.apply_pulled(item) {
                Ok(applied) => {
                    if let Some(import) = applied {
                        report.imported += 1;
                        report.records_applied += import.total_applied();
                        report
                            .currencies_needing_rates
                            .extend(import.currencies_needing_rates);
                    }
                    acked.push(item.package_id.clone());
                }
                Err(e) => {
                    warn!(package = %item.package_id, sender = %item.package.sender_id, "package not applied: {e}");
                    report.failed += 1;
                    oldest_failure = Some(match oldest_failure {
                        Some(c) => c.min(item.received_at),
                        None => item.received_at,
                    });
                }
            }
        }

        self.transport.ack(&acked, self.identity.token()).await?;
        let next = oldest_failure.unwrap_or(newest).max(since);
        self.store.set_watermark(Watermark::Pull, next)?;

        info!(
            imported = report.imported,
            failed = report.failed,
            "pull complete"
        );
        Ok(Some(report))
    }

    /// Decrypts and merges one pulled package. Our own packages are
    /// acknowledged without importing.
    fn apply_pulled(&self, item: &PulledPackage) -> SyncResult<Option<ImportReport>> {
        let me = self.identity.installation_id();
        if item.package.sender_id == me {
            return Ok(None);
        }
        let package = decrypt_package(&item.package, me, self.identity.keypair())?;
        let report = self.importer.import(&package)?;

        if self.store.pending_handshake()? == Some(package.sender_id) {
            info!(device = %package.sender_id, "handshake completed");
            self.store.set_pending_handshake(None)?;
        }
        Ok(Some(report))
    }

    // ── Cycle ────────────────────────────────────────────────────

    /// Handshakes, then push, then pull. A failed step is recorded and the
    /// remaining steps still run.
    pub async fn run_cycle(&self) -> CycleReport {
        let mut report = CycleReport::default();

        match self.process_handshakes().await {
            Ok(h) => report.new_devices = h.new_devices,
            Err(e) => record_failure(&mut report, "handshake", e),
        }
        match self.push_pending().await {
            Ok(outcome) => report.pushed = Some(outcome),
            Err(e) => record_failure(&mut report, "push", e),
        }
        match self.pull().await {
            Ok(pull) => report.pull = pull,
            Err(e) => record_failure(&mut report, "pull", e),
        }
        report
    }

    /// Runs periodic cycles and debounced pushes until `shutdown` resolves.
    ///
    /// The first cycle runs immediately. Local edits (store change notices
    /// or [`notify_local_change`](Self::notify_local_change)) re-arm a
    /// debounce timer; the push fires once edits stop for the configured
    /// delay.
    pub async fn run(self: Arc<Self>, shutdown: impl Future<Output = ()> + Send) {
        let mut ticker = time::interval(self.config.sync_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut changes = self.store.subscribe();
        let debounce = time::sleep(self.config.push_debounce());
        tokio::pin!(debounce);
        tokio::pin!(shutdown);
        let mut armed = false;

        info!(installation = %self.identity.installation_id(), "sync loop started");
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => {
                    let report = self.run_cycle().await;
                    debug!(?report, "sync cycle finished");
                }
                notice = changes.recv() => match notice {
                    Ok(_) | Err(RecvError::Lagged(_)) => {
                        debounce.as_mut().reset(Instant::now() + self.config.push_debounce());
                        armed = true;
                    }
                    Err(RecvError::Closed) => changes = self.store.subscribe(),
                },
                _ = self.local_change.notified() => {
                    debounce.as_mut().reset(Instant::now() + self.config.push_debounce());
                    armed = true;
                }
                _ = &mut debounce, if armed => {
                    armed = false;
                    match self.push_pending().await {
                        Ok(outcome) => debug!(?outcome, "debounced push"),
                        Err(e) => warn!("debounced push failed: {e}"),
                    }
                }
            }
        }
        info!("sync loop stopped");
    }
}

fn record_failure(report: &mut CycleReport, step: &str, e: SyncError) {
    if e.is_transient() {
        warn!("{step} failed: {e}");
    } else {
        error!("{step} failed: {e}");
    }
    report.errors.push(format!("{step}: {e}"));
}
