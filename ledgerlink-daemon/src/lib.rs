//! Command-line front end for a LedgerLink installation.
//!
//! Wires the on-disk identity, the ledger database and the relay client
//! into a [`SyncOrchestrator`] and exposes the operations a user needs:
//! creating an identity, linking to another installation, one-off syncs and
//! the long-running background loop.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use ledgerlink_crypto::PublicKey;
use ledgerlink_store::{BalanceDrift, LedgerStore, LinkState};
use ledgerlink_sync::{CycleReport, HttpRelay, Identity, RelayConfig, SyncConfig, SyncOrchestrator};
use ledgerlink_types::InstallationId;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "ledgerlink")]
#[command(about = "End-to-end encrypted ledger sync")]
pub struct Args {
    /// Sync configuration file (TOML); defaults apply when omitted
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Path to the ledger database
    #[arg(short, long, global = true, default_value = "ledgerlink.db")]
    pub database: PathBuf,

    /// Path to the installation identity file
    #[arg(short, long, global = true, default_value = "identity.json")]
    pub identity: PathBuf,

    /// Enable verbose debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Create a new installation identity
    Keygen {
        /// Relay authentication token issued for this installation
        #[arg(long)]
        token: String,
        /// Replace an existing identity file
        #[arg(long)]
        force: bool,
    },
    /// Print this installation's id and public key
    Show,
    /// Link with another installation
    Link {
        /// Installation id of the target
        #[arg(long)]
        target: InstallationId,
        /// Base64 public key of the target, obtained out of band
        #[arg(long)]
        public_key: String,
    },
    /// Show linked installations and the linking state
    Status,
    /// Run one sync cycle and exit
    Sync,
    /// Sync in the background until interrupted
    Run,
    /// Compare cached account balances against their lines
    Verify,
}

/// Everything a command needs, loaded from disk.
pub struct Session {
    pub config: SyncConfig,
    pub store: LedgerStore,
    pub orchestrator: Arc<SyncOrchestrator>,
}

impl Session {
    pub fn open(args: &Args) -> Result<Self> {
        let config = load_config(args.config.as_deref())?;
        let identity = Identity::load(&args.identity)
            .with_context(|| format!("failed to load identity from {}", args.identity.display()))?;
        let store = LedgerStore::open(&args.database)
            .with_context(|| format!("failed to open ledger at {}", args.database.display()))?;
        let relay = HttpRelay::new(RelayConfig::from(&config))?;
        let orchestrator = Arc::new(SyncOrchestrator::new(
            identity,
            store.clone(),
            Arc::new(relay),
            config.clone(),
        ));
        Ok(Self {
            config,
            store,
            orchestrator,
        })
    }
}

pub fn load_config(path: Option<&Path>) -> Result<SyncConfig> {
    match path {
        Some(path) => SyncConfig::load(path)
            .with_context(|| format!("failed to load config from {}", path.display())),
        None => Ok(SyncConfig::default()),
    }
}

/// Writes a fresh identity to `path`.
pub fn keygen(path: &Path, token: &str, force: bool) -> Result<Identity> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to replace it)", path.display());
    }
    let identity = Identity::generate(token);
    identity.save(path)?;
    info!(installation = %identity.installation_id(), "generated identity");
    Ok(identity)
}

/// Sends a handshake to `target`.
pub async fn link(session: &Session, target: InstallationId, public_key: &str) -> Result<()> {
    let key: PublicKey = public_key.parse().context("invalid public key")?;
    session.orchestrator.link(target, key).await?;
    Ok(())
}

pub async fn sync_once(session: &Session) -> CycleReport {
    session.orchestrator.run_cycle().await
}

/// Runs the background loop until `shutdown` resolves.
pub async fn run(session: &Session, shutdown: impl std::future::Future<Output = ()> + Send) {
    session.orchestrator.clone().run(shutdown).await;
}

pub fn status(session: &Session) -> Result<(LinkState, Vec<InstallationId>)> {
    let state = session.orchestrator.link_state()?;
    let linked = session
        .store
        .linked_installations()?
        .into_iter()
        .map(|l| l.installation_id)
        .collect();
    Ok((state, linked))
}

pub fn verify(session: &Session) -> Result<Vec<BalanceDrift>> {
    Ok(session.store.verify_balances()?)
}
