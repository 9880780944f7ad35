//! End-to-end encrypted relay sync for LedgerLink.
//!
//! Installations replicate a personal-finance ledger through a blind relay.
//! The relay stores and forwards ciphertext; it never sees a plaintext
//! record.
//!
//! # Architecture
//!
//! - **Export**: builds delta packages (everything changed since the push
//!   watermark) and chunked full-history packages for new devices
//! - **Crypto**: seals each package once for every linked installation
//! - **Transport**: the relay contract, with an HTTP client and an
//!   in-memory relay
//! - **Import**: merges packages with last-writer-wins per entity and
//!   tombstones, atomically per package
//! - **Handshake**: links installations and introduces them to each other
//! - **Orchestrator**: runs cycles (handshakes, push, pull) on an interval
//!   and debounces pushes after local edits
//!
//! # Example
//!
//! ```no_run
//! use ledgerlink_store::LedgerStore;
//! use ledgerlink_sync::{HttpRelay, Identity, RelayConfig, SyncConfig, SyncOrchestrator};
//! use std::sync::Arc;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let config = SyncConfig::default();
//! let store = LedgerStore::open("ledger.db")?;
//! let identity = Identity::load("identity.json")?;
//! let relay = HttpRelay::new(RelayConfig::from(&config))?;
//!
//! let orchestrator = SyncOrchestrator::new(identity, store, Arc::new(relay), config);
//! let report = orchestrator.run_cycle().await;
//! println!("{report:?}");
//! # Ok(())
//! # }
//! ```

mod config;
mod crypto;
mod error;
mod export;
mod handshake;
mod identity;
mod importer;
mod orchestrator;
mod package;
mod relay;
pub mod transport;

pub use config::SyncConfig;
pub use crypto::{decrypt_package, encrypt_package};
pub use error::{SyncError, SyncResult};
pub use export::{PackageExporter, DEFAULT_BATCH_SIZE};
pub use handshake::{Handshake, HandshakePayload, HandshakeReport};
pub use identity::Identity;
pub use importer::{ImportReport, PackageImporter};
pub use orchestrator::{CycleReport, PullReport, PushOutcome, SyncOrchestrator};
pub use package::{EncryptedSyncPackage, SyncPackage, PACKAGE_VERSION};
pub use relay::{HttpRelay, RelayConfig};
pub use transport::{PendingInit, PulledPackage, RelayTransport};

pub use ledgerlink_store::LinkState;
