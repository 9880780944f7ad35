//! Sync configuration.

use crate::error::{SyncError, SyncResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Configuration for the sync orchestrator and relay client.
///
/// Every field has a default, so a TOML file only needs the keys it changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Base URL of the relay.
    pub relay_url: String,
    /// Timeout for ordinary relay calls.
    pub request_timeout_secs: u64,
    /// Extended timeout for full-history chunk pushes.
    pub chunk_push_timeout_secs: u64,
    /// Transactions per full-history chunk.
    pub full_history_batch_size: usize,
    /// Period of the push/pull cycle.
    pub sync_interval_secs: u64,
    /// Quiet period after a local change before pushing it.
    pub push_debounce_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            relay_url: "https://relay.ledgerlink.app".to_string(),
            request_timeout_secs: 15,
            chunk_push_timeout_secs: 60,
            full_history_batch_size: 100,
            sync_interval_secs: 30,
            push_debounce_ms: 1500,
        }
    }
}

impl SyncConfig {
    /// Parses a TOML document and validates it.
    pub fn from_toml_str(s: &str) -> SyncResult<Self> {
        let config: SyncConfig = toml::from_str(s).map_err(|e| SyncError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads and validates a TOML file.
    pub fn load(path: impl AsRef<Path>) -> SyncResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> SyncResult<()> {
        if self.relay_url.trim().is_empty() {
            return Err(SyncError::Config("relay_url must not be empty".into()));
        }
        if self.full_history_batch_size == 0 {
            return Err(SyncError::Config("full_history_batch_size must be positive".into()));
        }
        if self.request_timeout_secs == 0 || self.chunk_push_timeout_secs == 0 {
            return Err(SyncError::Config("timeouts must be positive".into()));
        }
        if self.sync_interval_secs == 0 {
            return Err(SyncError::Config("sync_interval_secs must be positive".into()));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn chunk_push_timeout(&self) -> Duration {
        Duration::from_secs(self.chunk_push_timeout_secs)
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }

    pub fn push_debounce(&self) -> Duration {
        Duration::from_millis(self.push_debounce_ms)
    }
}
