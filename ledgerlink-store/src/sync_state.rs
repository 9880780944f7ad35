//! Persisted replication state: linked installations, watermarks and the
//! pending-handshake marker.

use crate::error::StorageResult;
use crate::row;
use crate::store::LedgerStore;
use ledgerlink_crypto::PublicKey;
use ledgerlink_types::{Clock, InstallationId};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

const META_LAST_PUSH: &str = "last_push";
const META_LAST_PULL: &str = "last_pull";
const META_PENDING_HANDSHAKE: &str = "pending_handshake";

/// A peer whose public key this device holds; a valid push recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkedInstallation {
    pub installation_id: InstallationId,
    pub public_key: PublicKey,
    pub linked_at: Clock,
}

/// Which replication watermark.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Watermark {
    /// Clock of the last package the relay acknowledged from us.
    Push,
    /// Relay receipt time from which the next pull starts.
    Pull,
}

impl Watermark {
    const fn key(self) -> &'static str {
        match self {
            Watermark::Push => META_LAST_PUSH,
            Watermark::Pull => META_LAST_PULL,
        }
    }
}

/// Linking state of this installation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// No linked devices and no handshake in progress.
    Unlinked,
    /// A handshake was sent and nothing has come back from the target yet.
    Linking { target: InstallationId },
    /// At least one linked device; periodic sync is active.
    Linked { devices: usize },
}

/// Result of recording a linked installation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkOutcome {
    /// Not previously linked.
    New,
    /// Already linked with the same public key.
    Unchanged,
    /// Already linked; the public key was replaced.
    KeyChanged,
}

fn get_meta(conn: &Connection, key: &str) -> StorageResult<Option<String>> {
    let value = conn
        .query_row("SELECT value FROM sync_meta WHERE key = ?1", params![key], |r| r.get(0))
        .optional()?;
    Ok(value)
}

fn set_meta(conn: &Connection, key: &str, value: &str) -> StorageResult<()> {
    conn.execute(
        "INSERT INTO sync_meta (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![key, value],
    )?;
    Ok(())
}

fn clear_meta(conn: &Connection, key: &str) -> StorageResult<()> {
    conn.execute("DELETE FROM sync_meta WHERE key = ?1", params![key])?;
    Ok(())
}

impl LedgerStore {
    // ── Linked installations ─────────────────────────────────────

    pub fn linked_installations(&self) -> StorageResult<Vec<LinkedInstallation>> {
        self.read(|conn| {
            let mut stmt = conn.prepare(
                "SELECT installation_id, public_key, linked_at FROM linked_installations
                 ORDER BY linked_at, installation_id",
            )?;
            let rows = stmt
                .query_map([], |r| {
                    Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?, row::clock(r, 2)?))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows.into_iter()
                .map(|(id, key, linked_at)| -> StorageResult<LinkedInstallation> {
                    Ok(LinkedInstallation {
                        installation_id: id.parse()?,
                        public_key: key.parse()?,
                        linked_at,
                    })
                })
                .collect()
        })
    }

    pub fn linked_installation(&self, id: InstallationId) -> StorageResult<Option<LinkedInstallation>> {
        Ok(self
            .linked_installations()?
            .into_iter()
            .find(|l| l.installation_id == id))
    }

    /// Trusts `public_key` for `id` (trust on first use).
    pub fn link_installation(&self, id: InstallationId, public_key: PublicKey) -> StorageResult<LinkOutcome> {
        self.atomic(|conn| {
            let existing: Option<String> = conn
                .query_row(
                    "SELECT public_key FROM linked_installations WHERE installation_id = ?1",
                    params![id.to_string()],
                    |r| r.get(0),
                )
                .optional()?;
            let encoded = public_key.to_base64();
            let outcome = match existing {
                None => LinkOutcome::New,
                Some(current) if current == encoded => return Ok(LinkOutcome::Unchanged),
                Some(_) => LinkOutcome::KeyChanged,
            };
            conn.execute(
                "INSERT INTO linked_installations (installation_id, public_key, linked_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(installation_id) DO UPDATE SET public_key = excluded.public_key",
                params![id.to_string(), encoded, Clock::now().as_secs()],
            )?;
            Ok(outcome)
        })
    }

    pub fn unlink_installation(&self, id: InstallationId) -> StorageResult<bool> {
        self.atomic(|conn| {
            let removed = conn.execute(
                "DELETE FROM linked_installations WHERE installation_id = ?1",
                params![id.to_string()],
            )?;
            Ok(removed > 0)
        })
    }

    // ── Watermarks ───────────────────────────────────────────────

    pub fn watermark(&self, which: Watermark) -> StorageResult<Clock> {
        self.read(|conn| {
            Ok(get_meta(conn, which.key())?
                .and_then(|v| v.parse::<i64>().ok())
                .map(Clock::new)
                .unwrap_or(Clock::ZERO))
        })
    }

    pub fn set_watermark(&self, which: Watermark, clock: Clock) -> StorageResult<()> {
        self.atomic(|conn| set_meta(conn, which.key(), &clock.as_secs().to_string()))
    }

    // ── Handshake marker ─────────────────────────────────────────

    pub fn pending_handshake(&self) -> StorageResult<Option<InstallationId>> {
        self.read(|conn| {
            get_meta(conn, META_PENDING_HANDSHAKE)?
                .map(|v| v.parse().map_err(Into::into))
                .transpose()
        })
    }

    pub fn set_pending_handshake(&self, target: Option<InstallationId>) -> StorageResult<()> {
        self.atomic(|conn| match target {
            Some(id) => set_meta(conn, META_PENDING_HANDSHAKE, &id.to_string()),
            None => clear_meta(conn, META_PENDING_HANDSHAKE),
        })
    }

    pub fn link_state(&self) -> StorageResult<LinkState> {
        if let Some(target) = self.pending_handshake()? {
            return Ok(LinkState::Linking { target });
        }
        let devices = self.linked_installations()?.len();
        Ok(if devices == 0 {
            LinkState::Unlinked
        } else {
            LinkState::Linked { devices }
        })
    }
}
