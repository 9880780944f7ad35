use ledgerlink_sync::{Identity, SyncConfig, SyncError};
use pretty_assertions::assert_eq;
use std::time::Duration;

// ── Config ──────────────────────────────────────────────────────

#[test]
fn defaults_are_valid() {
    let config = SyncConfig::default();
    config.validate().unwrap();
    assert_eq!(config.full_history_batch_size, 100);
    assert_eq!(config.push_debounce(), Duration::from_millis(1500));
    assert!(config.chunk_push_timeout() > config.request_timeout());
}

#[test]
fn partial_toml_keeps_defaults() {
    let config = SyncConfig::from_toml_str(
        r#"
        relay_url = "https://relay.example.org"
        sync_interval_secs = 120
        "#,
    )
    .unwrap();
    assert_eq!(config.relay_url, "https://relay.example.org");
    assert_eq!(config.sync_interval(), Duration::from_secs(120));
    assert_eq!(config.full_history_batch_size, SyncConfig::default().full_history_batch_size);
}

#[test]
fn zero_batch_size_is_rejected() {
    let err = SyncConfig::from_toml_str("full_history_batch_size = 0").unwrap_err();
    assert!(matches!(err, SyncError::Config(_)));
}

#[test]
fn malformed_toml_is_a_config_error() {
    let err = SyncConfig::from_toml_str("relay_url = [").unwrap_err();
    assert!(matches!(err, SyncError::Config(_)));
}

#[test]
fn load_reads_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sync.toml");
    std::fs::write(&path, "push_debounce_ms = 250\n").unwrap();
    let config = SyncConfig::load(&path).unwrap();
    assert_eq!(config.push_debounce(), Duration::from_millis(250));
}

#[test]
fn load_missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = SyncConfig::load(dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, SyncError::Io(_)));
}

// ── Identity ────────────────────────────────────────────────────

#[test]
fn identity_survives_save_and_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("identity.json");
    let identity = Identity::generate("secret-token");
    identity.save(&path).unwrap();

    let loaded = Identity::load(&path).unwrap();
    assert_eq!(loaded.installation_id(), identity.installation_id());
    assert_eq!(loaded.token(), "secret-token");
    assert_eq!(loaded.public_key(), identity.public_key());
}

#[test]
fn identity_debug_hides_token() {
    let identity = Identity::generate("secret-token");
    assert!(!format!("{identity:?}").contains("secret-token"));
}
