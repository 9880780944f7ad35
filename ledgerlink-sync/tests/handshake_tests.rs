mod common;

use common::{transfer, Device, Fixture};
use ledgerlink_crypto::InstallationKeypair;
use ledgerlink_store::{repo, LinkState};
use ledgerlink_sync::transport::mock::InMemoryRelay;
use ledgerlink_sync::{HandshakePayload, RelayTransport, SyncError};
use ledgerlink_types::{Balance, InstallationId};
use pretty_assertions::assert_eq;

fn linked_ids(device: &Device) -> Vec<InstallationId> {
    let mut ids: Vec<InstallationId> = device
        .store
        .linked_installations()
        .unwrap()
        .into_iter()
        .map(|l| l.installation_id)
        .collect();
    ids.sort();
    ids
}

fn sorted(mut ids: Vec<InstallationId>) -> Vec<InstallationId> {
    ids.sort();
    ids
}

// ── Sending ─────────────────────────────────────────────────────

#[tokio::test]
async fn send_init_trusts_target_and_marks_pending() {
    let relay = InMemoryRelay::new();
    let a = Device::new(&relay, "a");
    let b = Device::new(&relay, "b");

    a.sync.link(b.id, b.public_key()).await.unwrap();

    assert_eq!(linked_ids(&a), vec![b.id]);
    assert_eq!(a.sync.link_state().unwrap(), LinkState::Linking { target: b.id });
    assert_eq!(relay.inits_for(b.id), 1);
}

#[tokio::test]
async fn linking_to_self_is_rejected() {
    let relay = InMemoryRelay::new();
    let a = Device::new(&relay, "a");
    let err = a.sync.link(a.id, a.public_key()).await.unwrap_err();
    assert!(matches!(err, SyncError::Protocol(_)));
    assert_eq!(relay.inits_for(a.id), 0);
}

#[tokio::test]
async fn payload_is_sealed_to_the_target() {
    let target = InstallationKeypair::generate();
    let payload = HandshakePayload {
        uuid: InstallationId::new(),
        public_key: InstallationKeypair::generate().public_key(),
    };
    let sealed = payload.seal_for(&target.public_key()).unwrap();
    let opened = ledgerlink_crypto::open_sealed(&target, &sealed).unwrap();
    let decoded: HandshakePayload = serde_json::from_slice(&opened).unwrap();
    assert_eq!(decoded, payload);
    assert!(ledgerlink_crypto::open_sealed(&InstallationKeypair::generate(), &sealed).is_err());
}

// ── Receiving ───────────────────────────────────────────────────

#[tokio::test]
async fn receiver_links_and_pushes_full_history_to_newcomer_only() {
    let relay = InMemoryRelay::new();
    let a = Device::new(&relay, "a");
    let b = Device::new(&relay, "b");
    let fixture = Fixture::new();
    fixture.install(&b.store);
    b.store
        .save_transaction(transfer(fixture.checking.id, fixture.savings.id, 500, 20))
        .unwrap();

    a.sync.link(b.id, b.public_key()).await.unwrap();
    let report = b.sync.process_handshakes().await.unwrap();

    assert_eq!(report.new_devices, vec![a.id]);
    assert_eq!(report.processed, 1);
    assert_eq!(relay.inits_for(b.id), 0);
    assert_eq!(linked_ids(&b), vec![a.id]);
    assert_eq!(relay.pending_for(a.id), 1);
    assert_eq!(relay.push_timeouts(), vec![Some(common::test_config().chunk_push_timeout())]);

    a.sync.pull().await.unwrap();
    assert_eq!(a.store.balance(fixture.checking.id).unwrap(), Balance::from_integer(-500));
    assert_eq!(a.sync.link_state().unwrap(), LinkState::Linked { devices: 1 });
}

#[tokio::test]
async fn repeated_init_from_known_device_is_dropped() {
    let relay = InMemoryRelay::new();
    let a = Device::new(&relay, "a");
    let b = Device::new(&relay, "b");

    a.sync.link(b.id, b.public_key()).await.unwrap();
    b.sync.process_handshakes().await.unwrap();
    a.sync.link(b.id, b.public_key()).await.unwrap();

    let report = b.sync.process_handshakes().await.unwrap();
    assert!(report.new_devices.is_empty());
    assert_eq!(report.processed, 1);
    assert_eq!(relay.pending_for(a.id), 1);
}

#[tokio::test]
async fn unreadable_init_is_discarded() {
    let relay = InMemoryRelay::new();
    let _a = Device::new(&relay, "a");
    let b = Device::new(&relay, "b");
    let stranger = InstallationKeypair::generate();
    let bogus = HandshakePayload {
        uuid: InstallationId::new(),
        public_key: stranger.public_key(),
    }
    .seal_for(&stranger.public_key())
    .unwrap();
    relay.post_init(b.id, &bogus, "token-a").await.unwrap();

    let report = b.sync.process_handshakes().await.unwrap();
    assert!(report.new_devices.is_empty());
    assert_eq!(report.processed, 1);
    assert_eq!(relay.inits_for(b.id), 0);
    assert!(linked_ids(&b).is_empty());
}

// ── Introductions ───────────────────────────────────────────────

#[tokio::test]
async fn handshake_fans_out_to_full_mesh() {
    let relay = InMemoryRelay::new();
    let c = Device::new(&relay, "c");
    let d = Device::new(&relay, "d");
    let e = Device::new(&relay, "e");
    let fixture = Fixture::new();
    fixture.install(&d.store);
    let tx = d
        .store
        .save_transaction(transfer(fixture.checking.id, fixture.savings.id, 75, 20))
        .unwrap();

    // d and e are already linked.
    e.sync.link(d.id, d.public_key()).await.unwrap();
    d.sync.run_cycle().await;
    e.sync.run_cycle().await;
    assert_eq!(e.sync.link_state().unwrap(), LinkState::Linked { devices: 1 });

    // c only ever talks to d.
    c.sync.link(d.id, d.public_key()).await.unwrap();
    let d_report = d.sync.run_cycle().await;
    assert_eq!(d_report.new_devices, vec![c.id]);
    assert_eq!(relay.inits_for(c.id), 1);
    assert_eq!(relay.inits_for(e.id), 1);

    let e_report = e.sync.run_cycle().await;
    assert_eq!(e_report.new_devices, vec![c.id]);
    let c_report = c.sync.run_cycle().await;
    assert_eq!(c_report.new_devices, vec![e.id]);

    // Drain the echoes; already-linked devices end the fan-out.
    for device in [&d, &e, &c] {
        let report = device.sync.run_cycle().await;
        assert!(report.new_devices.is_empty());
    }
    for device in [&c, &d, &e] {
        assert_eq!(relay.inits_for(device.id), 0);
    }

    assert_eq!(linked_ids(&c), sorted(vec![d.id, e.id]));
    assert_eq!(linked_ids(&d), sorted(vec![c.id, e.id]));
    assert_eq!(linked_ids(&e), sorted(vec![c.id, d.id]));

    assert!(c.store.read(|conn| repo::get_transaction(conn, tx.id)).unwrap().is_some());
    assert_eq!(c.store.balance(fixture.savings.id).unwrap(), Balance::from_integer(75));
    assert_eq!(c.sync.link_state().unwrap(), LinkState::Linked { devices: 2 });
}

#[tokio::test]
async fn failed_history_push_keeps_init_for_retry() {
    let relay = InMemoryRelay::new();
    let a = Device::new(&relay, "a");
    let b = Device::new(&relay, "b");
    a.sync.link(b.id, b.public_key()).await.unwrap();

    // Fetching inits succeeds, the history push does not.
    let flaky = FlakyPush {
        inner: relay.clone(),
    };
    let identity = b.sync.identity().clone();
    let config = common::test_config();
    let handshake = ledgerlink_sync::Handshake::new(&identity, &b.store, &flaky, &config);
    let report = handshake.poll_and_process_init().await.unwrap();

    assert!(report.new_devices.is_empty());
    assert_eq!(report.retained, 1);
    assert_eq!(relay.inits_for(b.id), 1);
    assert!(linked_ids(&b).is_empty());

    let retry = b.sync.process_handshakes().await.unwrap();
    assert_eq!(retry.new_devices, vec![a.id]);
}

#[tokio::test]
async fn failed_push_after_key_change_restores_old_key() {
    let relay = InMemoryRelay::new();
    let a = Device::new(&relay, "a");
    let b = Device::new(&relay, "b");
    let old_key = InstallationKeypair::generate().public_key();
    b.store.link_installation(a.id, old_key).unwrap();
    a.sync.link(b.id, b.public_key()).await.unwrap();

    let flaky = FlakyPush {
        inner: relay.clone(),
    };
    let identity = b.sync.identity().clone();
    let config = common::test_config();
    let handshake = ledgerlink_sync::Handshake::new(&identity, &b.store, &flaky, &config);
    let report = handshake.poll_and_process_init().await.unwrap();

    assert_eq!(report.retained, 1);
    assert_eq!(relay.inits_for(b.id), 1);
    let stored = b.store.linked_installation(a.id).unwrap().unwrap();
    assert_eq!(stored.public_key, old_key);

    let retry = b.sync.process_handshakes().await.unwrap();
    assert_eq!(retry.new_devices, vec![a.id]);
    assert_eq!(relay.inits_for(b.id), 0);
    assert!(relay.pending_for(a.id) > 0);
    let stored = b.store.linked_installation(a.id).unwrap().unwrap();
    assert_eq!(stored.public_key, a.public_key());
}

struct FlakyPush {
    inner: InMemoryRelay,
}

#[async_trait::async_trait]
impl RelayTransport for FlakyPush {
    async fn push(
        &self,
        _package: &ledgerlink_sync::EncryptedSyncPackage,
        _token: &str,
        _timeout: Option<std::time::Duration>,
    ) -> ledgerlink_sync::SyncResult<()> {
        Err(SyncError::Network("connection reset".into()))
    }

    async fn pull(
        &self,
        installation_id: InstallationId,
        since: ledgerlink_types::Clock,
        token: &str,
    ) -> ledgerlink_sync::SyncResult<Vec<ledgerlink_sync::PulledPackage>> {
        self.inner.pull(installation_id, since, token).await
    }

    async fn ack(&self, package_ids: &[String], token: &str) -> ledgerlink_sync::SyncResult<()> {
        self.inner.ack(package_ids, token).await
    }

    async fn post_init(
        &self,
        target: InstallationId,
        payload: &[u8],
        token: &str,
    ) -> ledgerlink_sync::SyncResult<()> {
        self.inner.post_init(target, payload, token).await
    }

    async fn get_init(
        &self,
        installation_id: InstallationId,
        token: &str,
    ) -> ledgerlink_sync::SyncResult<Vec<ledgerlink_sync::PendingInit>> {
        self.inner.get_init(installation_id, token).await
    }

    async fn delete_init(&self, init_ids: &[String], token: &str) -> ledgerlink_sync::SyncResult<()> {
        self.inner.delete_init(init_ids, token).await
    }
}
