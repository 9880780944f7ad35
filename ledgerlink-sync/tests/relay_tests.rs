use ledgerlink_crypto::encoding;
use ledgerlink_sync::{
    encrypt_package, HttpRelay, Identity, RelayConfig, RelayTransport, SyncError, SyncPackage,
};
use ledgerlink_types::{Clock, InstallationId};
use std::time::Duration;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn relay(server: &MockServer) -> HttpRelay {
    HttpRelay::new(RelayConfig {
        base_url: server.uri(),
        timeout: Duration::from_secs(5),
    })
    .unwrap()
}

// ── Config ──────────────────────────────────────────────────────

#[test]
fn relay_config_strips_trailing_slash() {
    let sync = ledgerlink_sync::SyncConfig {
        relay_url: "https://relay.example.org/".into(),
        ..Default::default()
    };
    let config = RelayConfig::from(&sync);
    assert_eq!(config.base_url, "https://relay.example.org");
    assert_eq!(config.timeout, sync.request_timeout());
}

// ── Packages ────────────────────────────────────────────────────

#[tokio::test]
async fn push_posts_ciphertext_with_bearer_token() {
    let server = MockServer::start().await;
    let sender = Identity::generate("t-sender");
    let reader = Identity::generate("t-reader");
    let package = SyncPackage::new(sender.installation_id(), Clock::ZERO);
    let encrypted = encrypt_package(&package, &[reader.recipient()]).unwrap();

    Mock::given(method("POST"))
        .and(path("/packages"))
        .and(header("authorization", "Bearer t-sender"))
        .and(body_json(&encrypted))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    relay(&server)
        .push(&encrypted, "t-sender", Some(Duration::from_secs(60)))
        .await
        .unwrap();
}

#[tokio::test]
async fn pull_sends_installation_and_watermark() {
    let server = MockServer::start().await;
    let sender = Identity::generate("a");
    let me = Identity::generate("b");
    let encrypted = encrypt_package(
        &SyncPackage::new(sender.installation_id(), Clock::ZERO),
        &[me.recipient()],
    )
    .unwrap();

    Mock::given(method("GET"))
        .and(path("/packages"))
        .and(query_param("installation_id", me.installation_id().to_string()))
        .and(query_param("since", "1700000000"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "packages": [{
                "package_id": "p-1",
                "received_at": 1_700_000_100,
                "package": encrypted,
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let pulled = relay(&server)
        .pull(me.installation_id(), Clock::new(1_700_000_000), "b")
        .await
        .unwrap();
    assert_eq!(pulled.len(), 1);
    assert_eq!(pulled[0].package_id, "p-1");
    assert_eq!(pulled[0].received_at, Clock::new(1_700_000_100));
    assert_eq!(pulled[0].package, encrypted);
}

#[tokio::test]
async fn ack_lists_package_ids() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/packages/ack"))
        .and(body_json(serde_json::json!({ "package_ids": ["p-1", "p-2"] })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    relay(&server)
        .ack(&["p-1".to_string(), "p-2".to_string()], "tok")
        .await
        .unwrap();
}

#[tokio::test]
async fn empty_ack_makes_no_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(204))
        .expect(0)
        .mount(&server)
        .await;

    relay(&server).ack(&[], "tok").await.unwrap();
}

// ── Handshake payloads ──────────────────────────────────────────

#[tokio::test]
async fn init_payloads_travel_as_base64() {
    let server = MockServer::start().await;
    let target = InstallationId::new();
    let payload = vec![1u8, 2, 3, 250];

    Mock::given(method("POST"))
        .and(path("/init"))
        .and(body_json(serde_json::json!({
            "target_id": target,
            "payload": encoding::encode(&payload),
        })))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/init"))
        .and(query_param("installation_id", target.to_string()))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "inits": [{ "init_id": "i-9", "payload": encoding::encode(&payload) }]
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/init/delete"))
        .and(body_json(serde_json::json!({ "init_ids": ["i-9"] })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let relay = relay(&server);
    relay.post_init(target, &payload, "tok").await.unwrap();
    let inits = relay.get_init(target, "tok").await.unwrap();
    assert_eq!(inits.len(), 1);
    assert_eq!(inits[0].payload, payload);
    relay.delete_init(&["i-9".to_string()], "tok").await.unwrap();
}

// ── Errors ──────────────────────────────────────────────────────

#[tokio::test]
async fn unauthorized_maps_to_auth_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/init"))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad token"))
        .mount(&server)
        .await;

    let err = relay(&server)
        .get_init(InstallationId::new(), "nope")
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Auth(ref body) if body == "bad token"));
    assert!(!err.is_transient());
}

#[tokio::test]
async fn server_error_is_transient_relay_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/packages"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;

    let err = relay(&server)
        .pull(InstallationId::new(), Clock::ZERO, "tok")
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Relay { status: 503, .. }));
    assert!(err.is_transient());
}

#[tokio::test]
async fn slow_relay_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/packages"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({ "packages": [] }))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let relay = HttpRelay::new(RelayConfig {
        base_url: server.uri(),
        timeout: Duration::from_millis(200),
    })
    .unwrap();
    let err = relay
        .pull(InstallationId::new(), Clock::ZERO, "tok")
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Timeout));
}

#[tokio::test]
async fn unreachable_relay_is_network_error() {
    let relay = HttpRelay::new(RelayConfig {
        base_url: "http://127.0.0.1:9".into(),
        timeout: Duration::from_secs(2),
    })
    .unwrap();
    let err = relay
        .pull(InstallationId::new(), Clock::ZERO, "tok")
        .await
        .unwrap_err();
    assert!(err.is_transient());
}
