use ledgerlink_crypto::{
    open_envelope, open_sealed, seal_for_recipients, seal_to, CryptoError, Envelope,
    InstallationKeypair, PublicKey, Recipient,
};
use ledgerlink_types::InstallationId;

fn device() -> (InstallationId, InstallationKeypair) {
    (InstallationId::new(), InstallationKeypair::generate())
}

fn recipient(id: InstallationId, kp: &InstallationKeypair) -> Recipient {
    Recipient {
        installation_id: id,
        public_key: kp.public_key(),
    }
}

// ── Envelopes ───────────────────────────────────────────────────

#[test]
fn every_recipient_can_open() {
    let devices: Vec<_> = (0..3).map(|_| device()).collect();
    let recipients: Vec<_> = devices.iter().map(|(id, kp)| recipient(*id, kp)).collect();

    let envelope = seal_for_recipients(b"delta", &recipients).unwrap();
    assert_eq!(envelope.recipient_keys.len(), 3);

    for (id, kp) in &devices {
        assert_eq!(open_envelope(&envelope, *id, kp).unwrap(), b"delta");
    }
}

#[test]
fn outsider_gets_no_key_error() {
    let (a, kp_a) = device();
    let (outsider, kp_out) = device();
    let envelope = seal_for_recipients(b"delta", &[recipient(a, &kp_a)]).unwrap();

    match open_envelope(&envelope, outsider, &kp_out) {
        Err(CryptoError::NoRecipientKey(id)) => assert_eq!(id, outsider),
        other => panic!("expected NoRecipientKey, got {other:?}"),
    }
}

#[test]
fn impersonating_recipient_id_fails_authentication() {
    let (a, kp_a) = device();
    let (_, kp_thief) = device();
    let envelope = seal_for_recipients(b"delta", &[recipient(a, &kp_a)]).unwrap();

    match open_envelope(&envelope, a, &kp_thief) {
        Err(CryptoError::Decryption(_)) => {}
        other => panic!("expected Decryption error, got {other:?}"),
    }
}

#[test]
fn tampered_payload_is_rejected() {
    let (a, kp_a) = device();
    let mut envelope = seal_for_recipients(b"delta", &[recipient(a, &kp_a)]).unwrap();
    let last = envelope.ciphertext.len() - 1;
    envelope.ciphertext[last] ^= 0x01;
    assert!(matches!(
        open_envelope(&envelope, a, &kp_a),
        Err(CryptoError::Decryption(_))
    ));
}

#[test]
fn empty_recipient_list_is_rejected() {
    assert!(seal_for_recipients(b"delta", &[]).is_err());
}

#[test]
fn envelope_json_uses_base64_fields() {
    let (a, kp_a) = device();
    let envelope = seal_for_recipients(b"delta", &[recipient(a, &kp_a)]).unwrap();
    let json = serde_json::to_value(&envelope).unwrap();
    assert!(json["iv"].is_string());
    assert!(json["ciphertext"].is_string());
    assert_eq!(json["recipient_keys"][0]["installation_id"], a.to_string());

    let back: Envelope = serde_json::from_value(json).unwrap();
    assert_eq!(back, envelope);
    assert_eq!(open_envelope(&back, a, &kp_a).unwrap(), b"delta");
}

// ── Sealed boxes ────────────────────────────────────────────────

#[test]
fn sealed_box_roundtrip() {
    let kp = InstallationKeypair::generate();
    let sealed = seal_to(&kp.public_key(), b"hello").unwrap();
    assert_eq!(open_sealed(&kp, &sealed).unwrap(), b"hello");
}

#[test]
fn sealed_box_rejects_other_key() {
    let kp = InstallationKeypair::generate();
    let sealed = seal_to(&kp.public_key(), b"hello").unwrap();
    assert!(open_sealed(&InstallationKeypair::generate(), &sealed).is_err());
}

// ── Keys ────────────────────────────────────────────────────────

#[test]
fn keypair_restores_from_secret() {
    let kp = InstallationKeypair::generate();
    let restored = InstallationKeypair::from_secret_base64(&kp.secret_base64()).unwrap();
    assert_eq!(restored.public_key(), kp.public_key());
}

#[test]
fn public_key_base64_roundtrip() {
    let pk = InstallationKeypair::generate().public_key();
    let parsed: PublicKey = pk.to_base64().parse().unwrap();
    assert_eq!(parsed, pk);
    assert!(PublicKey::from_base64("c2hvcnQ=").is_err());
}

#[test]
fn keypair_debug_redacts_secret() {
    let kp = InstallationKeypair::generate();
    let dbg = format!("{kp:?}");
    assert!(dbg.contains("[REDACTED]"));
    assert!(!dbg.contains(&kp.secret_base64()));
}
