use ledgerlink_types::{Clock, Deletion, EntityId, EntityKind};

// ── Construction ─────────────────────────────────────────────────

#[test]
fn now_is_after_epoch() {
    assert!(Clock::now() > Clock::ZERO);
}

#[test]
fn new_from_seconds() {
    assert_eq!(Clock::new(42).as_secs(), 42);
    assert_eq!(Clock::from(7), Clock::new(7));
}

// ── next_after ───────────────────────────────────────────────────

#[test]
fn next_after_old_clock_is_now() {
    let old = Clock::new(100);
    let next = old.next_after();
    assert!(next > old);
    assert!(next.as_secs() >= Clock::now().as_secs() - 1);
}

#[test]
fn next_after_future_clock_increments() {
    let future = Clock::new(Clock::now().as_secs() + 3_600);
    assert_eq!(future.next_after(), Clock::new(future.as_secs() + 1));
}

// ── supersedes ───────────────────────────────────────────────────

#[test]
fn supersedes_is_strict() {
    assert!(Clock::new(200).supersedes(&Clock::new(100)));
    assert!(!Clock::new(100).supersedes(&Clock::new(100)));
    assert!(!Clock::new(50).supersedes(&Clock::new(100)));
}

#[test]
fn clock_serializes_as_plain_number() {
    let json = serde_json::to_string(&Clock::new(1_700_000_000)).unwrap();
    assert_eq!(json, "1700000000");
}

// ── Tombstones ───────────────────────────────────────────────────

#[test]
fn tombstone_overrides_only_older_entities() {
    let d = Deletion::new(EntityKind::Tag, EntityId::new(), Clock::new(150));
    assert!(d.overrides(Clock::new(149)));
    assert!(!d.overrides(Clock::new(150)));
    assert!(!d.overrides(Clock::new(200)));
}

#[test]
fn entity_kind_string_roundtrip() {
    for kind in EntityKind::IMPORT_ORDER {
        assert_eq!(kind.as_str().parse::<EntityKind>().unwrap(), kind);
    }
    assert!("ledger".parse::<EntityKind>().is_err());
}

#[test]
fn deletion_wire_format_uses_snake_case_kind() {
    let d = Deletion::new(EntityKind::Counterparty, EntityId::new(), Clock::new(5));
    let json = serde_json::to_value(d).unwrap();
    assert_eq!(json["kind"], "counterparty");
    assert_eq!(json["deleted_at"], 5);
}
