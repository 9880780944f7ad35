mod common;

use common::{transfer, with_fixed_clocks, Fixture};
use ledgerlink_crypto::Recipient;
use ledgerlink_store::LedgerStore;
use ledgerlink_sync::{
    decrypt_package, encrypt_package, Identity, PackageExporter, PackageImporter, SyncError,
    SyncPackage,
};
use ledgerlink_types::{
    system_tags, Balance, Clock, EntityId, EntityKind, InstallationId, Tag, Transaction,
};
use pretty_assertions::assert_eq;

fn recipients(identities: &[&Identity]) -> Vec<Recipient> {
    identities.iter().map(|i| i.recipient()).collect()
}

fn sample_package(sender: InstallationId) -> SyncPackage {
    let fixture = Fixture::new();
    let mut package = SyncPackage::new(sender, Clock::ZERO);
    package.wallets.push(fixture.wallet.clone());
    package.currencies.push(fixture.currency.clone());
    package.accounts = vec![fixture.checking.clone(), fixture.savings.clone()];
    package
        .transactions
        .push(transfer(fixture.checking.id, fixture.savings.id, 500, 20));
    package
}

// ── Encryption ──────────────────────────────────────────────────

#[test]
fn every_recipient_decrypts_the_same_package() {
    let sender = Identity::generate("a");
    let b = Identity::generate("b");
    let c = Identity::generate("c");
    let package = sample_package(sender.installation_id());

    let encrypted = encrypt_package(&package, &recipients(&[&b, &c])).unwrap();
    assert_eq!(encrypted.sender_id, sender.installation_id());

    for reader in [&b, &c] {
        let opened = decrypt_package(&encrypted, reader.installation_id(), reader.keypair()).unwrap();
        assert_eq!(opened, package);
    }
}

#[test]
fn non_recipient_gets_no_key_error() {
    let sender = Identity::generate("a");
    let b = Identity::generate("b");
    let outsider = Identity::generate("x");
    let encrypted =
        encrypt_package(&sample_package(sender.installation_id()), &recipients(&[&b])).unwrap();

    let err = decrypt_package(&encrypted, outsider.installation_id(), outsider.keypair()).unwrap_err();
    assert!(matches!(err, SyncError::NoKeyForInstallation(id) if id == outsider.installation_id()));
}

#[test]
fn empty_recipient_list_is_rejected() {
    let sender = Identity::generate("a");
    let err = encrypt_package(&sample_package(sender.installation_id()), &[]).unwrap_err();
    assert!(matches!(err, SyncError::NoRecipients));
}

#[test]
fn mismatched_outer_sender_is_a_protocol_error() {
    let sender = Identity::generate("a");
    let b = Identity::generate("b");
    let mut encrypted =
        encrypt_package(&sample_package(sender.installation_id()), &recipients(&[&b])).unwrap();
    encrypted.sender_id = InstallationId::new();

    let err = decrypt_package(&encrypted, b.installation_id(), b.keypair()).unwrap_err();
    assert!(matches!(err, SyncError::Protocol(_)));
}

#[test]
fn encrypted_package_hides_plaintext() {
    let sender = Identity::generate("a");
    let b = Identity::generate("b");
    let mut package = sample_package(sender.installation_id());
    package.transactions[0].note = Some("salary from ACME".into());

    let encrypted = encrypt_package(&package, &recipients(&[&b])).unwrap();
    let wire = serde_json::to_string(&encrypted).unwrap();
    assert!(!wire.contains("ACME"));
    assert!(wire.contains(&sender.installation_id().to_string()));
}

// ── Delta export ────────────────────────────────────────────────

#[test]
fn export_since_returns_only_newer_records() {
    let store = LedgerStore::open_in_memory().unwrap();
    let fixture = Fixture::new();
    fixture.install(&store);
    let (old, new) = with_fixed_clocks(&store, |s| {
        let old = s
            .save_transaction(transfer(fixture.checking.id, fixture.savings.id, 10, 50))
            .unwrap();
        let new = s
            .save_transaction(transfer(fixture.checking.id, fixture.savings.id, 20, 150))
            .unwrap();
        (old, new)
    });

    let exporter = PackageExporter::new(store, InstallationId::new());
    let package = exporter.export_since(Clock::new(100)).unwrap();
    let ids: Vec<EntityId> = package.transactions.iter().map(|t| t.id).collect();
    assert_eq!(ids, vec![new.id]);
    assert!(!ids.contains(&old.id));
    assert!(package.wallets.is_empty());
    assert_eq!(package.since, Clock::new(100));
}

#[test]
fn export_includes_deletions_but_never_system_tags() {
    let store = LedgerStore::open_in_memory().unwrap();
    let food = store
        .save_tag(Tag {
            id: EntityId::new(),
            name: "Food".into(),
            clock: Clock::ZERO,
            parent_ids: vec![],
            child_ids: vec![],
            icon_id: None,
        })
        .unwrap();
    store.delete_entity(EntityKind::Tag, food.id).unwrap();

    let package = PackageExporter::new(store, InstallationId::new())
        .export_since(Clock::ZERO)
        .unwrap();
    assert!(package.tags.iter().all(|t| !system_tags::is_system_tag(&t.id)));
    assert!(package.tags.iter().all(|t| t.id != food.id));
    assert_eq!(package.deletions.len(), 1);
    assert_eq!(package.deletions[0].entity_id, food.id);
}

#[test]
fn empty_ledger_exports_empty_delta() {
    let store = LedgerStore::open_in_memory().unwrap();
    let package = PackageExporter::new(store, InstallationId::new())
        .export_since(Clock::ZERO)
        .unwrap();
    assert!(package.is_empty());
}

// ── Full history ────────────────────────────────────────────────

fn ledger_with_transactions(count: usize) -> (LedgerStore, Fixture, Vec<Transaction>) {
    let store = LedgerStore::open_in_memory().unwrap();
    let fixture = Fixture::new();
    fixture.install(&store);
    let txs: Vec<Transaction> = with_fixed_clocks(&store, |s| {
        (0..count)
            .map(|i| {
                s.save_transaction(transfer(
                    fixture.checking.id,
                    fixture.savings.id,
                    (i % 7 + 1) as u64,
                    100 + i as i64,
                ))
                .unwrap()
            })
            .collect()
    });
    (store, fixture, txs)
}

fn ledger_snapshot(store: &LedgerStore, reader: InstallationId) -> SyncPackage {
    let mut snapshot = PackageExporter::new(store.clone(), reader)
        .export_since(Clock::ZERO)
        .unwrap();
    snapshot.created_at = Clock::ZERO;
    snapshot.transactions.sort_by_key(|t| t.id);
    snapshot
}

#[test]
fn full_history_splits_transactions_into_batches() {
    let (store, _, _) = ledger_with_transactions(250);
    let chunks = PackageExporter::new(store, InstallationId::new())
        .export_full_history_chunked(100)
        .unwrap();

    let sizes: Vec<usize> = chunks.iter().map(|c| c.transactions.len()).collect();
    assert_eq!(sizes, vec![100, 100, 50]);
    for chunk in &chunks {
        assert_eq!(chunk.accounts.len(), 2);
        assert_eq!(chunk.wallets.len(), 1);
        assert_eq!(chunk.currencies.len(), 1);
    }
}

#[test]
fn empty_ledger_yields_one_chunk() {
    let store = LedgerStore::open_in_memory().unwrap();
    let chunks = PackageExporter::new(store, InstallationId::new())
        .export_full_history_chunked(100)
        .unwrap();
    assert_eq!(chunks.len(), 1);
    assert!(chunks[0].transactions.is_empty());
}

#[test]
fn chunks_import_in_any_order_to_the_same_ledger() {
    let (source, fixture, _) = ledger_with_transactions(250);
    let sender = InstallationId::new();
    let exporter = PackageExporter::new(source.clone(), sender);
    let chunks = exporter.export_full_history_chunked(100).unwrap();

    let whole = LedgerStore::open_in_memory().unwrap();
    let single = exporter.export_since(Clock::ZERO).unwrap();
    PackageImporter::new(whole.clone()).import(&single).unwrap();

    let reversed = LedgerStore::open_in_memory().unwrap();
    let importer = PackageImporter::new(reversed.clone());
    for chunk in chunks.iter().rev() {
        importer.import(chunk).unwrap();
    }

    let reader = InstallationId::new();
    assert_eq!(ledger_snapshot(&reversed, reader), ledger_snapshot(&whole, reader));
    for account in [fixture.checking.id, fixture.savings.id] {
        assert_eq!(reversed.balance(account).unwrap(), source.balance(account).unwrap());
        assert_eq!(whole.balance(account).unwrap(), source.balance(account).unwrap());
    }
    assert_ne!(source.balance(fixture.checking.id).unwrap(), Balance::ZERO);
    assert!(reversed.verify_balances().unwrap().is_empty());
}
