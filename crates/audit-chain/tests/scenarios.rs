//! End-to-end ledger behavior: recording, sealing, and tamper detection.

use serde_json::json;

use audit_chain::core::{Blake3Hash, Block, Ed25519Signature, Entry, EntryId, EventType};
use audit_chain::store::LedgerStore;
use audit_chain::{ValidationReport, ViolationReason, ViolationScope};
use audit_chain_testkit::LedgerFixture;

/// Record 3 entries, seal them, record a 4th that stays pending.
async fn three_sealed_one_pending() -> (LedgerFixture, Vec<EntryId>) {
    let fixture = LedgerFixture::new().await;
    let mut ids = fixture.record_n(3, "security.login.failed").await;
    fixture.seal().await;
    ids.extend(fixture.record_n(1, "user.logout").await);
    (fixture, ids)
}

fn assert_references(report: &ValidationReport, id: &str) {
    assert!(!report.is_valid);
    assert!(
        report.violations_for(id).next().is_some(),
        "no violation references {}: {:?}",
        id,
        report.violations
    );
}

#[tokio::test]
async fn test_recorded_entries_stay_pending_until_a_cycle() {
    let fixture = LedgerFixture::new().await;
    fixture.record_n(3, "security.login.failed").await;

    let stats = fixture.ledger.stats().await.unwrap();
    assert_eq!(stats.pending_count, 3);
    assert_eq!(stats.current_height, 0);
    assert_eq!(stats.block_count, 1, "genesis only");
    assert_eq!(stats.entry_count, 3);
}

#[tokio::test]
async fn test_cycle_seals_pending_in_recorded_order() {
    let fixture = LedgerFixture::new().await;
    let ids = fixture.record_n(3, "security.login.failed").await;

    let summary = fixture.seal().await;
    assert_eq!(summary.height, 1);
    assert_eq!(summary.entry_count, 3);

    let sealed = fixture.ledger.get_block(&summary.id).await.unwrap().unwrap();
    assert_eq!(sealed.entries.iter().map(|e| e.id).collect::<Vec<_>>(), ids);
    assert!(sealed.entries.iter().all(|e| e.block_height == Some(1)));
    let genesis = fixture.store().blocks_by_height(0, 1).await.unwrap().remove(0);
    assert_eq!(sealed.block.previous_block_hash, genesis.hash);

    let stats = fixture.ledger.stats().await.unwrap();
    assert_eq!(stats.pending_count, 0);
    assert_eq!(stats.current_height, 1);
}

#[tokio::test]
async fn test_single_payload_tamper_yields_exactly_one_violation() {
    let (fixture, ids) = three_sealed_one_pending().await;

    fixture
        .store()
        .tamper_entries(|entries| entries[1].payload = json!({"seq": 7}))
        .unwrap();

    let report = fixture.ledger.run_validation().await.unwrap();
    assert!(!report.is_valid);
    assert_eq!(report.violations.len(), 1, "{:?}", report.violations);

    let violation = &report.violations[0];
    assert_eq!(violation.scope, ViolationScope::Entry);
    assert_eq!(violation.id, ids[1].to_hex());
    assert!(matches!(
        violation.reason,
        ViolationReason::EntryHashMismatch { .. }
    ));
}

#[tokio::test]
async fn test_reordered_entries_break_aggregate_digest() {
    let (fixture, _) = three_sealed_one_pending().await;
    let block = fixture.store().blocks_by_height(1, 1).await.unwrap().remove(0);

    fixture
        .store()
        .tamper_entries(|entries| entries.swap(0, 1))
        .unwrap();

    let report = fixture.ledger.run_validation().await.unwrap();
    assert!(!report.is_valid);
    assert!(report
        .violations_for(&block.id.to_hex())
        .any(|v| matches!(v.reason, ViolationReason::AggregateDigestMismatch { .. })));
}

fn tamper_entry_field(field: &str, entry: &mut Entry) {
    match field {
        "id" => entry.id = EntryId::from_bytes([0xee; 16]),
        "timestamp" => entry.timestamp += 1,
        "event_type" => entry.event_type = EventType::parse("security.login.succeeded").unwrap(),
        "payload" => entry.payload = json!(null),
        "previous_hash" => entry.previous_hash = Blake3Hash::ZERO,
        "hash" => entry.hash = Blake3Hash::from_bytes([0x01; 32]),
        "signer_id" => entry.signer_id = "intruder".into(),
        other => panic!("unknown entry field {}", other),
    }
}

#[tokio::test]
async fn test_every_entry_field_is_tamper_evident() {
    let fields = [
        "id",
        "timestamp",
        "event_type",
        "payload",
        "previous_hash",
        "hash",
        "signer_id",
    ];

    for field in fields {
        let (fixture, _) = three_sealed_one_pending().await;
        let mut tampered_id = None;
        fixture
            .store()
            .tamper_entries(|entries| {
                tamper_entry_field(field, &mut entries[1]);
                tampered_id = Some(entries[1].id);
            })
            .unwrap();

        let report = fixture.ledger.run_validation().await.unwrap();
        assert!(!report.is_valid, "tampered {} went unnoticed", field);
        assert_references(&report, &tampered_id.unwrap().to_hex());
    }
}

#[tokio::test]
async fn test_moving_an_entry_out_of_its_block_is_detected() {
    let (fixture, _) = three_sealed_one_pending().await;
    let block = fixture.store().blocks_by_height(1, 1).await.unwrap().remove(0);

    fixture
        .store()
        .tamper_entries(|entries| entries[2].block_height = None)
        .unwrap();

    let report = fixture.ledger.run_validation().await.unwrap();
    assert!(report
        .violations_for(&block.id.to_hex())
        .any(|v| matches!(v.reason, ViolationReason::EntryCountMismatch { recorded: 3, found: 2 })));
}

fn tamper_block_field(field: &str, block: &mut Block) {
    match field {
        "timestamp" => block.timestamp -= 1,
        "previous_block_hash" => block.previous_block_hash = Blake3Hash::ZERO,
        "aggregate_digest" => block.aggregate_digest = Blake3Hash::ZERO,
        "hash" => block.hash = Blake3Hash::from_bytes([0x02; 32]),
        "signature" => block.signature = Ed25519Signature::ZERO,
        "signer_id" => block.signer_id = "intruder".into(),
        "entry_count" => block.entry_count = 4,
        "height" => block.height = 5,
        other => panic!("unknown block field {}", other),
    }
}

#[tokio::test]
async fn test_every_block_field_is_tamper_evident() {
    let fields = [
        "timestamp",
        "previous_block_hash",
        "aggregate_digest",
        "hash",
        "signature",
        "signer_id",
        "entry_count",
        "height",
    ];

    for field in fields {
        let (fixture, _) = three_sealed_one_pending().await;
        let mut tampered_id = None;
        fixture
            .store()
            .tamper_blocks(|blocks| {
                if let Some(block) = blocks.get_mut(&1) {
                    tamper_block_field(field, block);
                    tampered_id = Some(block.id);
                }
            })
            .unwrap();

        let report = fixture.ledger.run_validation().await.unwrap();
        assert!(!report.is_valid, "tampered {} went unnoticed", field);
        assert_references(&report, &tampered_id.unwrap().to_hex());
    }
}

#[tokio::test]
async fn test_deleted_block_leaves_height_gap() {
    let fixture = LedgerFixture::new().await;
    for _ in 0..3 {
        fixture.record_n(2, "system.tick").await;
        fixture.seal().await;
    }

    fixture
        .store()
        .tamper_blocks(|blocks| {
            blocks.remove(&2);
        })
        .unwrap();

    let report = fixture.ledger.run_validation().await.unwrap();
    assert!(report
        .violations
        .iter()
        .any(|v| v.reason == ViolationReason::HeightGap { expected: 2, found: 3 }));
}

#[tokio::test]
async fn test_untouched_ledger_validates_idempotently() {
    let fixture = LedgerFixture::new().await;
    for round in 0..4 {
        fixture.record_n(round + 1, "mint.transaction.created").await;
        fixture.seal().await;
    }
    fixture.record_n(2, "user.login").await;

    let first = fixture.ledger.run_validation().await.unwrap();
    let second = fixture.ledger.run_validation().await.unwrap();

    assert!(first.is_valid, "{:?}", first.violations);
    assert_eq!(first, second);
    assert_eq!(first.blocks_checked, 5);
    assert_eq!(first.entries_checked, 1 + 2 + 3 + 4 + 2);
}

#[tokio::test]
async fn test_entry_chain_is_continuous_across_blocks() {
    let fixture = LedgerFixture::new().await;
    fixture.record_n(2, "user.login").await;
    let first = fixture.seal().await;
    fixture.record_n(2, "user.login").await;
    let second = fixture.seal().await;

    let a = fixture.ledger.get_block(&first.id).await.unwrap().unwrap();
    let b = fixture.ledger.get_block(&second.id).await.unwrap().unwrap();
    assert_eq!(b.entries[0].previous_hash, a.entries[1].hash);
    assert_eq!(b.block.previous_block_hash, a.block.hash);
}

#[tokio::test]
async fn test_entries_by_event_type_newest_first() {
    let fixture = LedgerFixture::new().await;
    let logins = fixture.record_n(3, "user.login").await;
    fixture.record_n(2, "user.logout").await;

    let found = fixture
        .ledger
        .entries_by_event_type(&EventType::parse("user.login").unwrap(), 2)
        .await
        .unwrap();
    assert_eq!(
        found.iter().map(|e| e.id).collect::<Vec<_>>(),
        vec![logins[2], logins[1]]
    );
}
