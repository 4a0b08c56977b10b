//! Ledger over a SQLite file: tampering through raw SQL, and restarts.

use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, ToSql};
use serde_json::json;
use tempfile::TempDir;

use audit_chain::core::{Keypair, Signer, ENTRY_CHAIN_ORIGIN};
use audit_chain::store::{LedgerStore, SqliteStore};
use audit_chain::{EntryId, Ledger, LedgerConfig, LedgerError, ViolationReason, ViolationScope};
use audit_chain_testkit::{test_signer, FaultyStore};

fn db_path(dir: &TempDir) -> PathBuf {
    dir.path().join("ledger.db")
}

async fn open_ledger(path: &Path) -> Ledger<SqliteStore> {
    open_ledger_with(path, test_signer(), LedgerConfig::default()).await
}

async fn open_ledger_with(path: &Path, signer: Signer, config: LedgerConfig) -> Ledger<SqliteStore> {
    let store = SqliteStore::open(path).unwrap();
    Ledger::open(store, signer, config).await.unwrap()
}

async fn record_n<S: LedgerStore>(ledger: &Ledger<S>, n: usize) -> Vec<EntryId> {
    let mut ids = Vec::new();
    for i in 0..n {
        ids.push(
            ledger
                .record_str("security.login.failed", json!({ "seq": i }))
                .await
                .unwrap(),
        );
    }
    ids
}

fn seq_of(conn: &Connection, id: &EntryId) -> i64 {
    conn.query_row(
        "SELECT seq FROM ledger_entries WHERE entry_id = ?1",
        params![id.0.as_slice()],
        |row| row.get(0),
    )
    .unwrap()
}

#[tokio::test]
async fn test_raw_payload_edit_yields_exactly_one_violation() {
    let dir = TempDir::new().unwrap();
    let ledger = open_ledger(&db_path(&dir)).await;
    let ids = record_n(&ledger, 3).await;
    ledger.try_build_block().await.unwrap();
    record_n(&ledger, 1).await;

    let conn = Connection::open(db_path(&dir)).unwrap();
    let payload: String = conn
        .query_row(
            "SELECT payload FROM ledger_entries WHERE entry_id = ?1",
            params![ids[1].0.as_slice()],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(payload, r#"{"seq":1}"#);
    conn.execute(
        "UPDATE ledger_entries SET payload = ?1 WHERE entry_id = ?2",
        params![r#"{"seq":9}"#, ids[1].0.as_slice()],
    )
    .unwrap();

    let report = ledger.run_validation().await.unwrap();
    assert_eq!(report.violations.len(), 1, "{:?}", report.violations);
    assert_eq!(report.violations[0].id, ids[1].to_hex());
    assert!(matches!(
        report.violations[0].reason,
        ViolationReason::EntryHashMismatch { .. }
    ));
}

fn overwrite_entry_column(path: &Path, id: &EntryId, column: &str, value: &dyn ToSql) {
    let conn = Connection::open(path).unwrap();
    let changed = conn
        .execute(
            &format!("UPDATE ledger_entries SET {} = ?1 WHERE entry_id = ?2", column),
            params![value, id.0.as_slice()],
        )
        .unwrap();
    assert_eq!(changed, 1);
}

/// Three sealed entries plus one pending; returns the sealed ids.
async fn sealed_three_pending_one(path: &Path) -> (Ledger<SqliteStore>, Vec<EntryId>) {
    let ledger = open_ledger(path).await;
    let ids = record_n(&ledger, 3).await;
    ledger.try_build_block().await.unwrap();
    record_n(&ledger, 1).await;
    (ledger, ids)
}

fn assert_single_undecodable(report: &audit_chain::ValidationReport, id: &str, scope: ViolationScope) {
    assert!(!report.is_valid);
    assert_eq!(report.violations.len(), 1, "{:?}", report.violations);
    assert_eq!(report.violations[0].id, id);
    assert_eq!(report.violations[0].scope, scope);
    assert!(matches!(
        report.violations[0].reason,
        ViolationReason::Undecodable { .. }
    ));
}

#[tokio::test]
async fn test_raw_payload_byte_flip_breaking_json_is_a_violation() {
    let dir = TempDir::new().unwrap();
    let path = db_path(&dir);
    let (ledger, ids) = sealed_three_pending_one(&path).await;

    overwrite_entry_column(&path, &ids[1], "payload", &r#"{"seq":1|"#);

    let report = ledger.run_validation().await.unwrap();
    assert_single_undecodable(&report, &ids[1].to_hex(), ViolationScope::Entry);
    assert_eq!(report.blocks_checked, 2);
    assert_eq!(report.entries_checked, 4);
}

#[tokio::test]
async fn test_raw_event_type_edit_is_a_violation() {
    let dir = TempDir::new().unwrap();
    let path = db_path(&dir);
    let (ledger, ids) = sealed_three_pending_one(&path).await;

    overwrite_entry_column(&path, &ids[1], "event_type", &"user x");

    let report = ledger.run_validation().await.unwrap();
    assert_single_undecodable(&report, &ids[1].to_hex(), ViolationScope::Entry);
}

#[tokio::test]
async fn test_raw_shortened_hash_is_a_violation() {
    let dir = TempDir::new().unwrap();
    let path = db_path(&dir);
    let (ledger, ids) = sealed_three_pending_one(&path).await;

    overwrite_entry_column(&path, &ids[2], "hash", &vec![0x01u8, 0x02]);

    let report = ledger.run_validation().await.unwrap();
    assert_single_undecodable(&report, &ids[2].to_hex(), ViolationScope::Entry);
}

#[tokio::test]
async fn test_raw_corrupt_pending_entry_is_a_violation() {
    let dir = TempDir::new().unwrap();
    let path = db_path(&dir);
    let ledger = open_ledger(&path).await;
    let ids = record_n(&ledger, 3).await;

    overwrite_entry_column(&path, &ids[0], "payload", &"not json");

    let report = ledger.run_validation().await.unwrap();
    assert_single_undecodable(&report, &ids[0].to_hex(), ViolationScope::Entry);
    assert_eq!(report.entries_checked, 3);
}

#[tokio::test]
async fn test_raw_truncated_block_signature_is_a_violation() {
    let dir = TempDir::new().unwrap();
    let path = db_path(&dir);
    let (ledger, _) = sealed_three_pending_one(&path).await;
    record_n(&ledger, 1).await;
    ledger.try_build_block().await.unwrap();
    let block = ledger.store().blocks_by_height(1, 1).await.unwrap().remove(0);

    let conn = Connection::open(&path).unwrap();
    conn.execute(
        "UPDATE ledger_blocks SET signature = x'0102' WHERE height = 1",
        [],
    )
    .unwrap();

    let report = ledger.run_validation().await.unwrap();
    assert_single_undecodable(&report, &block.id.to_hex(), ViolationScope::Block);
    assert_eq!(report.blocks_checked, 3);
    assert_eq!(report.entries_checked, 5);
}

#[tokio::test]
async fn test_raw_reorder_breaks_aggregate_digest() {
    let dir = TempDir::new().unwrap();
    let ledger = open_ledger(&db_path(&dir)).await;
    let ids = record_n(&ledger, 3).await;
    let block = ledger.try_build_block().await.unwrap().unwrap();

    let mut conn = Connection::open(db_path(&dir)).unwrap();
    let a = seq_of(&conn, &ids[0]);
    let b = seq_of(&conn, &ids[1]);
    let tx = conn.transaction().unwrap();
    tx.execute("UPDATE ledger_entries SET seq = -1 WHERE seq = ?1", params![a])
        .unwrap();
    tx.execute("UPDATE ledger_entries SET seq = ?1 WHERE seq = ?2", params![a, b])
        .unwrap();
    tx.execute("UPDATE ledger_entries SET seq = ?1 WHERE seq = -1", params![b])
        .unwrap();
    tx.commit().unwrap();

    let sealed = ledger.get_block(&block.id).await.unwrap().unwrap();
    assert_eq!(sealed.entries[0].id, ids[1]);

    let report = ledger.run_validation().await.unwrap();
    assert!(report
        .violations_for(&block.id.to_hex())
        .any(|v| matches!(v.reason, ViolationReason::AggregateDigestMismatch { .. })));
}

#[tokio::test]
async fn test_raw_signature_edit_is_detected() {
    let dir = TempDir::new().unwrap();
    let ledger = open_ledger(&db_path(&dir)).await;
    record_n(&ledger, 2).await;
    let block = ledger.try_build_block().await.unwrap().unwrap();

    let conn = Connection::open(db_path(&dir)).unwrap();
    conn.execute(
        "UPDATE ledger_blocks SET signature = ?1 WHERE height = 1",
        params![vec![0u8; 64]],
    )
    .unwrap();

    let report = ledger.run_validation().await.unwrap();
    assert_eq!(report.violations.len(), 1, "{:?}", report.violations);
    assert_eq!(report.violations[0].id, block.id.to_hex());
    assert_eq!(report.violations[0].reason, ViolationReason::InvalidSignature);
}

#[tokio::test]
async fn test_reopen_restores_head_and_pending() {
    let dir = TempDir::new().unwrap();
    let path = db_path(&dir);

    let (head, last_id) = {
        let ledger = open_ledger(&path).await;
        record_n(&ledger, 3).await;
        ledger.try_build_block().await.unwrap();
        let pending = record_n(&ledger, 2).await;
        (ledger.head(), pending[1])
    };
    let last_hash = SqliteStore::open(&path)
        .unwrap()
        .get_entry(&last_id)
        .await
        .unwrap()
        .unwrap()
        .hash;

    let ledger = open_ledger(&path).await;
    assert_eq!(ledger.head(), head);
    assert_eq!(ledger.pending_count().await, 2);

    let next = ledger.record_str("user.login", json!({})).await.unwrap();
    let next = ledger.get_entry(&next).await.unwrap().unwrap();
    assert_eq!(next.previous_hash, last_hash);

    let summary = ledger.try_build_block().await.unwrap().unwrap();
    assert_eq!(summary.height, 2);
    assert_eq!(summary.entry_count, 3);

    let report = ledger.run_validation().await.unwrap();
    assert!(report.is_valid, "{:?}", report.violations);
    assert_eq!(report.blocks_checked, 3);
    assert_eq!(report.entries_checked, 6);
}

#[tokio::test]
async fn test_reopen_empty_chain_starts_at_origin() {
    let dir = TempDir::new().unwrap();
    let path = db_path(&dir);
    let genesis = open_ledger(&path).await.head();

    let ledger = open_ledger(&path).await;
    assert_eq!(ledger.head(), genesis);
    assert_eq!(ledger.store().block_count().await.unwrap(), 1);

    let id = ledger.record_str("system.start", json!({})).await.unwrap();
    let entry = ledger.get_entry(&id).await.unwrap().unwrap();
    assert_eq!(entry.previous_hash, ENTRY_CHAIN_ORIGIN);
}

#[tokio::test]
async fn test_interrupted_cycle_is_resumed_on_reopen() {
    let dir = TempDir::new().unwrap();
    let path = db_path(&dir);

    let ids = {
        let store = FaultyStore::new(SqliteStore::open(&path).unwrap());
        let ledger = Ledger::open(store, test_signer(), LedgerConfig::default())
            .await
            .unwrap();
        let ids = record_n(&ledger, 2).await;

        // Entries get stamped with height 1, then the block insert fails.
        ledger.store().fail_block_inserts(1);
        assert!(ledger.try_build_block().await.is_err());
        ids
    };

    let ledger = open_ledger(&path).await;
    assert_eq!(ledger.head().height, 0);
    assert_eq!(ledger.pending_count().await, 2);

    let report = ledger.run_validation().await.unwrap();
    assert!(report.is_valid, "{:?}", report.violations);

    let later = record_n(&ledger, 1).await;
    let summary = ledger.try_build_block().await.unwrap().unwrap();
    assert_eq!(summary.height, 1);

    let sealed = ledger.get_block(&summary.id).await.unwrap().unwrap();
    assert_eq!(sealed.entries.iter().map(|e| e.id).collect::<Vec<_>>(), ids);

    let summary = ledger.try_build_block().await.unwrap().unwrap();
    assert_eq!(summary.height, 2);
    let sealed = ledger.get_block(&summary.id).await.unwrap().unwrap();
    assert_eq!(sealed.entries.iter().map(|e| e.id).collect::<Vec<_>>(), later);

    let report = ledger.run_validation().await.unwrap();
    assert!(report.is_valid, "{:?}", report.violations);
}

#[tokio::test]
async fn test_rotated_key_accepts_retired_signatures() {
    let dir = TempDir::new().unwrap();
    let path = db_path(&dir);

    {
        let ledger = open_ledger(&path).await;
        record_n(&ledger, 2).await;
        ledger.try_build_block().await.unwrap();
    }

    let rotated = Signer::from_keypair(Keypair::from_seed(&[0x07; 32]), "primary-validator");

    let without_retired = open_ledger_with(&path, rotated.clone(), LedgerConfig::default()).await;
    let report = without_retired.run_validation().await.unwrap();
    assert_eq!(
        report
            .violations
            .iter()
            .filter(|v| v.reason == ViolationReason::InvalidSignature)
            .count(),
        2,
        "genesis and block 1 were signed by the old key"
    );
    drop(without_retired);

    let config = LedgerConfig::default().with_retired_key(test_signer().public_key());
    let ledger = open_ledger_with(&path, rotated, config).await;
    record_n(&ledger, 1).await;
    ledger.try_build_block().await.unwrap();

    let report = ledger.run_validation().await.unwrap();
    assert!(report.is_valid, "{:?}", report.violations);
    assert_eq!(report.blocks_checked, 3);
}

#[tokio::test]
async fn test_signer_id_change_with_unsealed_entries_is_refused() {
    let dir = TempDir::new().unwrap();
    let path = db_path(&dir);
    {
        let ledger = open_ledger(&path).await;
        record_n(&ledger, 2).await;
    }

    let renamed = Signer::from_keypair(Keypair::from_seed(&[0x42; 32]), "backup-validator");
    let store = SqliteStore::open(&path).unwrap();
    match Ledger::open(store, renamed.clone(), LedgerConfig::default()).await {
        Err(LedgerError::SignerChanged { recorded, current }) => {
            assert_eq!(recorded, "primary-validator");
            assert_eq!(current, "backup-validator");
        }
        Err(other) => panic!("expected signer change, got {:?}", other),
        Ok(_) => panic!("expected signer change to be refused"),
    }

    // Sealed under the old id first, the rename is harmless.
    {
        let ledger = open_ledger(&path).await;
        ledger.try_build_block().await.unwrap().unwrap();
    }
    let ledger = open_ledger_with(&path, renamed, LedgerConfig::default()).await;
    record_n(&ledger, 1).await;
    ledger.try_build_block().await.unwrap().unwrap();
    let report = ledger.run_validation().await.unwrap();
    assert!(report.is_valid, "{:?}", report.violations);
}
