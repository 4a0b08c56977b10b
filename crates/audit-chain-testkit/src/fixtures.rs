//! Test fixtures and helpers.
//!
//! Common setup code for integration tests.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use audit_chain::{BlockSummary, Ledger, LedgerConfig};
use audit_chain_core::{Block, BlockId, Entry, EntryId, EventType, Keypair, Scanned, Signer};
use audit_chain_store::{InsertResult, LedgerStore, MemoryStore, Result, StoreError};

/// Seed of the deterministic test signing key.
pub const TEST_SEED: [u8; 32] = [0x42; 32];

/// Signer with a fixed key, id `primary-validator`.
pub fn test_signer() -> Signer {
    Signer::from_keypair(Keypair::from_seed(&TEST_SEED), "primary-validator")
}

/// A ledger over an in-memory store.
pub struct LedgerFixture {
    pub ledger: Arc<Ledger<MemoryStore>>,
}

impl LedgerFixture {
    /// Fresh ledger with the default configuration.
    pub async fn new() -> Self {
        Self::with_config(LedgerConfig::default()).await
    }

    pub async fn with_config(config: LedgerConfig) -> Self {
        let ledger = Ledger::open(MemoryStore::new(), test_signer(), config)
            .await
            .expect("open ledger on empty memory store");
        Self {
            ledger: Arc::new(ledger),
        }
    }

    /// The underlying store, for inspection and tampering.
    pub fn store(&self) -> &MemoryStore {
        self.ledger.store()
    }

    /// Record `n` entries of one type with payloads `{"seq": i}`.
    pub async fn record_n(&self, n: usize, event_type: &str) -> Vec<EntryId> {
        let mut ids = Vec::with_capacity(n);
        for i in 0..n {
            let id = self
                .ledger
                .record_str(event_type, json!({ "seq": i }))
                .await
                .expect("record entry");
            ids.push(id);
        }
        ids
    }

    /// Run a block cycle that must produce a block.
    pub async fn seal(&self) -> BlockSummary {
        self.ledger
            .try_build_block()
            .await
            .expect("block cycle")
            .expect("pending entries to seal")
    }
}

/// Store wrapper that injects failures into write operations.
///
/// Each `fail_*` call arms a number of consecutive failures for one
/// operation. Reads pass through, except entry lookups armed with
/// [`fail_entry_reads`](Self::fail_entry_reads).
pub struct FaultyStore<S> {
    inner: S,
    entry_insert_failures: AtomicU32,
    height_update_failures: AtomicU32,
    block_insert_failures: AtomicU32,
    entry_read_failures: AtomicU32,
    height_conflict: AtomicBool,
    block_insert_stall: Mutex<Option<Duration>>,
    entry_insert_stall: Mutex<Option<Duration>>,
    entry_ack_stall: Mutex<Option<Duration>>,
}

fn take_failure(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

fn injected(operation: &str) -> StoreError {
    StoreError::Unavailable(format!("injected {} failure", operation))
}

impl<S: LedgerStore> FaultyStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            entry_insert_failures: AtomicU32::new(0),
            height_update_failures: AtomicU32::new(0),
            block_insert_failures: AtomicU32::new(0),
            entry_read_failures: AtomicU32::new(0),
            height_conflict: AtomicBool::new(false),
            block_insert_stall: Mutex::new(None),
            entry_insert_stall: Mutex::new(None),
            entry_ack_stall: Mutex::new(None),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn fail_entry_inserts(&self, n: u32) {
        self.entry_insert_failures.store(n, Ordering::SeqCst);
    }

    pub fn fail_height_updates(&self, n: u32) {
        self.height_update_failures.store(n, Ordering::SeqCst);
    }

    pub fn fail_block_inserts(&self, n: u32) {
        self.block_insert_failures.store(n, Ordering::SeqCst);
    }

    /// Fail the next `n` lookups of a single entry by id.
    pub fn fail_entry_reads(&self, n: u32) {
        self.entry_read_failures.store(n, Ordering::SeqCst);
    }

    /// Make the next height update report the entry as sealed elsewhere.
    pub fn force_height_conflict(&self) {
        self.height_conflict.store(true, Ordering::SeqCst);
    }

    /// Delay every block insert by `stall` (before it reaches the inner store).
    pub fn stall_block_inserts(&self, stall: Option<Duration>) {
        *self.block_insert_stall.lock().expect("stall lock") = stall;
    }

    /// Delay every entry insert by `stall` before it reaches the inner store.
    pub fn stall_entry_inserts(&self, stall: Option<Duration>) {
        *self.entry_insert_stall.lock().expect("stall lock") = stall;
    }

    /// Delay every entry insert by `stall` after the inner store has
    /// committed it, like a write whose acknowledgement is slow.
    pub fn stall_entry_inserts_after_commit(&self, stall: Option<Duration>) {
        *self.entry_ack_stall.lock().expect("stall lock") = stall;
    }
}

#[async_trait]
impl<S: LedgerStore> LedgerStore for FaultyStore<S> {
    async fn insert_entry(&self, entry: &Entry) -> Result<InsertResult> {
        let stall = *self.entry_insert_stall.lock().expect("stall lock");
        if let Some(stall) = stall {
            tokio::time::sleep(stall).await;
        }
        if take_failure(&self.entry_insert_failures) {
            return Err(injected("insert_entry"));
        }
        let result = self.inner.insert_entry(entry).await;
        let stall = *self.entry_ack_stall.lock().expect("stall lock");
        if let Some(stall) = stall {
            tokio::time::sleep(stall).await;
        }
        result
    }

    async fn insert_block(&self, block: &Block) -> Result<InsertResult> {
        let stall = *self.block_insert_stall.lock().expect("stall lock");
        if let Some(stall) = stall {
            tokio::time::sleep(stall).await;
        }
        if take_failure(&self.block_insert_failures) {
            return Err(injected("insert_block"));
        }
        self.inner.insert_block(block).await
    }

    async fn update_entry_height(&self, id: &EntryId, height: u64) -> Result<()> {
        if self.height_conflict.swap(false, Ordering::SeqCst) {
            return Err(StoreError::HeightConflict {
                entry: *id,
                existing: height.saturating_sub(1),
                requested: height,
            });
        }
        if take_failure(&self.height_update_failures) {
            return Err(injected("update_entry_height"));
        }
        self.inner.update_entry_height(id, height).await
    }

    async fn blocks_by_height(&self, start: u64, limit: usize) -> Result<Vec<Block>> {
        self.inner.blocks_by_height(start, limit).await
    }

    async fn latest_block(&self) -> Result<Option<Block>> {
        self.inner.latest_block().await
    }

    async fn get_block(&self, id: &BlockId) -> Result<Option<Block>> {
        self.inner.get_block(id).await
    }

    async fn block_count(&self) -> Result<u64> {
        self.inner.block_count().await
    }

    async fn entries_at_height(&self, height: u64) -> Result<Vec<Entry>> {
        self.inner.entries_at_height(height).await
    }

    async fn get_entry(&self, id: &EntryId) -> Result<Option<Entry>> {
        if take_failure(&self.entry_read_failures) {
            return Err(injected("get_entry"));
        }
        self.inner.get_entry(id).await
    }

    async fn entries_by_event_type(
        &self,
        event_type: &EventType,
        limit: usize,
    ) -> Result<Vec<Entry>> {
        self.inner.entries_by_event_type(event_type, limit).await
    }

    async fn pending_entries(&self) -> Result<Vec<Entry>> {
        self.inner.pending_entries().await
    }

    async fn latest_entry(&self) -> Result<Option<Entry>> {
        self.inner.latest_entry().await
    }

    async fn entry_count(&self) -> Result<u64> {
        self.inner.entry_count().await
    }

    async fn scan_blocks_by_height(&self, start: u64, limit: usize) -> Result<Vec<Scanned<Block>>> {
        self.inner.scan_blocks_by_height(start, limit).await
    }

    async fn scan_entries_at_height(&self, height: u64) -> Result<Vec<Scanned<Entry>>> {
        self.inner.scan_entries_at_height(height).await
    }

    async fn scan_pending_entries(&self) -> Result<Vec<Scanned<Entry>>> {
        self.inner.scan_pending_entries().await
    }
}
