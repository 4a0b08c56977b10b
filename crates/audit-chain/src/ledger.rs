//! The Ledger: records entries and seals them into signed blocks.
//!
//! # Concurrency
//!
//! - The append lock serializes `record`. It is held across the persist
//!   call, so hash assignment order is persistence order and a block cycle
//!   can never drain a half-recorded entry.
//! - The cycle lock makes block cycles mutually exclusive and owns the
//!   batch a cycle has claimed but not yet sealed. A claimed batch is never
//!   returned to the pending queue; a failed cycle is retried with the same
//!   block id, timestamp and height.
//! - The chain head is written only as the last step of a sealed cycle.
//!
//! Lock order is cycle, then append.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use audit_chain_core::{
    genesis_hash, now_millis, Blake3Hash, Block, BlockId, Ed25519PublicKey, Entry, EntryBuilder,
    EntryId, EventType, Signer, ValidationReport, ENTRY_CHAIN_ORIGIN,
};
use audit_chain_store::{LedgerStore, StoreError};

use crate::config::LedgerConfig;
use crate::error::{LedgerError, Result};
use crate::events::{BlockSummary, IncomingEvent, LedgerEvent, Notifier};
use crate::validator::ChainValidator;

/// Tip of the block chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainHead {
    pub height: u64,
    pub hash: Blake3Hash,
    pub timestamp: i64,
}

impl ChainHead {
    fn of(block: &Block) -> Self {
        Self {
            height: block.height,
            hash: block.hash,
            timestamp: block.timestamp,
        }
    }
}

/// Operator view of the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerStats {
    pub block_count: u64,
    pub entry_count: u64,
    /// Entries not yet in a persisted block, claimed batch included.
    pub pending_count: u64,
    pub current_height: u64,
    pub signer_id: String,
    pub last_block_timestamp: i64,
}

/// A block together with the entries it seals.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockWithEntries {
    pub block: Block,
    pub entries: Vec<Entry>,
}

struct AppendState {
    last_hash: Blake3Hash,
    pending: VecDeque<Entry>,
    /// An entry whose insert failed without a definite outcome. It may
    /// still be in the store, so it is settled before anything else is
    /// chained.
    in_doubt: Option<Entry>,
}

struct ClaimedBatch {
    id: BlockId,
    timestamp: i64,
    height: u64,
    entries: Vec<Entry>,
}

#[derive(Default)]
struct CycleState {
    claimed: Option<ClaimedBatch>,
    consecutive_failures: u32,
}

/// Bound a store call by `timeout`.
async fn bounded<T, F>(timeout: Duration, operation: &'static str, fut: F) -> Result<T>
where
    F: Future<Output = audit_chain_store::Result<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result.map_err(LedgerError::from),
        Err(_) => Err(LedgerError::PersistTimeout { operation, timeout }),
    }
}

/// The audit ledger.
///
/// Share it as `Arc<Ledger<S>>` between the scheduler, the event consumer
/// and callers.
pub struct Ledger<S: LedgerStore> {
    store: Arc<S>,
    signer: Signer,
    config: LedgerConfig,
    append: Mutex<AppendState>,
    cycle: Mutex<CycleState>,
    head: RwLock<ChainHead>,
    claimed_count: AtomicUsize,
    halted: AtomicBool,
    notifier: Notifier,
}

impl<S: LedgerStore> Ledger<S> {
    /// Open the ledger on a store.
    ///
    /// An empty store gets a freshly signed genesis block. Otherwise the
    /// chain head, the pending queue and the last entry hash are restored
    /// from storage, and entries already stamped with the next height (a
    /// cycle interrupted between stamping and block insert) become the
    /// claimed batch, sealed first by the next cycle.
    pub async fn open(store: S, signer: Signer, config: LedgerConfig) -> Result<Self> {
        config.validate()?;
        let store = Arc::new(store);
        let timeout = config.persist_timeout;

        let head_block = match bounded(timeout, "latest_block", store.latest_block()).await? {
            Some(block) => block,
            None => {
                let genesis = Block::genesis(&config.genesis, &signer);
                bounded(timeout, "insert_block", store.insert_block(&genesis)).await?;
                info!(
                    block_id = %genesis.id,
                    hash = %genesis.hash,
                    signer = signer.signer_id(),
                    "genesis block created"
                );
                genesis
            }
        };
        let head = ChainHead::of(&head_block);

        let last_hash = bounded(timeout, "latest_entry", store.latest_entry())
            .await?
            .map(|e| e.hash)
            .unwrap_or(ENTRY_CHAIN_ORIGIN);
        let pending: VecDeque<Entry> = bounded(timeout, "pending_entries", store.pending_entries())
            .await?
            .into();

        let next_height = head.height + 1;
        let orphaned =
            bounded(timeout, "entries_at_height", store.entries_at_height(next_height)).await?;
        let claimed = if orphaned.is_empty() {
            None
        } else {
            warn!(
                height = next_height,
                entries = orphaned.len(),
                "resuming interrupted block cycle"
            );
            Some(ClaimedBatch {
                id: BlockId::generate(),
                timestamp: now_millis(),
                height: next_height,
                entries: orphaned,
            })
        };
        let claimed_count = claimed.as_ref().map_or(0, |b| b.entries.len());

        // Unsealed entries get sealed by this signer; their signer id must match.
        let mut unsealed = pending
            .iter()
            .chain(claimed.iter().flat_map(|b| b.entries.iter()));
        if let Some(foreign) = unsealed.find(|e| e.signer_id != signer.signer_id()) {
            return Err(LedgerError::SignerChanged {
                recorded: foreign.signer_id.clone(),
                current: signer.signer_id().to_string(),
            });
        }

        info!(
            height = head.height,
            pending = pending.len() + claimed_count,
            signer = signer.signer_id(),
            "ledger opened"
        );

        Ok(Self {
            store,
            notifier: Notifier::new(config.notification_capacity),
            signer,
            config,
            append: Mutex::new(AppendState {
                last_hash,
                pending,
                in_doubt: None,
            }),
            cycle: Mutex::new(CycleState {
                claimed,
                consecutive_failures: 0,
            }),
            head: RwLock::new(head),
            claimed_count: AtomicUsize::new(claimed_count),
            halted: AtomicBool::new(false),
        })
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn signer(&self) -> &Signer {
        &self.signer
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Current chain head.
    pub fn head(&self) -> ChainHead {
        self.head
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Whether block production has stopped.
    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::Acquire)
    }

    /// Subscribe to ledger notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<LedgerEvent> {
        self.notifier.subscribe()
    }

    fn store_call<T, F>(&self, operation: &'static str, fut: F) -> impl Future<Output = Result<T>>
    where
        F: Future<Output = audit_chain_store::Result<T>>,
    {
        bounded(self.config.persist_timeout, operation, fut)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Recording
    // ─────────────────────────────────────────────────────────────────────────

    /// Record an event. The entry is persisted before this returns.
    ///
    /// When the insert fails the store is asked whether the entry landed
    /// anyway (a timed-out write may still commit). If it did, the entry is
    /// adopted and this returns `Ok`. If that cannot be told, the entry is
    /// held as in doubt and the next call settles it before chaining
    /// anything new. Otherwise nothing changes.
    pub async fn record(&self, event_type: EventType, payload: serde_json::Value) -> Result<EntryId> {
        let mut append = self.append.lock().await;
        self.settle_in_doubt(&mut append).await?;

        let entry = EntryBuilder::new(event_type, payload)
            .previous(append.last_hash)
            .signer_id(self.signer.signer_id())
            .build();

        if let Err(err) = self
            .store_call("insert_entry", self.store.insert_entry(&entry))
            .await
        {
            let timed_out = matches!(err, LedgerError::PersistTimeout { .. });
            match self
                .store_call("get_entry", self.store.get_entry(&entry.id))
                .await
            {
                Ok(Some(_)) => {
                    warn!(
                        entry_id = %entry.id,
                        error = %err,
                        "failed insert was persisted, adopting entry"
                    );
                }
                Ok(None) if !timed_out => return Err(err),
                Ok(None) | Err(_) => {
                    warn!(
                        entry_id = %entry.id,
                        error = %err,
                        "entry insert outcome unknown, recording paused until settled"
                    );
                    append.in_doubt = Some(entry);
                    return Err(err);
                }
            }
        }

        Self::accept(&mut append, entry.clone());
        drop(append);

        debug!(
            entry_id = %entry.id,
            event_type = %entry.event_type,
            hash = %entry.hash,
            "entry recorded"
        );
        self.notify_recorded(&entry);

        Ok(entry.id)
    }

    fn accept(append: &mut AppendState, entry: Entry) {
        append.last_hash = entry.hash;
        append.pending.push_back(entry);
    }

    fn notify_recorded(&self, entry: &Entry) {
        self.notifier.emit(LedgerEvent::EntryRecorded {
            id: entry.id,
            hash: entry.hash,
            event_type: entry.event_type.clone(),
            timestamp: entry.timestamp,
        });
    }

    /// Resolve an in-doubt entry: adopt it if the store has it, drop it if
    /// not, then require the store's newest entry to be our chain tip.
    async fn settle_in_doubt(&self, append: &mut AppendState) -> Result<()> {
        let Some(doubtful) = append.in_doubt.clone() else {
            return Ok(());
        };

        let stored = self
            .store_call("get_entry", self.store.get_entry(&doubtful.id))
            .await?;
        let latest = self
            .store_call("latest_entry", self.store.latest_entry())
            .await?
            .map_or(ENTRY_CHAIN_ORIGIN, |e| e.hash);

        let expected = if stored.is_some() {
            doubtful.hash
        } else {
            append.last_hash
        };
        if latest != expected {
            error!(expected = %expected, found = %latest, "entry chain diverged from store");
            return Err(LedgerError::Desynced {
                expected,
                found: latest,
            });
        }

        append.in_doubt = None;
        if stored.is_some() {
            info!(entry_id = %doubtful.id, "in-doubt entry found in store, adopting");
            Self::accept(append, doubtful.clone());
            self.notify_recorded(&doubtful);
        } else {
            info!(entry_id = %doubtful.id, "in-doubt entry never persisted, dropping");
        }
        Ok(())
    }

    /// Record an event given its type as text.
    pub async fn record_str(&self, event_type: &str, payload: serde_json::Value) -> Result<EntryId> {
        let event_type =
            EventType::parse(event_type).map_err(|e| LedgerError::InvalidEventType(e.to_string()))?;
        self.record(event_type, payload).await
    }

    /// Entries not yet in a persisted block, claimed batch included.
    pub async fn pending_count(&self) -> usize {
        let queued = self.append.lock().await.pending.len();
        queued + self.claimed_count.load(Ordering::Acquire)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Block production
    // ─────────────────────────────────────────────────────────────────────────

    /// Run one block cycle.
    ///
    /// Returns `Ok(None)` when there is nothing to seal. Concurrent callers
    /// are serialized; each non-empty claim produces exactly one block.
    pub async fn try_build_block(&self) -> Result<Option<BlockSummary>> {
        let mut cycle = self.cycle.lock().await;

        if self.is_halted() {
            return Err(LedgerError::Halted);
        }

        if cycle.claimed.is_none() {
            let entries: Vec<Entry> = self.append.lock().await.pending.drain(..).collect();
            if entries.is_empty() {
                return Ok(None);
            }
            self.claimed_count.store(entries.len(), Ordering::Release);
            cycle.claimed = Some(ClaimedBatch {
                id: BlockId::generate(),
                timestamp: now_millis(),
                height: self.head().height + 1,
                entries,
            });
        }

        let Some(batch) = cycle.claimed.as_ref() else {
            return Ok(None);
        };
        let height = batch.height;

        match self.seal(batch).await {
            Ok(block) => {
                cycle.claimed = None;
                cycle.consecutive_failures = 0;
                self.claimed_count.store(0, Ordering::Release);
                *self.head.write().unwrap_or_else(PoisonError::into_inner) = ChainHead::of(&block);

                let summary = BlockSummary {
                    id: block.id,
                    height: block.height,
                    hash: block.hash,
                    timestamp: block.timestamp,
                    entry_count: block.entry_count,
                    aggregate_digest: block.aggregate_digest,
                };
                info!(
                    height = block.height,
                    block_id = %block.id,
                    hash = %block.hash,
                    entries = block.entry_count,
                    "block sealed"
                );
                self.notifier.emit(LedgerEvent::BlockCreated(summary.clone()));
                Ok(Some(summary))
            }
            Err(LedgerError::Store(StoreError::HeightConflict {
                entry,
                existing,
                requested,
            })) => {
                self.halt("entry claimed twice");
                Err(LedgerError::DoubleClaim {
                    entry,
                    existing,
                    requested,
                })
            }
            Err(LedgerError::Store(err @ StoreError::Conflict { .. })) => {
                self.halt("block height already taken");
                Err(LedgerError::Store(err))
            }
            Err(err) => {
                cycle.consecutive_failures += 1;
                warn!(
                    height,
                    attempt = cycle.consecutive_failures,
                    error = %err,
                    "block cycle failed"
                );
                if cycle.consecutive_failures >= self.config.max_build_attempts {
                    self.halt("too many consecutive block failures");
                }
                Err(err)
            }
        }
    }

    /// Persist a claimed batch as a block. Every step is idempotent, so a
    /// retry after a partial failure converges on the same block.
    async fn seal(&self, batch: &ClaimedBatch) -> Result<Block> {
        for entry in &batch.entries {
            self.store_call(
                "update_entry_height",
                self.store.update_entry_height(&entry.id, batch.height),
            )
            .await?;
        }

        let previous = self.head();
        let hashes: Vec<Blake3Hash> = batch.entries.iter().map(|e| e.hash).collect();
        let block = Block::seal(
            batch.id,
            batch.height,
            batch.timestamp,
            previous.hash,
            &hashes,
            &self.signer,
        );

        self.store_call("insert_block", self.store.insert_block(&block))
            .await?;
        Ok(block)
    }

    fn halt(&self, reason: &str) {
        self.halted.store(true, Ordering::Release);
        error!(reason, height = self.head().height, "block production halted");
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn get_entry(&self, id: &EntryId) -> Result<Option<Entry>> {
        self.store_call("get_entry", self.store.get_entry(id)).await
    }

    /// A block and the entries it seals, in persisted order.
    pub async fn get_block(&self, id: &BlockId) -> Result<Option<BlockWithEntries>> {
        let Some(block) = self.store_call("get_block", self.store.get_block(id)).await? else {
            return Ok(None);
        };
        let entries = self
            .store_call("entries_at_height", self.store.entries_at_height(block.height))
            .await?;
        Ok(Some(BlockWithEntries { block, entries }))
    }

    /// Entries of one event type, newest first.
    pub async fn entries_by_event_type(
        &self,
        event_type: &EventType,
        limit: usize,
    ) -> Result<Vec<Entry>> {
        self.store_call(
            "entries_by_event_type",
            self.store.entries_by_event_type(event_type, limit),
        )
        .await
    }

    pub async fn stats(&self) -> Result<LedgerStats> {
        let block_count = self.store_call("block_count", self.store.block_count()).await?;
        let entry_count = self.store_call("entry_count", self.store.entry_count()).await?;
        let head = self.head();

        Ok(LedgerStats {
            block_count,
            entry_count,
            pending_count: self.pending_count().await as u64,
            current_height: head.height,
            signer_id: self.signer.signer_id().to_string(),
            last_block_timestamp: head.timestamp,
        })
    }

    /// Recheck one entry's stored hash. `None` if the entry is unknown.
    pub async fn verify_entry_integrity(&self, id: &EntryId) -> Result<Option<bool>> {
        Ok(self.get_entry(id).await?.map(|entry| entry.verify_hash()))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Validation
    // ─────────────────────────────────────────────────────────────────────────

    /// Keys whose block signatures validation accepts.
    pub fn trusted_keys(&self) -> Vec<Ed25519PublicKey> {
        let mut keys = vec![self.signer.public_key()];
        keys.extend(self.config.retired_keys.iter().copied());
        keys
    }

    /// Validate the full persisted history.
    ///
    /// Holds the cycle lock, so no block is sealed mid-pass.
    pub async fn run_validation(&self) -> Result<ValidationReport> {
        let _cycle = self.cycle.lock().await;

        let validator = ChainValidator::new(
            self.store.clone(),
            genesis_hash(&self.config.genesis),
            self.trusted_keys(),
        );
        let report = validator.validate().await?;

        if report.is_valid {
            info!(
                blocks = report.blocks_checked,
                entries = report.entries_checked,
                "ledger validation passed"
            );
        } else {
            warn!(
                blocks = report.blocks_checked,
                entries = report.entries_checked,
                violations = report.violations.len(),
                "ledger validation failed"
            );
        }
        self.notifier
            .emit(LedgerEvent::validation_completed(&report));
        Ok(report)
    }
}

impl<S: LedgerStore + 'static> Ledger<S> {
    /// Consume incoming events until the channel closes.
    ///
    /// Log events pass through the loggable filter; failures to record are
    /// logged and broadcast as [`LedgerEvent::RecordFailed`], never fatal.
    pub fn spawn_event_consumer(
        self: &Arc<Self>,
        mut rx: mpsc::Receiver<IncomingEvent>,
    ) -> JoinHandle<()> {
        let ledger = Arc::clone(self);

        tokio::spawn(async move {
            info!("event consumer started");

            while let Some(event) = rx.recv().await {
                match event {
                    IncomingEvent::Log {
                        event_type,
                        payload,
                    } => ledger.handle_log(event_type, payload).await,
                    IncomingEvent::ValidationRequest { reply } => {
                        let result = ledger.run_validation().await;
                        if let Err(ref err) = result {
                            warn!(error = %err, "requested validation failed");
                        }
                        if let Some(reply) = reply {
                            let _ = reply.send(result);
                        }
                    }
                }
            }

            info!("event consumer stopped");
        })
    }

    async fn handle_log(&self, name: String, payload: serde_json::Value) {
        let event_type = match EventType::parse(&name) {
            Ok(event_type) => event_type,
            Err(err) => {
                warn!(event_type = %name, error = %err, "rejected incoming event");
                self.notifier.emit(LedgerEvent::RecordFailed {
                    event_type: name,
                    error: err.to_string(),
                });
                return;
            }
        };

        if !self.config.loggable.matches(&event_type) {
            debug!(event_type = %event_type, "event not loggable, skipped");
            return;
        }

        if let Err(err) = self.record(event_type, payload).await {
            warn!(event_type = %name, error = %err, "failed to record event");
            self.notifier.emit(LedgerEvent::RecordFailed {
                event_type: name,
                error: err.to_string(),
            });
        }
    }
}
