//! Ledger notifications and the incoming event feed.
//!
//! Outgoing: every recorded entry, sealed block, finished validation and
//! failed record is broadcast as a [`LedgerEvent`] to any number of
//! subscribers. Slow subscribers lag and miss events; the ledger never
//! blocks on them.
//!
//! Incoming: other components send [`IncomingEvent`]s over an mpsc channel
//! consumed by [`Ledger::spawn_event_consumer`](crate::Ledger::spawn_event_consumer).

use serde::Serialize;
use tokio::sync::{broadcast, oneshot};

use audit_chain_core::{Blake3Hash, BlockId, EntryId, EventType, ValidationReport};

use crate::error::Result;

/// Description of a freshly sealed block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockSummary {
    pub id: BlockId,
    pub height: u64,
    pub hash: Blake3Hash,
    pub timestamp: i64,
    pub entry_count: u64,
    pub aggregate_digest: Blake3Hash,
}

/// Notification emitted by the ledger.
#[derive(Debug, Clone)]
pub enum LedgerEvent {
    EntryRecorded {
        id: EntryId,
        hash: Blake3Hash,
        event_type: EventType,
        timestamp: i64,
    },
    BlockCreated(BlockSummary),
    ValidationCompleted {
        is_valid: bool,
        violation_count: usize,
        blocks_checked: u64,
        entries_checked: u64,
    },
    /// An incoming event could not be recorded.
    RecordFailed { event_type: String, error: String },
}

impl LedgerEvent {
    pub(crate) fn validation_completed(report: &ValidationReport) -> Self {
        LedgerEvent::ValidationCompleted {
            is_valid: report.is_valid,
            violation_count: report.violations.len(),
            blocks_checked: report.blocks_checked,
            entries_checked: report.entries_checked,
        }
    }
}

/// Event delivered to the ledger by the rest of the system.
#[derive(Debug)]
pub enum IncomingEvent {
    /// Something happened; record it if the loggable filter accepts it.
    Log {
        event_type: String,
        payload: serde_json::Value,
    },
    /// Validate the whole ledger, optionally returning the report.
    ValidationRequest {
        reply: Option<oneshot::Sender<Result<ValidationReport>>>,
    },
}

impl IncomingEvent {
    pub fn log(event_type: impl Into<String>, payload: serde_json::Value) -> Self {
        IncomingEvent::Log {
            event_type: event_type.into(),
            payload,
        }
    }

    /// A validation request plus the receiver its report arrives on.
    pub fn validation_request() -> (Self, oneshot::Receiver<Result<ValidationReport>>) {
        let (tx, rx) = oneshot::channel();
        (IncomingEvent::ValidationRequest { reply: Some(tx) }, rx)
    }
}

/// Broadcast side of the notification channel.
#[derive(Debug, Clone)]
pub(crate) struct Notifier {
    tx: broadcast::Sender<LedgerEvent>,
}

impl Notifier {
    pub(crate) fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<LedgerEvent> {
        self.tx.subscribe()
    }

    /// Send to current subscribers. No subscribers is not an error.
    pub(crate) fn emit(&self, event: LedgerEvent) {
        let _ = self.tx.send(event);
    }
}
