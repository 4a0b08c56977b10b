//! Entry: one recorded event, hash-chained to its predecessor.
//!
//! An entry's hash is fixed at creation. Its block height starts out pending
//! and is assigned exactly once, when a block seals it.

use serde::{Deserialize, Serialize};

use crate::chain::{entry_hash, ENTRY_CHAIN_ORIGIN};
use crate::crypto::Blake3Hash;
use crate::event::EventType;
use crate::types::{now_millis, EntryId};

/// A recorded event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub id: EntryId,

    /// Creation time (Unix milliseconds).
    pub timestamp: i64,

    pub event_type: EventType,

    /// Arbitrary structured data attached to the event.
    pub payload: serde_json::Value,

    /// Hash of the entry recorded just before this one.
    pub previous_hash: Blake3Hash,

    pub hash: Blake3Hash,

    /// Height of the sealing block; `None` while pending.
    pub block_height: Option<u64>,

    /// Authority that recorded the entry.
    pub signer_id: String,
}

impl Entry {
    /// Recompute the hash from the stored fields.
    pub fn compute_hash(&self) -> Blake3Hash {
        entry_hash(
            &self.id,
            self.timestamp,
            &self.event_type,
            &self.payload,
            &self.previous_hash,
        )
    }

    /// Whether the stored hash matches the stored content.
    pub fn verify_hash(&self) -> bool {
        self.compute_hash() == self.hash
    }

    pub fn is_pending(&self) -> bool {
        self.block_height.is_none()
    }
}

/// Builder for entries.
///
/// Id and timestamp default to fresh values; tests and fixtures pin them for
/// reproducible hashes.
#[derive(Debug, Clone)]
pub struct EntryBuilder {
    id: Option<EntryId>,
    timestamp: Option<i64>,
    event_type: EventType,
    payload: serde_json::Value,
    previous_hash: Blake3Hash,
    signer_id: String,
}

impl EntryBuilder {
    pub fn new(event_type: EventType, payload: serde_json::Value) -> Self {
        Self {
            id: None,
            timestamp: None,
            event_type,
            payload,
            previous_hash: ENTRY_CHAIN_ORIGIN,
            signer_id: String::new(),
        }
    }

    pub fn id(mut self, id: EntryId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn timestamp(mut self, ts: i64) -> Self {
        self.timestamp = Some(ts);
        self
    }

    /// Link to the previous entry's hash.
    pub fn previous(mut self, hash: Blake3Hash) -> Self {
        self.previous_hash = hash;
        self
    }

    pub fn signer_id(mut self, signer_id: impl Into<String>) -> Self {
        self.signer_id = signer_id.into();
        self
    }

    /// Hash the fields and produce a pending entry.
    pub fn build(self) -> Entry {
        let id = self.id.unwrap_or_else(EntryId::generate);
        let timestamp = self.timestamp.unwrap_or_else(now_millis);
        let hash = entry_hash(
            &id,
            timestamp,
            &self.event_type,
            &self.payload,
            &self.previous_hash,
        );

        Entry {
            id,
            timestamp,
            event_type: self.event_type,
            payload: self.payload,
            previous_hash: self.previous_hash,
            hash,
            block_height: None,
            signer_id: self.signer_id,
        }
    }
}
