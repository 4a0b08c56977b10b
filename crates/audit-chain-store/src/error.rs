//! Error types for the store module.

use audit_chain_core::{BlockId, EntryId};
use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Payload serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Record not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// A different block already occupies this height.
    #[error("conflict at height {height}: existing block {existing}")]
    Conflict { height: u64, existing: BlockId },

    /// The entry was already finalized at another height.
    #[error("entry {entry} already sealed at height {existing}, refusing height {requested}")]
    HeightConflict {
        entry: EntryId,
        existing: u64,
        requested: u64,
    },

    /// Invalid data in storage.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// Backend temporarily unusable (poisoned lock, worker failure).
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
