//! Error types for the ledger.

use std::time::Duration;

use audit_chain_core::{Blake3Hash, CoreError, EntryId};
use audit_chain_store::StoreError;
use thiserror::Error;

/// Errors that can occur during ledger operations.
///
/// Integrity problems found by validation are not errors; they are reported
/// as violations in a [`ValidationReport`](audit_chain_core::ValidationReport).
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Core primitive error (key material, encoding).
    #[error("core error: {0}")]
    Core(#[from] CoreError),

    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Event type string failed to parse.
    #[error("invalid event type: {0}")]
    InvalidEventType(String),

    /// A store call did not finish in time.
    #[error("{operation} timed out after {timeout:?}")]
    PersistTimeout {
        operation: &'static str,
        timeout: Duration,
    },

    /// Block production stopped after repeated failures or a double claim.
    #[error("block production halted")]
    Halted,

    /// An entry was already sealed into a different block.
    #[error("entry {entry} already sealed at height {existing}, claimed again for {requested}")]
    DoubleClaim {
        entry: EntryId,
        existing: u64,
        requested: u64,
    },

    /// The store's newest entry is not the one this ledger chained last.
    /// Recording stays refused until the two agree.
    #[error("entry chain out of sync with store: expected tip {expected}, store has {found}")]
    Desynced {
        expected: Blake3Hash,
        found: Blake3Hash,
    },

    /// Unsealed entries carry a signer id other than the current signer's.
    #[error("unsealed entries were recorded by {recorded:?}, current signer is {current:?}")]
    SignerChanged { recorded: String, current: String },

    /// Configuration rejected at startup.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;
