//! # Audit Chain
//!
//! A tamper-evident audit ledger. Events are recorded as hash-chained
//! entries, periodically sealed into blocks that are themselves hash-chained
//! and signed with Ed25519. A validator re-derives every hash, digest,
//! linkage and signature to detect tampering with persisted history.
//!
//! ## Key Concepts
//!
//! - **Entry**: One recorded event. Its hash covers its content and the
//!   previous entry's hash, across block boundaries.
//! - **Block**: A signed batch of entries, linked to the previous block. The
//!   genesis block at height 0 is derived from a fixed descriptor.
//! - **Pending**: Entries recorded but not yet sealed into a block.
//! - **Violation**: A single integrity failure found during validation.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use audit_chain::{BlockScheduler, Ledger, LedgerConfig};
//! use audit_chain::core::Signer;
//! use audit_chain::store::SqliteStore;
//!
//! async fn example() -> audit_chain::Result<()> {
//!     let signer = Signer::load_or_generate("ledger.key", "primary-validator")?;
//!     let store = SqliteStore::open("ledger.db")?;
//!     let ledger = Arc::new(Ledger::open(store, signer, LedgerConfig::default()).await?);
//!
//!     let scheduler = BlockScheduler::new(ledger.clone()).start();
//!
//!     ledger
//!         .record_str("security.login.failed", serde_json::json!({"user": "alice"}))
//!         .await?;
//!
//!     let report = ledger.run_validation().await?;
//!     assert!(report.is_valid);
//!
//!     scheduler.shutdown().await.ok();
//!     Ok(())
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `audit_chain::core` - Core primitives (Entry, Block, Signer, hashing)
//! - `audit_chain::store` - Storage abstraction and SQLite

pub mod config;
pub mod error;
pub mod events;
pub mod ledger;
pub mod scheduler;
pub mod validator;

// Re-export component crates
pub use audit_chain_core as core;
pub use audit_chain_store as store;

// Re-export main types for convenience
pub use config::LedgerConfig;
pub use error::{LedgerError, Result};
pub use events::{BlockSummary, IncomingEvent, LedgerEvent};
pub use ledger::{BlockWithEntries, ChainHead, Ledger, LedgerStats};
pub use scheduler::{BlockScheduler, SchedulerHandle};
pub use validator::ChainValidator;

// Re-export commonly used core types
pub use audit_chain_core::{
    Blake3Hash, Block, BlockId, Entry, EntryId, EventCategory, EventFilter, EventType,
    GenesisDescriptor, Signer, ValidationReport, Violation, ViolationReason, ViolationScope,
};
