//! # Audit Chain Store
//!
//! Storage abstraction for the audit chain. Provides a trait-based interface
//! for entry and block persistence with SQLite and in-memory implementations.
//!
//! ## Key Types
//!
//! - [`LedgerStore`] - The async trait for all storage operations
//! - [`SqliteStore`] - SQLite-based persistent storage
//! - [`MemoryStore`] - In-memory storage for tests
//! - [`InsertResult`] - Result of inserting an entry or block
//!
//! ## Usage
//!
//! ```rust,no_run
//! use audit_chain_store::{LedgerStore, SqliteStore};
//!
//! async fn example() -> audit_chain_store::Result<()> {
//!     let store = SqliteStore::open("ledger.db")?;
//!     let pending = store.pending_entries().await?;
//!     println!("{} entries awaiting a block", pending.len());
//!     Ok(())
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Idempotent inserts**: Inserting the same entry or block twice returns `AlreadyExists`
//! - **Conflict detection**: A different block at an existing height is `StoreError::Conflict`
//! - **Height finality**: An entry sealed at one height cannot be moved to another

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{InsertResult, LedgerStore};
