//! LedgerStore trait: the abstract interface for ledger persistence.
//!
//! This trait allows the ledger to be storage-agnostic. Implementations
//! include SQLite (primary) and in-memory (for tests).

use async_trait::async_trait;
use audit_chain_core::{Block, BlockId, Entry, EntryId, EventType, Scanned};

use crate::error::Result;

/// Result of inserting an entry or block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertResult {
    /// Record was inserted.
    Inserted,
    /// Record with the same id already exists (idempotent, not an error).
    AlreadyExists,
}

/// Async interface for ledger persistence.
///
/// All methods are async to support both sync (SQLite) and async backends.
/// For SQLite, we use `spawn_blocking` internally to avoid blocking the runtime.
///
/// # Ordering
///
/// Entries have a *persisted order*: the order in which `insert_entry`
/// accepted them. `entries_at_height`, `pending_entries` and `latest_entry`
/// all follow it. The ledger persists entries in hash-chain order, so the
/// persisted order is the chain order.
///
/// # Finality
///
/// An entry's block height moves once, from pending to a height. Setting the
/// same height again is a no-op; any other height is
/// [`StoreError::HeightConflict`](crate::StoreError::HeightConflict).
///
/// # Scans
///
/// The `scan_*` reads serve validation. A row that no longer decodes comes
/// back as [`Scanned::Undecodable`] instead of failing the whole read. The
/// defaults wrap the strict reads, for backends that cannot hold such rows.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Writes
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert a new entry. Idempotent by entry id.
    async fn insert_entry(&self, entry: &Entry) -> Result<InsertResult>;

    /// Insert a sealed block.
    ///
    /// Returns `AlreadyExists` for the same block id at the same height and
    /// `StoreError::Conflict` when another block holds the height.
    async fn insert_block(&self, block: &Block) -> Result<InsertResult>;

    /// Stamp an entry with the height of the block sealing it.
    async fn update_entry_height(&self, id: &EntryId, height: u64) -> Result<()>;

    // ─────────────────────────────────────────────────────────────────────────
    // Block reads
    // ─────────────────────────────────────────────────────────────────────────

    /// Blocks with `height >= start`, ascending, at most `limit`.
    async fn blocks_by_height(&self, start: u64, limit: usize) -> Result<Vec<Block>>;

    /// The block with the greatest height.
    async fn latest_block(&self) -> Result<Option<Block>>;

    /// Get a block by id.
    async fn get_block(&self, id: &BlockId) -> Result<Option<Block>>;

    /// Number of persisted blocks, genesis included.
    async fn block_count(&self) -> Result<u64>;

    // ─────────────────────────────────────────────────────────────────────────
    // Entry reads
    // ─────────────────────────────────────────────────────────────────────────

    /// Entries sealed at `height`, in persisted order.
    async fn entries_at_height(&self, height: u64) -> Result<Vec<Entry>>;

    /// Get an entry by id.
    async fn get_entry(&self, id: &EntryId) -> Result<Option<Entry>>;

    /// Entries of one event type, newest first.
    async fn entries_by_event_type(&self, event_type: &EventType, limit: usize)
        -> Result<Vec<Entry>>;

    /// Entries not yet sealed into a block, in persisted order.
    async fn pending_entries(&self) -> Result<Vec<Entry>>;

    /// The most recently persisted entry.
    async fn latest_entry(&self) -> Result<Option<Entry>>;

    /// Number of persisted entries, pending included.
    async fn entry_count(&self) -> Result<u64>;

    // ─────────────────────────────────────────────────────────────────────────
    // Scans
    // ─────────────────────────────────────────────────────────────────────────

    /// [`blocks_by_height`](Self::blocks_by_height), row by row.
    async fn scan_blocks_by_height(&self, start: u64, limit: usize) -> Result<Vec<Scanned<Block>>> {
        let blocks = self.blocks_by_height(start, limit).await?;
        Ok(blocks.into_iter().map(Scanned::Decoded).collect())
    }

    /// [`entries_at_height`](Self::entries_at_height), row by row.
    async fn scan_entries_at_height(&self, height: u64) -> Result<Vec<Scanned<Entry>>> {
        let entries = self.entries_at_height(height).await?;
        Ok(entries.into_iter().map(Scanned::Decoded).collect())
    }

    /// [`pending_entries`](Self::pending_entries), row by row.
    async fn scan_pending_entries(&self) -> Result<Vec<Scanned<Entry>>> {
        let entries = self.pending_entries().await?;
        Ok(entries.into_iter().map(Scanned::Decoded).collect())
    }
}
