//! In-memory implementation of the LedgerStore trait.
//!
//! This is primarily for testing. It has the same semantics as SQLite
//! but keeps everything in memory with no persistence.

use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use audit_chain_core::{Block, BlockId, Entry, EntryId, EventType};

use crate::error::{Result, StoreError};
use crate::traits::{InsertResult, LedgerStore};

/// In-memory store implementation.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock.
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    /// Entries in persisted order.
    entries: Vec<Entry>,

    /// Entry id -> position in `entries`.
    entry_index: HashMap<EntryId, usize>,

    /// Blocks by height.
    blocks: BTreeMap<u64, Block>,
}

impl MemoryStoreInner {
    fn reindex(&mut self) {
        self.entry_index = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, e)| (e.id, i))
            .collect();
    }
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemoryStoreInner::default()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryStoreInner>> {
        self.inner
            .read()
            .map_err(|e| StoreError::Unavailable(format!("store lock poisoned: {}", e)))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryStoreInner>> {
        self.inner
            .write()
            .map_err(|e| StoreError::Unavailable(format!("store lock poisoned: {}", e)))
    }

    /// Mutate persisted entries directly, bypassing every check.
    ///
    /// The vector is in persisted order; reordering it reorders what
    /// `entries_at_height` returns. Used to simulate storage tampering.
    pub fn tamper_entries<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut Vec<Entry>),
    {
        let mut inner = self.write()?;
        f(&mut inner.entries);
        inner.reindex();
        Ok(())
    }

    /// Mutate persisted blocks directly, keyed by height.
    pub fn tamper_blocks<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut BTreeMap<u64, Block>),
    {
        let mut inner = self.write()?;
        f(&mut inner.blocks);
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn insert_entry(&self, entry: &Entry) -> Result<InsertResult> {
        let mut inner = self.write()?;

        if inner.entry_index.contains_key(&entry.id) {
            return Ok(InsertResult::AlreadyExists);
        }

        let position = inner.entries.len();
        inner.entries.push(entry.clone());
        inner.entry_index.insert(entry.id, position);

        Ok(InsertResult::Inserted)
    }

    async fn insert_block(&self, block: &Block) -> Result<InsertResult> {
        let mut inner = self.write()?;

        if let Some(existing) = inner.blocks.get(&block.height) {
            if existing.id == block.id {
                return Ok(InsertResult::AlreadyExists);
            }
            return Err(StoreError::Conflict {
                height: block.height,
                existing: existing.id,
            });
        }

        inner.blocks.insert(block.height, block.clone());
        Ok(InsertResult::Inserted)
    }

    async fn update_entry_height(&self, id: &EntryId, height: u64) -> Result<()> {
        let mut inner = self.write()?;

        let position = *inner
            .entry_index
            .get(id)
            .ok_or_else(|| StoreError::NotFound(format!("entry {}", id)))?;
        let entry = &mut inner.entries[position];

        match entry.block_height {
            None => {
                entry.block_height = Some(height);
                Ok(())
            }
            Some(existing) if existing == height => Ok(()),
            Some(existing) => Err(StoreError::HeightConflict {
                entry: *id,
                existing,
                requested: height,
            }),
        }
    }

    async fn blocks_by_height(&self, start: u64, limit: usize) -> Result<Vec<Block>> {
        let inner = self.read()?;
        Ok(inner
            .blocks
            .range(start..)
            .take(limit)
            .map(|(_, b)| b.clone())
            .collect())
    }

    async fn latest_block(&self) -> Result<Option<Block>> {
        let inner = self.read()?;
        Ok(inner.blocks.values().next_back().cloned())
    }

    async fn get_block(&self, id: &BlockId) -> Result<Option<Block>> {
        let inner = self.read()?;
        Ok(inner.blocks.values().find(|b| b.id == *id).cloned())
    }

    async fn block_count(&self) -> Result<u64> {
        Ok(self.read()?.blocks.len() as u64)
    }

    async fn entries_at_height(&self, height: u64) -> Result<Vec<Entry>> {
        let inner = self.read()?;
        Ok(inner
            .entries
            .iter()
            .filter(|e| e.block_height == Some(height))
            .cloned()
            .collect())
    }

    async fn get_entry(&self, id: &EntryId) -> Result<Option<Entry>> {
        let inner = self.read()?;
        Ok(inner.entry_index.get(id).map(|&i| inner.entries[i].clone()))
    }

    async fn entries_by_event_type(
        &self,
        event_type: &EventType,
        limit: usize,
    ) -> Result<Vec<Entry>> {
        let inner = self.read()?;
        let mut matching: Vec<(usize, &Entry)> = inner
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.event_type == *event_type)
            .collect();
        // Newest first; persisted order breaks timestamp ties, as in SQLite.
        matching.sort_by(|(ia, a), (ib, b)| b.timestamp.cmp(&a.timestamp).then(ib.cmp(ia)));

        Ok(matching
            .into_iter()
            .take(limit)
            .map(|(_, e)| e.clone())
            .collect())
    }

    async fn pending_entries(&self) -> Result<Vec<Entry>> {
        let inner = self.read()?;
        Ok(inner
            .entries
            .iter()
            .filter(|e| e.is_pending())
            .cloned()
            .collect())
    }

    async fn latest_entry(&self) -> Result<Option<Entry>> {
        Ok(self.read()?.entries.last().cloned())
    }

    async fn entry_count(&self) -> Result<u64> {
        Ok(self.read()?.entries.len() as u64)
    }
}
