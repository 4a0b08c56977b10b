//! SQLite implementation of the LedgerStore trait.
//!
//! This is the primary storage backend for the audit chain. It uses
//! rusqlite with bundled SQLite, wrapped in async via tokio::spawn_blocking.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::types::ValueRef;
use rusqlite::{params, Connection, OptionalExtension, Row};

use audit_chain_core::{
    Blake3Hash, Block, BlockId, Ed25519Signature, Entry, EntryId, EventType, Scanned,
    UndecodableRecord,
};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::{InsertResult, LedgerStore};

/// Column value for a pending entry's height.
const PENDING_HEIGHT: i64 = -1;

const ENTRY_COLUMNS: &str = "entry_id, timestamp, event_type, payload, previous_hash, hash, \
                             block_height, signer_id";

const BLOCK_COLUMNS: &str = "block_id, height, timestamp, previous_block_hash, aggregate_digest, \
                             hash, signature, signer_id, entry_count";

/// SQLite-based store implementation.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database.
    ///
    /// Useful for testing.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run a closure against the connection on the blocking pool.
    async fn blocking<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|e| StoreError::Unavailable(format!("connection mutex poisoned: {}", e)))?;
            f(&mut conn)
        })
        .await
        .map_err(|e| StoreError::Unavailable(format!("spawn_blocking failed: {}", e)))?
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Row decoding
// ─────────────────────────────────────────────────────────────────────────────

fn fixed<const N: usize>(bytes: &[u8], column: &str) -> Result<[u8; N]> {
    bytes.try_into().map_err(|_| {
        StoreError::InvalidData(format!(
            "{} has {} bytes, expected {}",
            column,
            bytes.len(),
            N
        ))
    })
}

struct EntryRow {
    entry_id: Vec<u8>,
    timestamp: i64,
    event_type: String,
    payload: String,
    previous_hash: Vec<u8>,
    hash: Vec<u8>,
    block_height: i64,
    signer_id: String,
}

impl EntryRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            entry_id: row.get("entry_id")?,
            timestamp: row.get("timestamp")?,
            event_type: row.get("event_type")?,
            payload: row.get("payload")?,
            previous_hash: row.get("previous_hash")?,
            hash: row.get("hash")?,
            block_height: row.get("block_height")?,
            signer_id: row.get("signer_id")?,
        })
    }

    fn into_entry(self) -> Result<Entry> {
        let event_type = EventType::parse(&self.event_type)
            .map_err(|e| StoreError::InvalidData(e.to_string()))?;
        let block_height = match self.block_height {
            PENDING_HEIGHT => None,
            h if h >= 0 => Some(h as u64),
            h => return Err(StoreError::InvalidData(format!("negative block height {}", h))),
        };

        Ok(Entry {
            id: EntryId(fixed(&self.entry_id, "entry_id")?),
            timestamp: self.timestamp,
            event_type,
            payload: serde_json::from_str(&self.payload)?,
            previous_hash: Blake3Hash(fixed(&self.previous_hash, "previous_hash")?),
            hash: Blake3Hash(fixed(&self.hash, "hash")?),
            block_height,
            signer_id: self.signer_id,
        })
    }
}

struct BlockRow {
    block_id: Vec<u8>,
    height: i64,
    timestamp: i64,
    previous_block_hash: Vec<u8>,
    aggregate_digest: Vec<u8>,
    hash: Vec<u8>,
    signature: Vec<u8>,
    signer_id: String,
    entry_count: i64,
}

impl BlockRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            block_id: row.get("block_id")?,
            height: row.get("height")?,
            timestamp: row.get("timestamp")?,
            previous_block_hash: row.get("previous_block_hash")?,
            aggregate_digest: row.get("aggregate_digest")?,
            hash: row.get("hash")?,
            signature: row.get("signature")?,
            signer_id: row.get("signer_id")?,
            entry_count: row.get("entry_count")?,
        })
    }

    fn into_block(self) -> Result<Block> {
        let height = u64::try_from(self.height)
            .map_err(|_| StoreError::InvalidData(format!("negative height {}", self.height)))?;
        let entry_count = u64::try_from(self.entry_count).map_err(|_| {
            StoreError::InvalidData(format!("negative entry count {}", self.entry_count))
        })?;

        Ok(Block {
            id: BlockId(fixed(&self.block_id, "block_id")?),
            height,
            timestamp: self.timestamp,
            previous_block_hash: Blake3Hash(fixed(&self.previous_block_hash, "previous_block_hash")?),
            aggregate_digest: Blake3Hash(fixed(&self.aggregate_digest, "aggregate_digest")?),
            hash: Blake3Hash(fixed(&self.hash, "hash")?),
            signature: Ed25519Signature(fixed(&self.signature, "signature")?),
            signer_id: self.signer_id,
            entry_count,
        })
    }
}

fn query_entries(conn: &Connection, sql: &str, params: impl rusqlite::Params) -> Result<Vec<Entry>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, EntryRow::read)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    rows.into_iter().map(EntryRow::into_entry).collect()
}

fn query_blocks(conn: &Connection, sql: &str, params: impl rusqlite::Params) -> Result<Vec<Block>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, BlockRow::read)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    rows.into_iter().map(BlockRow::into_block).collect()
}

/// Raw bytes of an id column, whatever its storage class.
fn raw_id(row: &Row<'_>, column: &str) -> Vec<u8> {
    match row.get_ref(column) {
        Ok(ValueRef::Blob(bytes)) | Ok(ValueRef::Text(bytes)) => bytes.to_vec(),
        Ok(ValueRef::Integer(n)) => n.to_be_bytes().to_vec(),
        _ => Vec::new(),
    }
}

fn raw_hash(row: &Row<'_>, column: &str) -> Option<Blake3Hash> {
    let bytes = row.get_ref(column).ok()?.as_blob().ok()?;
    bytes.try_into().ok().map(Blake3Hash)
}

fn raw_height(row: &Row<'_>, column: &str) -> Option<u64> {
    let height: i64 = row.get(column).ok()?;
    u64::try_from(height).ok()
}

fn scan_entry(row: &Row<'_>) -> rusqlite::Result<Scanned<Entry>> {
    let decoded = EntryRow::read(row)
        .map_err(StoreError::from)
        .and_then(EntryRow::into_entry);
    Ok(match decoded {
        Ok(entry) => Scanned::Decoded(entry),
        Err(e) => Scanned::Undecodable(
            UndecodableRecord::new(&raw_id(row, "entry_id"), e.to_string())
                .with_height(raw_height(row, "block_height"))
                .with_hash(raw_hash(row, "hash")),
        ),
    })
}

fn scan_block(row: &Row<'_>) -> rusqlite::Result<Scanned<Block>> {
    let decoded = BlockRow::read(row)
        .map_err(StoreError::from)
        .and_then(BlockRow::into_block);
    Ok(match decoded {
        Ok(block) => Scanned::Decoded(block),
        Err(e) => Scanned::Undecodable(
            UndecodableRecord::new(&raw_id(row, "block_id"), e.to_string())
                .with_height(raw_height(row, "height"))
                .with_hash(raw_hash(row, "hash")),
        ),
    })
}

/// Like the `query_*` helpers, but a row that fails to decode is returned
/// as [`Scanned::Undecodable`]. Statement failures still abort.
fn scan_rows<T>(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
    scan: fn(&Row<'_>) -> rusqlite::Result<Scanned<T>>,
) -> Result<Vec<Scanned<T>>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, scan)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

fn limit_param(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

#[async_trait]
impl LedgerStore for SqliteStore {
    async fn insert_entry(&self, entry: &Entry) -> Result<InsertResult> {
        let entry = entry.clone();
        let payload = serde_json::to_string(&entry.payload)?;

        self.blocking(move |conn| {
            let exists: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM ledger_entries WHERE entry_id = ?1)",
                params![entry.id.0.as_slice()],
                |row| row.get(0),
            )?;
            if exists {
                return Ok(InsertResult::AlreadyExists);
            }

            conn.execute(
                "INSERT INTO ledger_entries (
                    entry_id, timestamp, event_type, payload, previous_hash, hash,
                    block_height, signer_id
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    entry.id.0.as_slice(),
                    entry.timestamp,
                    entry.event_type.to_string(),
                    payload,
                    entry.previous_hash.0.as_slice(),
                    entry.hash.0.as_slice(),
                    entry.block_height.map(|h| h as i64).unwrap_or(PENDING_HEIGHT),
                    entry.signer_id,
                ],
            )?;

            Ok(InsertResult::Inserted)
        })
        .await
    }

    async fn insert_block(&self, block: &Block) -> Result<InsertResult> {
        let block = block.clone();

        self.blocking(move |conn| {
            let existing: Option<Vec<u8>> = conn
                .query_row(
                    "SELECT block_id FROM ledger_blocks WHERE height = ?1",
                    params![block.height as i64],
                    |row| row.get(0),
                )
                .optional()?;

            if let Some(existing) = existing {
                let existing = BlockId(fixed(&existing, "block_id")?);
                if existing == block.id {
                    return Ok(InsertResult::AlreadyExists);
                }
                return Err(StoreError::Conflict {
                    height: block.height,
                    existing,
                });
            }

            conn.execute(
                "INSERT INTO ledger_blocks (
                    block_id, height, timestamp, previous_block_hash, aggregate_digest,
                    hash, signature, signer_id, entry_count
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    block.id.0.as_slice(),
                    block.height as i64,
                    block.timestamp,
                    block.previous_block_hash.0.as_slice(),
                    block.aggregate_digest.0.as_slice(),
                    block.hash.0.as_slice(),
                    block.signature.0.as_slice(),
                    block.signer_id,
                    block.entry_count as i64,
                ],
            )?;

            Ok(InsertResult::Inserted)
        })
        .await
    }

    async fn update_entry_height(&self, id: &EntryId, height: u64) -> Result<()> {
        let id = *id;

        self.blocking(move |conn| {
            let current: Option<i64> = conn
                .query_row(
                    "SELECT block_height FROM ledger_entries WHERE entry_id = ?1",
                    params![id.0.as_slice()],
                    |row| row.get(0),
                )
                .optional()?;

            match current {
                None => Err(StoreError::NotFound(format!("entry {}", id))),
                Some(PENDING_HEIGHT) => {
                    conn.execute(
                        "UPDATE ledger_entries SET block_height = ?1 WHERE entry_id = ?2",
                        params![height as i64, id.0.as_slice()],
                    )?;
                    Ok(())
                }
                Some(existing) if existing == height as i64 => Ok(()),
                Some(existing) => Err(StoreError::HeightConflict {
                    entry: id,
                    existing: existing as u64,
                    requested: height,
                }),
            }
        })
        .await
    }

    async fn blocks_by_height(&self, start: u64, limit: usize) -> Result<Vec<Block>> {
        self.blocking(move |conn| {
            query_blocks(
                conn,
                &format!(
                    "SELECT {} FROM ledger_blocks WHERE height >= ?1 ORDER BY height LIMIT ?2",
                    BLOCK_COLUMNS
                ),
                params![start as i64, limit_param(limit)],
            )
        })
        .await
    }

    async fn latest_block(&self) -> Result<Option<Block>> {
        self.blocking(|conn| {
            let blocks = query_blocks(
                conn,
                &format!(
                    "SELECT {} FROM ledger_blocks ORDER BY height DESC LIMIT 1",
                    BLOCK_COLUMNS
                ),
                [],
            )?;
            Ok(blocks.into_iter().next())
        })
        .await
    }

    async fn get_block(&self, id: &BlockId) -> Result<Option<Block>> {
        let id = *id;

        self.blocking(move |conn| {
            let blocks = query_blocks(
                conn,
                &format!("SELECT {} FROM ledger_blocks WHERE block_id = ?1", BLOCK_COLUMNS),
                params![id.0.as_slice()],
            )?;
            Ok(blocks.into_iter().next())
        })
        .await
    }

    async fn block_count(&self) -> Result<u64> {
        self.blocking(|conn| {
            let count: i64 =
                conn.query_row("SELECT COUNT(*) FROM ledger_blocks", [], |row| row.get(0))?;
            Ok(count as u64)
        })
        .await
    }

    async fn entries_at_height(&self, height: u64) -> Result<Vec<Entry>> {
        self.blocking(move |conn| {
            query_entries(
                conn,
                &format!(
                    "SELECT {} FROM ledger_entries WHERE block_height = ?1 ORDER BY seq",
                    ENTRY_COLUMNS
                ),
                params![height as i64],
            )
        })
        .await
    }

    async fn get_entry(&self, id: &EntryId) -> Result<Option<Entry>> {
        let id = *id;

        self.blocking(move |conn| {
            let entries = query_entries(
                conn,
                &format!("SELECT {} FROM ledger_entries WHERE entry_id = ?1", ENTRY_COLUMNS),
                params![id.0.as_slice()],
            )?;
            Ok(entries.into_iter().next())
        })
        .await
    }

    async fn entries_by_event_type(
        &self,
        event_type: &EventType,
        limit: usize,
    ) -> Result<Vec<Entry>> {
        let name = event_type.to_string();

        self.blocking(move |conn| {
            query_entries(
                conn,
                &format!(
                    "SELECT {} FROM ledger_entries WHERE event_type = ?1
                     ORDER BY timestamp DESC, seq DESC LIMIT ?2",
                    ENTRY_COLUMNS
                ),
                params![name, limit_param(limit)],
            )
        })
        .await
    }

    async fn pending_entries(&self) -> Result<Vec<Entry>> {
        self.blocking(|conn| {
            query_entries(
                conn,
                &format!(
                    "SELECT {} FROM ledger_entries WHERE block_height = ?1 ORDER BY seq",
                    ENTRY_COLUMNS
                ),
                params![PENDING_HEIGHT],
            )
        })
        .await
    }

    async fn latest_entry(&self) -> Result<Option<Entry>> {
        self.blocking(|conn| {
            let entries = query_entries(
                conn,
                &format!(
                    "SELECT {} FROM ledger_entries ORDER BY seq DESC LIMIT 1",
                    ENTRY_COLUMNS
                ),
                [],
            )?;
            Ok(entries.into_iter().next())
        })
        .await
    }

    async fn entry_count(&self) -> Result<u64> {
        self.blocking(|conn| {
            let count: i64 =
                conn.query_row("SELECT COUNT(*) FROM ledger_entries", [], |row| row.get(0))?;
            Ok(count as u64)
        })
        .await
    }

    async fn scan_blocks_by_height(&self, start: u64, limit: usize) -> Result<Vec<Scanned<Block>>> {
        self.blocking(move |conn| {
            scan_rows(
                conn,
                &format!(
                    "SELECT {} FROM ledger_blocks WHERE height >= ?1 ORDER BY height LIMIT ?2",
                    BLOCK_COLUMNS
                ),
                params![start as i64, limit_param(limit)],
                scan_block,
            )
        })
        .await
    }

    async fn scan_entries_at_height(&self, height: u64) -> Result<Vec<Scanned<Entry>>> {
        self.blocking(move |conn| {
            scan_rows(
                conn,
                &format!(
                    "SELECT {} FROM ledger_entries WHERE block_height = ?1 ORDER BY seq",
                    ENTRY_COLUMNS
                ),
                params![height as i64],
                scan_entry,
            )
        })
        .await
    }

    async fn scan_pending_entries(&self) -> Result<Vec<Scanned<Entry>>> {
        self.blocking(|conn| {
            scan_rows(
                conn,
                &format!(
                    "SELECT {} FROM ledger_entries WHERE block_height = ?1 ORDER BY seq",
                    ENTRY_COLUMNS
                ),
                params![PENDING_HEIGHT],
                scan_entry,
            )
        })
        .await
    }
}
