//! Database schema migrations for SQLite.
//!
//! We use a simple versioned migration system. Each migration is a SQL string
//! that transforms the schema from version N to N+1.

use audit_chain_core::now_millis;
use rusqlite::Connection;

use crate::error::{Result, StoreError};

/// Current schema version.
pub const CURRENT_VERSION: u32 = 1;

/// Initialize or migrate the database schema.
///
/// This function is idempotent - it can be called multiple times safely.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let current: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )?;

    if current > CURRENT_VERSION {
        return Err(StoreError::Migration(format!(
            "database schema version {} is newer than supported version {}",
            current, CURRENT_VERSION
        )));
    }

    if current < CURRENT_VERSION {
        let tx = conn.transaction()?;

        for version in (current + 1)..=CURRENT_VERSION {
            apply_migration(&tx, version)?;

            tx.execute(
                "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
                rusqlite::params![version, now_millis()],
            )?;
        }

        tx.commit()?;
        tracing::debug!(from = current, to = CURRENT_VERSION, "schema migrated");
    }

    Ok(())
}

/// Apply a specific migration version.
fn apply_migration(conn: &Connection, version: u32) -> Result<()> {
    match version {
        1 => apply_v1(conn),
        _ => Err(StoreError::Migration(format!(
            "unknown migration version: {}",
            version
        ))),
    }
}

/// Migration v1: Initial schema.
fn apply_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Entries: every recorded event, in persisted (chain) order
        CREATE TABLE ledger_entries (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            entry_id BLOB NOT NULL UNIQUE,     -- 16 bytes
            timestamp INTEGER NOT NULL,        -- creation time (Unix ms)
            event_type TEXT NOT NULL,          -- canonical dotted name
            payload TEXT NOT NULL,             -- JSON
            previous_hash BLOB NOT NULL,       -- 32 bytes
            hash BLOB NOT NULL,                -- 32 bytes
            block_height INTEGER NOT NULL DEFAULT -1,  -- -1 while pending
            signer_id TEXT NOT NULL
        );

        -- Blocks: one row per height
        CREATE TABLE ledger_blocks (
            height INTEGER PRIMARY KEY,
            block_id BLOB NOT NULL UNIQUE,     -- 16 bytes
            timestamp INTEGER NOT NULL,
            previous_block_hash BLOB NOT NULL, -- 32 bytes
            aggregate_digest BLOB NOT NULL,    -- 32 bytes
            hash BLOB NOT NULL,                -- 32 bytes
            signature BLOB NOT NULL,           -- 64 bytes, Ed25519
            signer_id TEXT NOT NULL,
            entry_count INTEGER NOT NULL
        );

        CREATE INDEX idx_entries_height ON ledger_entries(block_height, seq);
        CREATE INDEX idx_entries_event_type ON ledger_entries(event_type, timestamp);
        "#,
    )?;

    Ok(())
}
