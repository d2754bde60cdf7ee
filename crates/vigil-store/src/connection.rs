//! Connection pool construction.
//!
//! Every connection gets the same pragma set on checkout: WAL journaling for
//! concurrent readers, `synchronous=FULL` so a committed write survives power
//! loss, foreign keys on, and a busy timeout as the first line of defence
//! before the store-level retry loop kicks in.

use std::path::Path;

use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;

use crate::errors::{Result, StoreError};

/// r2d2 pool over rusqlite connections.
pub type ConnectionPool = r2d2::Pool<SqliteConnectionManager>;
/// A checked-out pooled connection.
pub type PooledConnection = r2d2::PooledConnection<SqliteConnectionManager>;

/// Pool sizing and contention knobs.
#[derive(Clone, Copy, Debug)]
pub struct ConnectionConfig {
    /// Maximum pooled connections.
    pub max_size: u32,
    /// Per-connection busy timeout in milliseconds.
    pub busy_timeout_ms: u32,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            max_size: 8,
            busy_timeout_ms: 5_000,
        }
    }
}

fn init_pragmas(busy_timeout_ms: u32) -> impl Fn(&mut Connection) -> rusqlite::Result<()> {
    move |conn: &mut Connection| {
        conn.execute_batch(&format!(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = FULL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = {busy_timeout_ms};"
        ))
    }
}

/// Open (or create) a pool over a database file.
pub fn new_file(path: &Path, config: &ConnectionConfig) -> Result<ConnectionPool> {
    let manager =
        SqliteConnectionManager::file(path).with_init(init_pragmas(config.busy_timeout_ms));
    let pool = r2d2::Pool::builder()
        .max_size(config.max_size)
        .build(manager)?;
    Ok(pool)
}

/// Open an in-memory pool (tests).
///
/// Capped at one connection — each in-memory connection is otherwise its own
/// database.
pub fn new_in_memory(config: &ConnectionConfig) -> Result<ConnectionPool> {
    let manager = SqliteConnectionManager::memory().with_init(init_pragmas(config.busy_timeout_ms));
    let pool = r2d2::Pool::builder().max_size(1).build(manager)?;
    Ok(pool)
}

/// Run `PRAGMA integrity_check` and error with [`StoreError::Corrupt`]
/// unless the database reports `ok`.
pub fn check_integrity(conn: &Connection) -> Result<()> {
    let verdict: String = conn.query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
    if verdict == "ok" {
        Ok(())
    } else {
        Err(StoreError::Corrupt(verdict))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
