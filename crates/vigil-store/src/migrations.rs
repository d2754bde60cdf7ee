//! Numbered schema migrations with Up/Down pairs.
//!
//! Applied in version order inside one transaction each; the applied set is
//! tracked in `schema_migrations`. Running the set twice is a no-op, so
//! startup can always call [`run_migrations`] unconditionally.

use rusqlite::Connection;
use tracing::{debug, info};

use crate::errors::{Result, StoreError};

/// One schema migration.
pub struct Migration {
    /// Monotonic version number.
    pub version: i64,
    /// Human-readable name, recorded in `schema_migrations`.
    pub name: &'static str,
    /// Forward SQL.
    pub up: &'static str,
    /// Reverse SQL.
    pub down: &'static str,
}

/// The full ordered migration set.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "create_sessions",
        up: "CREATE TABLE sessions (
                 id          INTEGER PRIMARY KEY AUTOINCREMENT,
                 tier        INTEGER NOT NULL CHECK (tier BETWEEN 1 AND 3),
                 model       TEXT    NOT NULL,
                 prompt      TEXT    NOT NULL,
                 trigger_kind TEXT   NOT NULL,
                 status      TEXT    NOT NULL,
                 started_at  TEXT    NOT NULL,
                 ended_at    TEXT,
                 exit_code   INTEGER,
                 log_path    TEXT,
                 response    TEXT,
                 cost_usd    REAL,
                 turns       INTEGER,
                 duration_ms INTEGER,
                 parent_id   INTEGER REFERENCES sessions(id)
             );
             CREATE INDEX idx_sessions_status ON sessions(status);
             CREATE INDEX idx_sessions_parent ON sessions(parent_id);
             CREATE UNIQUE INDEX idx_sessions_single_running
                 ON sessions(status) WHERE status = 'running';",
        down: "DROP TABLE sessions;",
    },
    Migration {
        version: 2,
        name: "create_events",
        up: "CREATE TABLE events (
                 id         INTEGER PRIMARY KEY AUTOINCREMENT,
                 session_id INTEGER REFERENCES sessions(id),
                 level      TEXT    NOT NULL,
                 service    TEXT,
                 message    TEXT    NOT NULL,
                 created_at TEXT    NOT NULL
             );
             CREATE INDEX idx_events_level ON events(level);
             CREATE INDEX idx_events_service ON events(service);
             CREATE INDEX idx_events_created ON events(created_at DESC);",
        down: "DROP TABLE events;",
    },
    Migration {
        version: 3,
        name: "create_memories",
        up: "CREATE TABLE memories (
                 id          INTEGER PRIMARY KEY AUTOINCREMENT,
                 service     TEXT,
                 category    TEXT    NOT NULL,
                 observation TEXT    NOT NULL,
                 confidence  REAL    NOT NULL CHECK (confidence BETWEEN 0.0 AND 1.0),
                 active      INTEGER NOT NULL DEFAULT 1,
                 created_at  TEXT    NOT NULL,
                 updated_at  TEXT    NOT NULL,
                 session_id  INTEGER REFERENCES sessions(id),
                 tier        INTEGER NOT NULL
             );
             CREATE UNIQUE INDEX idx_memories_active_pair
                 ON memories(COALESCE(service, ''), category) WHERE active = 1;
             CREATE INDEX idx_memories_confidence ON memories(confidence DESC);",
        down: "DROP TABLE memories;",
    },
    Migration {
        version: 4,
        name: "create_cooldown_actions",
        up: "CREATE TABLE cooldown_actions (
                 id         INTEGER PRIMARY KEY AUTOINCREMENT,
                 service    TEXT    NOT NULL,
                 action     TEXT    NOT NULL,
                 timestamp  TEXT    NOT NULL,
                 success    INTEGER NOT NULL,
                 tier       INTEGER NOT NULL,
                 session_id INTEGER REFERENCES sessions(id)
             );
             CREATE INDEX idx_cooldown_service_action
                 ON cooldown_actions(service, action, timestamp);",
        down: "DROP TABLE cooldown_actions;",
    },
    Migration {
        version: 5,
        name: "create_health_streaks",
        up: "CREATE TABLE health_streaks (
                 service             TEXT PRIMARY KEY,
                 consecutive_healthy INTEGER NOT NULL DEFAULT 0,
                 last_checked        TEXT NOT NULL,
                 reset_at            TEXT
             );",
        down: "DROP TABLE health_streaks;",
    },
    Migration {
        version: 6,
        name: "create_config",
        up: "CREATE TABLE config (
                 key        TEXT PRIMARY KEY,
                 value      TEXT NOT NULL,
                 updated_at TEXT NOT NULL
             );",
        down: "DROP TABLE config;",
    },
    Migration {
        version: 7,
        name: "add_session_summary",
        up: "ALTER TABLE sessions ADD COLUMN summary TEXT;",
        down: "ALTER TABLE sessions DROP COLUMN summary;",
    },
];

fn ensure_tracking_table(conn: &Connection) -> Result<()> {
    let _ = conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
             version    INTEGER PRIMARY KEY,
             name       TEXT NOT NULL,
             applied_at TEXT NOT NULL
         )",
        [],
    )?;
    Ok(())
}

/// Current schema version (0 when no migration has been applied).
pub fn current_version(conn: &Connection) -> Result<i64> {
    ensure_tracking_table(conn)?;
    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )?;
    Ok(version)
}

/// Apply all pending migrations in order. Returns how many were applied.
pub fn run_migrations(conn: &Connection) -> Result<usize> {
    ensure_tracking_table(conn)?;
    let current = current_version(conn)?;
    let mut applied = 0usize;

    for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
        let tx = conn.unchecked_transaction()?;
        tx.execute_batch(migration.up)
            .map_err(|e| StoreError::Migration {
                version: migration.version,
                message: e.to_string(),
            })?;
        let _ = tx.execute(
            "INSERT INTO schema_migrations (version, name, applied_at) VALUES (?1, ?2, ?3)",
            rusqlite::params![
                migration.version,
                migration.name,
                chrono::Utc::now().to_rfc3339()
            ],
        )?;
        tx.commit()?;
        debug!(version = migration.version, name = migration.name, "migration applied");
        applied += 1;
    }

    if applied > 0 {
        info!(applied, version = current_version(conn)?, "schema migrated");
    }
    Ok(applied)
}

/// Roll back the most recently applied migration. Returns its version,
/// or `None` when the schema is already empty.
pub fn rollback_last(conn: &Connection) -> Result<Option<i64>> {
    let current = current_version(conn)?;
    if current == 0 {
        return Ok(None);
    }
    let migration = MIGRATIONS
        .iter()
        .find(|m| m.version == current)
        .ok_or_else(|| StoreError::Migration {
            version: current,
            message: "applied version unknown to this binary".into(),
        })?;

    let tx = conn.unchecked_transaction()?;
    tx.execute_batch(migration.down)
        .map_err(|e| StoreError::Migration {
            version: migration.version,
            message: e.to_string(),
        })?;
    let _ = tx.execute(
        "DELETE FROM schema_migrations WHERE version = ?1",
        [migration.version],
    )?;
    tx.commit()?;
    info!(version = current, "migration rolled back");
    Ok(Some(current))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
