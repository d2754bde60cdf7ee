//! Store error taxonomy.

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors surfaced by the persistent store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying SQLite failure.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Connection pool exhausted or broken.
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// A migration failed to apply or roll back.
    #[error("migration {version} failed: {message}")]
    Migration {
        /// Version of the failing migration.
        version: i64,
        /// What went wrong.
        message: String,
    },

    /// The database failed its integrity check. Callers treat this as
    /// unrecoverable (supervisor exit code 2).
    #[error("database integrity check failed: {0}")]
    Corrupt(String),

    /// A row the caller required does not exist.
    #[error("{entity} {id} not found")]
    NotFound {
        /// Entity kind, e.g. `"session"`.
        entity: &'static str,
        /// Identifier that missed.
        id: i64,
    },

    /// Invariant violation or poisoned lock.
    #[error("internal store error: {0}")]
    Internal(String),
}

impl StoreError {
    /// True when the error is a transient `SQLITE_BUSY`/`SQLITE_LOCKED`
    /// contention failure worth retrying.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        match self {
            StoreError::Sqlite(rusqlite::Error::SqliteFailure(code, _)) => matches!(
                code.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
