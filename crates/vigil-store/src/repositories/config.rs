//! Config repository — the persisted key/value layer of the settings stack.

use rusqlite::{Connection, OptionalExtension, params};

use crate::errors::Result;
use crate::row_types::ConfigRow;

/// Config repository — stateless, every method takes `&Connection`.
pub struct ConfigRepo;

impl ConfigRepo {
    /// Get a value by key.
    pub fn get(conn: &Connection, key: &str) -> Result<Option<String>> {
        let value = conn
            .query_row(
                "SELECT value FROM config WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    /// Upsert a key with a fresh `updated_at`.
    pub fn set(conn: &Connection, key: &str, value: &str) -> Result<()> {
        let now = chrono::Utc::now().to_rfc3339();
        let _ = conn.execute(
            "INSERT INTO config (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = ?2, updated_at = ?3",
            params![key, value, now],
        )?;
        Ok(())
    }

    /// All entries, alphabetical by key.
    pub fn all(conn: &Connection) -> Result<Vec<ConfigRow>> {
        let mut stmt =
            conn.prepare("SELECT key, value, updated_at FROM config ORDER BY key ASC")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(ConfigRow {
                    key: row.get(0)?,
                    value: row.get(1)?,
                    updated_at: row.get(2)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(unused_results)]
mod tests {
    use super::*;
    use crate::connection::{ConnectionConfig, new_in_memory};
    use crate::migrations::run_migrations;

    fn setup() -> crate::connection::ConnectionPool {
        let pool = new_in_memory(&ConnectionConfig::default()).unwrap();
        {
            let conn = pool.get().unwrap();
            run_migrations(&conn).unwrap();
        }
        pool
    }

    #[test]
    fn get_missing_is_none() {
        let pool = setup();
        let conn = pool.get().unwrap();
        assert!(ConfigRepo::get(&conn, "interval").unwrap().is_none());
    }

    #[test]
    fn set_then_get() {
        let pool = setup();
        let conn = pool.get().unwrap();
        ConfigRepo::set(&conn, "interval", "1800").unwrap();
        assert_eq!(
            ConfigRepo::get(&conn, "interval").unwrap().as_deref(),
            Some("1800")
        );
    }

    #[test]
    fn set_overwrites() {
        let pool = setup();
        let conn = pool.get().unwrap();
        ConfigRepo::set(&conn, "interval", "1800").unwrap();
        ConfigRepo::set(&conn, "interval", "3600").unwrap();
        assert_eq!(
            ConfigRepo::get(&conn, "interval").unwrap().as_deref(),
            Some("3600")
        );
        assert_eq!(ConfigRepo::all(&conn).unwrap().len(), 1);
    }

    #[test]
    fn all_alphabetical() {
        let pool = setup();
        let conn = pool.get().unwrap();
        ConfigRepo::set(&conn, "max_tier", "3").unwrap();
        ConfigRepo::set(&conn, "dry_run", "true").unwrap();
        let rows = ConfigRepo::all(&conn).unwrap();
        assert_eq!(rows[0].key, "dry_run");
        assert_eq!(rows[1].key, "max_tier");
    }
}
