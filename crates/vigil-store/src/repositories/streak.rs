//! Health-streak repository — consecutive-healthy counters per service.
//!
//! Two consecutive healthy observations stamp `reset_at`, the marker the
//! cooldown counter uses to absolve older action rows. An unhealthy
//! observation zeroes the count but leaves `reset_at` in place — absolution
//! already granted is never revoked.

use rusqlite::{Connection, OptionalExtension, params};

use crate::errors::Result;
use crate::row_types::HealthStreakRow;

/// Streak count at which cooldown counters reset.
pub const RESET_THRESHOLD: i64 = 2;

/// Health-streak repository — stateless, every method takes `&Connection`.
pub struct StreakRepo;

impl StreakRepo {
    /// Fetch the streak row for a service.
    pub fn get(conn: &Connection, service: &str) -> Result<Option<HealthStreakRow>> {
        let row = conn
            .query_row(
                "SELECT service, consecutive_healthy, last_checked, reset_at
                 FROM health_streaks WHERE service = ?1",
                params![service],
                |row| {
                    Ok(HealthStreakRow {
                        service: row.get(0)?,
                        consecutive_healthy: row.get(1)?,
                        last_checked: row.get(2)?,
                        reset_at: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    /// Record a healthy observation. Returns the new streak count; stamps
    /// `reset_at` the moment the streak reaches [`RESET_THRESHOLD`].
    pub fn record_healthy(conn: &Connection, service: &str) -> Result<i64> {
        let now = chrono::Utc::now().to_rfc3339();
        let _ = conn.execute(
            "INSERT INTO health_streaks (service, consecutive_healthy, last_checked)
             VALUES (?1, 1, ?2)
             ON CONFLICT(service) DO UPDATE SET
                 consecutive_healthy = consecutive_healthy + 1,
                 last_checked = ?2",
            params![service, now],
        )?;
        let count: i64 = conn.query_row(
            "SELECT consecutive_healthy FROM health_streaks WHERE service = ?1",
            params![service],
            |row| row.get(0),
        )?;
        if count == RESET_THRESHOLD {
            let _ = conn.execute(
                "UPDATE health_streaks SET reset_at = ?1 WHERE service = ?2",
                params![now, service],
            )?;
        }
        Ok(count)
    }

    /// Record an unhealthy observation: zero the count, keep `reset_at`.
    pub fn record_unhealthy(conn: &Connection, service: &str) -> Result<()> {
        let now = chrono::Utc::now().to_rfc3339();
        let _ = conn.execute(
            "INSERT INTO health_streaks (service, consecutive_healthy, last_checked)
             VALUES (?1, 0, ?2)
             ON CONFLICT(service) DO UPDATE SET
                 consecutive_healthy = 0,
                 last_checked = ?2",
            params![service, now],
        )?;
        Ok(())
    }

    /// The reset marker for a service, if its streak ever reached the
    /// threshold.
    pub fn reset_marker(conn: &Connection, service: &str) -> Result<Option<String>> {
        Ok(Self::get(conn, service)?.and_then(|s| s.reset_at))
    }

    /// All streaks, alphabetical.
    pub fn list(conn: &Connection) -> Result<Vec<HealthStreakRow>> {
        let mut stmt = conn.prepare(
            "SELECT service, consecutive_healthy, last_checked, reset_at
             FROM health_streaks ORDER BY service ASC",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(HealthStreakRow {
                    service: row.get(0)?,
                    consecutive_healthy: row.get(1)?,
                    last_checked: row.get(2)?,
                    reset_at: row.get(3)?,
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
    fn first_healthy_creates_row() {
        let pool = setup();
        let conn = pool.get().unwrap();
        assert_eq!(StreakRepo::record_healthy(&conn, "svc").unwrap(), 1);
        let row = StreakRepo::get(&conn, "svc").unwrap().unwrap();
        assert_eq!(row.consecutive_healthy, 1);
        assert!(row.reset_at.is_none());
    }

    #[test]
    fn second_healthy_stamps_reset_marker() {
        let pool = setup();
        let conn = pool.get().unwrap();
        StreakRepo::record_healthy(&conn, "svc").unwrap();
        assert_eq!(StreakRepo::record_healthy(&conn, "svc").unwrap(), 2);

        let marker = StreakRepo::reset_marker(&conn, "svc").unwrap();
        assert!(marker.is_some());
    }

    #[test]
    fn third_healthy_keeps_original_marker() {
        let pool = setup();
        let conn = pool.get().unwrap();
        StreakRepo::record_healthy(&conn, "svc").unwrap();
        StreakRepo::record_healthy(&conn, "svc").unwrap();
        let marker = StreakRepo::reset_marker(&conn, "svc").unwrap();

        std::thread::sleep(std::time::Duration::from_millis(10));
        assert_eq!(StreakRepo::record_healthy(&conn, "svc").unwrap(), 3);
        assert_eq!(StreakRepo::reset_marker(&conn, "svc").unwrap(), marker);
    }

    #[test]
    fn unhealthy_zeroes_count_keeps_marker() {
        let pool = setup();
        let conn = pool.get().unwrap();
        StreakRepo::record_healthy(&conn, "svc").unwrap();
        StreakRepo::record_healthy(&conn, "svc").unwrap();
        let marker = StreakRepo::reset_marker(&conn, "svc").unwrap();
        assert!(marker.is_some());

        StreakRepo::record_unhealthy(&conn, "svc").unwrap();
        let row = StreakRepo::get(&conn, "svc").unwrap().unwrap();
        assert_eq!(row.consecutive_healthy, 0);
        assert_eq!(row.reset_at, marker);
    }

    #[test]
    fn streak_rebuilds_after_reset() {
        let pool = setup();
        let conn = pool.get().unwrap();
        StreakRepo::record_healthy(&conn, "svc").unwrap();
        StreakRepo::record_unhealthy(&conn, "svc").unwrap();
        assert_eq!(StreakRepo::record_healthy(&conn, "svc").unwrap(), 1);
        assert_eq!(StreakRepo::record_healthy(&conn, "svc").unwrap(), 2);
    }

    #[test]
    fn unknown_service_has_no_marker() {
        let pool = setup();
        let conn = pool.get().unwrap();
        assert!(StreakRepo::reset_marker(&conn, "ghost").unwrap().is_none());
    }

    #[test]
    fn list_alphabetical() {
        let pool = setup();
        let conn = pool.get().unwrap();
        StreakRepo::record_healthy(&conn, "zeta").unwrap();
        StreakRepo::record_healthy(&conn, "alpha").unwrap();
        let rows = StreakRepo::list(&conn).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].service, "alpha");
    }
}
