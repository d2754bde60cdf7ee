//! Cooldown-action repository — the counting side of the cooldown engine.
//!
//! The JSON state file is authoritative for the dashboard view; this table is
//! authoritative for window counting. Counting only considers successful
//! actions, and respects the per-service streak reset marker by excluding
//! rows older than it.

use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::errors::Result;
use crate::row_types::{CooldownActionRow, CooldownSummaryRow};

/// Options for recording an action.
pub struct InsertActionOptions<'a> {
    /// Target service.
    pub service: &'a str,
    /// Action class string.
    pub action: &'a str,
    /// Whether the agent reported success.
    pub success: bool,
    /// Tier at the time of action.
    pub tier: u8,
    /// Session performing the action.
    pub session_id: Option<i64>,
}

fn map_row(row: &Row<'_>) -> rusqlite::Result<CooldownActionRow> {
    Ok(CooldownActionRow {
        id: row.get(0)?,
        service: row.get(1)?,
        action: row.get(2)?,
        timestamp: row.get(3)?,
        success: row.get(4)?,
        tier: row.get::<_, i64>(5)? as u8,
        session_id: row.get(6)?,
    })
}

/// Cooldown-action repository — stateless, every method takes `&Connection`.
pub struct CooldownRepo;

impl CooldownRepo {
    /// Append an action row. Read-only after insert.
    pub fn insert(conn: &Connection, opts: &InsertActionOptions<'_>) -> Result<CooldownActionRow> {
        let now = chrono::Utc::now().to_rfc3339();
        let _ = conn.execute(
            "INSERT INTO cooldown_actions (service, action, timestamp, success, tier, session_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                opts.service,
                opts.action,
                now,
                opts.success,
                opts.tier,
                opts.session_id
            ],
        )?;
        Ok(CooldownActionRow {
            id: conn.last_insert_rowid(),
            service: opts.service.to_string(),
            action: opts.action.to_string(),
            timestamp: now,
            success: opts.success,
            tier: opts.tier,
            session_id: opts.session_id,
        })
    }

    /// Count successful actions for (service, action) with
    /// `timestamp > max(window_start, floor)`. `floor` is the streak reset
    /// marker — rows older than it are absolved.
    pub fn count_in_window(
        conn: &Connection,
        service: &str,
        action: &str,
        window_start: &str,
        floor: Option<&str>,
    ) -> Result<i64> {
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM cooldown_actions
             WHERE service = ?1 AND action = ?2 AND success = 1
               AND timestamp > ?3
               AND (?4 IS NULL OR timestamp > ?4)",
            params![service, action, window_start, floor],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Oldest counted action inside the window — its timestamp plus the
    /// window length is when the service becomes eligible again.
    pub fn oldest_in_window(
        conn: &Connection,
        service: &str,
        action: &str,
        window_start: &str,
        floor: Option<&str>,
    ) -> Result<Option<String>> {
        let ts = conn
            .query_row(
                "SELECT MIN(timestamp) FROM cooldown_actions
                 WHERE service = ?1 AND action = ?2 AND success = 1
                   AND timestamp > ?3
                   AND (?4 IS NULL OR timestamp > ?4)",
                params![service, action, window_start, floor],
                |row| row.get::<_, Option<String>>(0),
            )
            .optional()?
            .flatten();
        Ok(ts)
    }

    /// Per-(service, action) activity since `since`, for the dashboard.
    pub fn summary_since(conn: &Connection, since: &str) -> Result<Vec<CooldownSummaryRow>> {
        let mut stmt = conn.prepare(
            "SELECT service, action, COUNT(*), MAX(timestamp) FROM cooldown_actions
             WHERE timestamp > ?1
             GROUP BY service, action
             ORDER BY service ASC, action ASC",
        )?;
        let rows = stmt
            .query_map(params![since], |row| {
                Ok(CooldownSummaryRow {
                    service: row.get(0)?,
                    action: row.get(1)?,
                    count: row.get(2)?,
                    last_at: row.get(3)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Most recent actions, newest first.
    pub fn list_recent(conn: &Connection, limit: i64) -> Result<Vec<CooldownActionRow>> {
        let mut stmt = conn.prepare(
            "SELECT id, service, action, timestamp, success, tier, session_id
             FROM cooldown_actions ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt
            .query_map(params![limit], map_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
