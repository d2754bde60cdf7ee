//! Memory repository — persistence for the agent memory engine.
//!
//! The reinforce-or-insert branch lives in the store facade so it can run in
//! one transaction; this repository supplies the primitive queries.

use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::errors::{Result, StoreError};
use crate::row_types::MemoryRow;

/// Options for inserting a new memory.
pub struct InsertMemoryOptions<'a> {
    /// Service (`None` = general).
    pub service: Option<&'a str>,
    /// Category string.
    pub category: &'a str,
    /// Observation text.
    pub observation: &'a str,
    /// Initial confidence.
    pub confidence: f64,
    /// Creating session.
    pub session_id: Option<i64>,
    /// Tier at creation.
    pub tier: u8,
}

/// Field updates for operator CRUD. `None` leaves a field unchanged.
#[derive(Default)]
pub struct UpdateMemoryOptions<'a> {
    /// New observation text.
    pub observation: Option<&'a str>,
    /// New confidence (clamped by the caller).
    pub confidence: Option<f64>,
    /// New active flag.
    pub active: Option<bool>,
}

fn map_row(row: &Row<'_>) -> rusqlite::Result<MemoryRow> {
    Ok(MemoryRow {
        id: row.get(0)?,
        service: row.get(1)?,
        category: row.get(2)?,
        observation: row.get(3)?,
        confidence: row.get(4)?,
        active: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
        session_id: row.get(8)?,
        tier: row.get::<_, i64>(9)? as u8,
    })
}

const COLUMNS: &str = "id, service, category, observation, confidence, active, created_at,
     updated_at, session_id, tier";

/// Memory repository — stateless, every method takes `&Connection`.
pub struct MemoryRepo;

impl MemoryRepo {
    /// Insert a new active memory.
    pub fn insert(conn: &Connection, opts: &InsertMemoryOptions<'_>) -> Result<MemoryRow> {
        let now = chrono::Utc::now().to_rfc3339();
        let _ = conn.execute(
            "INSERT INTO memories (service, category, observation, confidence, active,
                                   created_at, updated_at, session_id, tier)
             VALUES (?1, ?2, ?3, ?4, 1, ?5, ?5, ?6, ?7)",
            params![
                opts.service,
                opts.category,
                opts.observation,
                opts.confidence,
                now,
                opts.session_id,
                opts.tier
            ],
        )?;
        let id = conn.last_insert_rowid();
        Self::get(conn, id)?.ok_or(StoreError::NotFound {
            entity: "memory",
            id,
        })
    }

    /// Fetch by id.
    pub fn get(conn: &Connection, id: i64) -> Result<Option<MemoryRow>> {
        let row = conn
            .query_row(
                &format!("SELECT {COLUMNS} FROM memories WHERE id = ?1"),
                params![id],
                map_row,
            )
            .optional()?;
        Ok(row)
    }

    /// Find the active memory for a (service, category) pair. NULL service
    /// matches NULL service only.
    pub fn find_active(
        conn: &Connection,
        service: Option<&str>,
        category: &str,
    ) -> Result<Option<MemoryRow>> {
        let row = conn
            .query_row(
                &format!(
                    "SELECT {COLUMNS} FROM memories
                     WHERE COALESCE(service, '') = COALESCE(?1, '')
                       AND category = ?2 AND active = 1"
                ),
                params![service, category],
                map_row,
            )
            .optional()?;
        Ok(row)
    }

    /// Reinforce an existing memory: bump confidence (capped at 1.0) and
    /// touch `updated_at`. Returns the new confidence.
    pub fn reinforce(conn: &Connection, id: i64, delta: f64) -> Result<f64> {
        let now = chrono::Utc::now().to_rfc3339();
        let _ = conn.execute(
            "UPDATE memories
             SET confidence = MIN(1.0, confidence + ?1), updated_at = ?2
             WHERE id = ?3",
            params![delta, now, id],
        )?;
        let confidence: f64 = conn.query_row(
            "SELECT confidence FROM memories WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )?;
        Ok(confidence)
    }

    /// List memories, most confident first. `include_inactive` widens the
    /// view for the operator dashboard.
    pub fn list(conn: &Connection, include_inactive: bool) -> Result<Vec<MemoryRow>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM memories
             WHERE (?1 OR active = 1)
             ORDER BY confidence DESC, id ASC"
        ))?;
        let rows = stmt
            .query_map(params![include_inactive], map_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Active memories at or above the confidence floor, ordered for
    /// context injection: grouped by service, most confident first.
    pub fn active_for_injection(conn: &Connection, floor: f64) -> Result<Vec<MemoryRow>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM memories
             WHERE active = 1 AND confidence >= ?1
             ORDER BY service IS NULL, service ASC, confidence DESC, id ASC"
        ))?;
        let rows = stmt
            .query_map(params![floor], map_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Active memories last updated strictly before `cutoff` (decay scan).
    pub fn active_stale(conn: &Connection, cutoff: &str) -> Result<Vec<MemoryRow>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM memories WHERE active = 1 AND updated_at < ?1"
        ))?;
        let rows = stmt
            .query_map(params![cutoff], map_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Write a decayed confidence value, deactivating in the same statement
    /// when it fell below the floor. `updated_at` is deliberately untouched:
    /// decay is driven by the last reinforcement time, not the last decay.
    pub fn apply_decay(conn: &Connection, id: i64, confidence: f64, active: bool) -> Result<bool> {
        let changed = conn.execute(
            "UPDATE memories SET confidence = ?1, active = ?2 WHERE id = ?3",
            params![confidence.clamp(0.0, 1.0), active, id],
        )?;
        Ok(changed > 0)
    }

    /// Operator field update. Touches `updated_at`.
    pub fn update(conn: &Connection, id: i64, opts: &UpdateMemoryOptions<'_>) -> Result<bool> {
        let now = chrono::Utc::now().to_rfc3339();
        let changed = conn.execute(
            "UPDATE memories SET
                 observation = COALESCE(?1, observation),
                 confidence  = COALESCE(?2, confidence),
                 active      = COALESCE(?3, active),
                 updated_at  = ?4
             WHERE id = ?5",
            params![
                opts.observation,
                opts.confidence.map(|c| c.clamp(0.0, 1.0)),
                opts.active,
                now,
                id
            ],
        )?;
        Ok(changed > 0)
    }

    /// Operator delete. Returns `true` if a row was removed.
    pub fn delete(conn: &Connection, id: i64) -> Result<bool> {
        let changed = conn.execute("DELETE FROM memories WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }

    /// Count of active memories.
    pub fn count_active(conn: &Connection) -> Result<i64> {
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM memories WHERE active = 1", [], |row| {
                row.get(0)
            })?;
        Ok(count)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
