//! Event repository — insert-only log of `[EVENT:…]` markers.

use rusqlite::{Connection, Row, params};

use crate::errors::Result;
use crate::row_types::EventRow;

/// Options for inserting an event.
pub struct InsertEventOptions<'a> {
    /// Session that produced the event.
    pub session_id: Option<i64>,
    /// Severity string.
    pub level: &'a str,
    /// Implicated service.
    pub service: Option<&'a str>,
    /// Message text.
    pub message: &'a str,
}

/// Filters for listing events.
#[derive(Default)]
pub struct ListEventsOptions<'a> {
    /// Restrict to one severity.
    pub level: Option<&'a str>,
    /// Restrict to one service.
    pub service: Option<&'a str>,
    /// Page size (default 100).
    pub limit: Option<i64>,
    /// Page offset.
    pub offset: Option<i64>,
}

fn map_row(row: &Row<'_>) -> rusqlite::Result<EventRow> {
    Ok(EventRow {
        id: row.get(0)?,
        session_id: row.get(1)?,
        level: row.get(2)?,
        service: row.get(3)?,
        message: row.get(4)?,
        created_at: row.get(5)?,
    })
}

/// Event repository — stateless, every method takes `&Connection`.
pub struct EventRepo;

impl EventRepo {
    /// Append an event. Events are immutable after insert.
    pub fn insert(conn: &Connection, opts: &InsertEventOptions<'_>) -> Result<EventRow> {
        let now = chrono::Utc::now().to_rfc3339();
        let _ = conn.execute(
            "INSERT INTO events (session_id, level, service, message, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![opts.session_id, opts.level, opts.service, opts.message, now],
        )?;
        Ok(EventRow {
            id: conn.last_insert_rowid(),
            session_id: opts.session_id,
            level: opts.level.to_string(),
            service: opts.service.map(String::from),
            message: opts.message.to_string(),
            created_at: now,
        })
    }

    /// List events, newest first, with optional level/service filters.
    pub fn list(conn: &Connection, opts: &ListEventsOptions<'_>) -> Result<Vec<EventRow>> {
        let limit = opts.limit.unwrap_or(100);
        let offset = opts.offset.unwrap_or(0);
        let mut stmt = conn.prepare(
            "SELECT id, session_id, level, service, message, created_at FROM events
             WHERE (?1 IS NULL OR level = ?1)
               AND (?2 IS NULL OR service = ?2)
             ORDER BY id DESC LIMIT ?3 OFFSET ?4",
        )?;
        let rows = stmt
            .query_map(params![opts.level, opts.service, limit, offset], map_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Events for one session, oldest first (display order).
    pub fn for_session(conn: &Connection, session_id: i64) -> Result<Vec<EventRow>> {
        let mut stmt = conn.prepare(
            "SELECT id, session_id, level, service, message, created_at FROM events
             WHERE session_id = ?1 ORDER BY id ASC",
        )?;
        let rows = stmt
            .query_map(params![session_id], map_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Total event count.
    pub fn count(conn: &Connection) -> Result<i64> {
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))?;
        Ok(count)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
