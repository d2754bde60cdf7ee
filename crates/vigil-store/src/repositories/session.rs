//! Session repository — CRUD and chain walks over the `sessions` table.

use rusqlite::{Connection, OptionalExtension, Row, params};

use vigil_core::tier::Tier;

use crate::errors::{Result, StoreError};
use crate::row_types::SessionRow;

/// Options for creating a session row.
pub struct CreateSessionOptions<'a> {
    /// Capability tier.
    pub tier: Tier,
    /// Model name.
    pub model: &'a str,
    /// Starting prompt (path or inline).
    pub prompt: &'a str,
    /// Trigger kind string.
    pub trigger: &'a str,
    /// Escalation parent, if any.
    pub parent_id: Option<i64>,
}

/// Filters for listing sessions.
#[derive(Default)]
pub struct ListSessionsOptions<'a> {
    /// Restrict to one status.
    pub status: Option<&'a str>,
    /// Page size (default 50).
    pub limit: Option<i64>,
    /// Page offset.
    pub offset: Option<i64>,
}

fn map_row(row: &Row<'_>) -> rusqlite::Result<SessionRow> {
    Ok(SessionRow {
        id: row.get("id")?,
        tier: row.get::<_, i64>("tier")? as u8,
        model: row.get("model")?,
        prompt: row.get("prompt")?,
        trigger: row.get("trigger_kind")?,
        status: row.get("status")?,
        started_at: row.get("started_at")?,
        ended_at: row.get("ended_at")?,
        exit_code: row.get("exit_code")?,
        log_path: row.get("log_path")?,
        response: row.get("response")?,
        summary: row.get("summary")?,
        cost_usd: row.get("cost_usd")?,
        turns: row.get("turns")?,
        duration_ms: row.get("duration_ms")?,
        parent_id: row.get("parent_id")?,
    })
}

const COLUMNS: &str = "id, tier, model, prompt, trigger_kind, status, started_at, ended_at,
     exit_code, log_path, response, summary, cost_usd, turns, duration_ms, parent_id";

/// Session repository — stateless, every method takes `&Connection`.
pub struct SessionRepo;

impl SessionRepo {
    /// Insert a new session in `running` state. Fails if another session is
    /// already running (partial unique index).
    pub fn create(conn: &Connection, opts: &CreateSessionOptions<'_>) -> Result<SessionRow> {
        let now = chrono::Utc::now().to_rfc3339();
        let _ = conn.execute(
            "INSERT INTO sessions (tier, model, prompt, trigger_kind, status, started_at, parent_id)
             VALUES (?1, ?2, ?3, ?4, 'running', ?5, ?6)",
            params![
                opts.tier.as_u8(),
                opts.model,
                opts.prompt,
                opts.trigger,
                now,
                opts.parent_id
            ],
        )?;
        let id = conn.last_insert_rowid();
        Self::get(conn, id)?.ok_or(StoreError::NotFound {
            entity: "session",
            id,
        })
    }

    /// Fetch by id.
    pub fn get(conn: &Connection, id: i64) -> Result<Option<SessionRow>> {
        let row = conn
            .query_row(
                &format!("SELECT {COLUMNS} FROM sessions WHERE id = ?1"),
                params![id],
                map_row,
            )
            .optional()?;
        Ok(row)
    }

    /// Overwrite the lifecycle status.
    pub fn update_status(conn: &Connection, id: i64, status: &str) -> Result<bool> {
        let changed = conn.execute(
            "UPDATE sessions SET status = ?1 WHERE id = ?2",
            params![status, id],
        )?;
        Ok(changed > 0)
    }

    /// Terminal update: status, exit code, end time.
    pub fn finalize(conn: &Connection, id: i64, status: &str, exit_code: Option<i32>) -> Result<bool> {
        let now = chrono::Utc::now().to_rfc3339();
        let changed = conn.execute(
            "UPDATE sessions SET status = ?1, exit_code = ?2, ended_at = ?3 WHERE id = ?4",
            params![status, exit_code, now, id],
        )?;
        Ok(changed > 0)
    }

    /// Result fields from the terminal stream event.
    pub fn set_result(
        conn: &Connection,
        id: i64,
        response: Option<&str>,
        cost_usd: Option<f64>,
        turns: Option<i64>,
        duration_ms: Option<i64>,
    ) -> Result<bool> {
        let changed = conn.execute(
            "UPDATE sessions SET response = ?1, cost_usd = ?2, turns = ?3, duration_ms = ?4
             WHERE id = ?5",
            params![response, cost_usd, turns, duration_ms, id],
        )?;
        Ok(changed > 0)
    }

    /// Post-run LLM summary.
    pub fn set_summary(conn: &Connection, id: i64, summary: &str) -> Result<bool> {
        let changed = conn.execute(
            "UPDATE sessions SET summary = ?1 WHERE id = ?2",
            params![summary, id],
        )?;
        Ok(changed > 0)
    }

    /// Log file path, once known.
    pub fn set_log_path(conn: &Connection, id: i64, log_path: &str) -> Result<bool> {
        let changed = conn.execute(
            "UPDATE sessions SET log_path = ?1 WHERE id = ?2",
            params![log_path, id],
        )?;
        Ok(changed > 0)
    }

    /// List sessions, newest first.
    pub fn list(conn: &Connection, opts: &ListSessionsOptions<'_>) -> Result<Vec<SessionRow>> {
        let limit = opts.limit.unwrap_or(50);
        let offset = opts.offset.unwrap_or(0);
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM sessions
             WHERE (?1 IS NULL OR status = ?1)
             ORDER BY id DESC LIMIT ?2 OFFSET ?3"
        ))?;
        let rows = stmt
            .query_map(params![opts.status, limit, offset], map_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Direct escalation children, oldest first.
    pub fn children(conn: &Connection, id: i64) -> Result<Vec<SessionRow>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM sessions WHERE parent_id = ?1 ORDER BY id ASC"
        ))?;
        let rows = stmt
            .query_map(params![id], map_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Walk the escalation chain containing `id`: ancestors first, then the
    /// session itself, then descendants. Bounded by the tier ladder, so the
    /// walk terminates even on corrupt parent pointers.
    pub fn chain(conn: &Connection, id: i64) -> Result<Vec<SessionRow>> {
        let Some(mut root) = Self::get(conn, id)? else {
            return Ok(Vec::new());
        };

        // Ascend to the chain root (at most MAX tiers).
        for _ in 0..Tier::MAX.as_u8() {
            match root.parent_id {
                Some(parent_id) => match Self::get(conn, parent_id)? {
                    Some(parent) => root = parent,
                    None => break,
                },
                None => break,
            }
        }

        // Descend breadth-first from the root.
        let mut chain = vec![root];
        let mut cursor = 0usize;
        while cursor < chain.len() {
            let children = Self::children(conn, chain[cursor].id)?;
            chain.extend(children);
            cursor += 1;
            if chain.len() > usize::from(Tier::MAX.as_u8()) {
                break;
            }
        }
        Ok(chain)
    }

    /// Sum of `cost_usd` across the chain containing `id`.
    pub fn chain_cost(conn: &Connection, id: i64) -> Result<f64> {
        let chain = Self::chain(conn, id)?;
        Ok(chain.iter().filter_map(|s| s.cost_usd).sum())
    }

    /// Most recently started session, if any.
    pub fn latest(conn: &Connection) -> Result<Option<SessionRow>> {
        let row = conn
            .query_row(
                &format!("SELECT {COLUMNS} FROM sessions ORDER BY id DESC LIMIT 1"),
                [],
                map_row,
            )
            .optional()?;
        Ok(row)
    }

    /// The currently running session, if any.
    pub fn running(conn: &Connection) -> Result<Option<SessionRow>> {
        let row = conn
            .query_row(
                &format!("SELECT {COLUMNS} FROM sessions WHERE status = 'running' LIMIT 1"),
                [],
                map_row,
            )
            .optional()?;
        Ok(row)
    }

    /// Total session count.
    pub fn count(conn: &Connection) -> Result<i64> {
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM sessions", [], |row| row.get(0))?;
        Ok(count)
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

    fn create(conn: &Connection, tier: Tier, parent: Option<i64>) -> SessionRow {
        SessionRepo::create(
            conn,
            &CreateSessionOptions {
                tier,
                model: "claude-sonnet",
                prompt: "run checks",
                trigger: "scheduled",
                parent_id: parent,
            },
        )
        .unwrap()
    }

    #[test]
    fn create_starts_running() {
        let pool = setup();
        let conn = pool.get().unwrap();
        let session = create(&conn, Tier::One, None);
        assert_eq!(session.status, "running");
        assert_eq!(session.tier, 1);
        assert!(session.ended_at.is_none());
    }

    #[test]
    fn second_running_session_rejected() {
        let pool = setup();
        let conn = pool.get().unwrap();
        let _first = create(&conn, Tier::One, None);
        let second = SessionRepo::create(
            &conn,
            &CreateSessionOptions {
                tier: Tier::One,
                model: "m",
                prompt: "p",
                trigger: "manual",
                parent_id: None,
            },
        );
        assert!(second.is_err());
    }

    #[test]
    fn finalize_sets_terminal_fields() {
        let pool = setup();
        let conn = pool.get().unwrap();
        let session = create(&conn, Tier::One, None);
        assert!(SessionRepo::finalize(&conn, session.id, "completed", Some(0)).unwrap());

        let updated = SessionRepo::get(&conn, session.id).unwrap().unwrap();
        assert_eq!(updated.status, "completed");
        assert_eq!(updated.exit_code, Some(0));
        assert!(updated.ended_at.is_some());
    }

    #[test]
    fn set_result_fields() {
        let pool = setup();
        let conn = pool.get().unwrap();
        let session = create(&conn, Tier::One, None);
        SessionRepo::set_result(&conn, session.id, Some("all healthy"), Some(0.02), Some(12), Some(45_000))
            .unwrap();

        let updated = SessionRepo::get(&conn, session.id).unwrap().unwrap();
        assert_eq!(updated.response.as_deref(), Some("all healthy"));
        assert_eq!(updated.cost_usd, Some(0.02));
        assert_eq!(updated.turns, Some(12));
        assert_eq!(updated.duration_ms, Some(45_000));
    }

    #[test]
    fn list_filters_by_status() {
        let pool = setup();
        let conn = pool.get().unwrap();
        let first = create(&conn, Tier::One, None);
        SessionRepo::finalize(&conn, first.id, "completed", Some(0)).unwrap();
        let _second = create(&conn, Tier::One, None);

        let completed = SessionRepo::list(
            &conn,
            &ListSessionsOptions {
                status: Some("completed"),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].id, first.id);

        let all = SessionRepo::list(&conn, &ListSessionsOptions::default()).unwrap();
        assert_eq!(all.len(), 2);
        // Newest first.
        assert!(all[0].id > all[1].id);
    }

    #[test]
    fn list_paginates() {
        let pool = setup();
        let conn = pool.get().unwrap();
        for _ in 0..5 {
            let s = create(&conn, Tier::One, None);
            SessionRepo::finalize(&conn, s.id, "completed", Some(0)).unwrap();
        }
        let page = SessionRepo::list(
            &conn,
            &ListSessionsOptions {
                limit: Some(2),
                offset: Some(2),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].id, 3);
        assert_eq!(page[1].id, 2);
    }

    #[test]
    fn chain_walk_and_cost() {
        let pool = setup();
        let conn = pool.get().unwrap();

        let parent = create(&conn, Tier::One, None);
        SessionRepo::set_result(&conn, parent.id, None, Some(0.02), None, None).unwrap();
        SessionRepo::finalize(&conn, parent.id, "escalated", Some(0)).unwrap();

        let child = create(&conn, Tier::Two, Some(parent.id));
        SessionRepo::set_result(&conn, child.id, None, Some(0.05), None, None).unwrap();
        SessionRepo::finalize(&conn, child.id, "escalated", Some(0)).unwrap();

        let grandchild = create(&conn, Tier::Three, Some(child.id));
        SessionRepo::set_result(&conn, grandchild.id, None, Some(0.10), None, None).unwrap();
        SessionRepo::finalize(&conn, grandchild.id, "completed", Some(0)).unwrap();

        // Chain from the middle session covers all three, root first.
        let chain = SessionRepo::chain(&conn, child.id).unwrap();
        assert_eq!(
            chain.iter().map(|s| s.id).collect::<Vec<_>>(),
            vec![parent.id, child.id, grandchild.id]
        );

        let cost = SessionRepo::chain_cost(&conn, child.id).unwrap();
        assert!((cost - 0.17).abs() < 1e-9);
    }

    #[test]
    fn chain_of_single_session() {
        let pool = setup();
        let conn = pool.get().unwrap();
        let session = create(&conn, Tier::One, None);
        let chain = SessionRepo::chain(&conn, session.id).unwrap();
        assert_eq!(chain.len(), 1);
    }

    #[test]
    fn chain_of_missing_session_is_empty() {
        let pool = setup();
        let conn = pool.get().unwrap();
        assert!(SessionRepo::chain(&conn, 404).unwrap().is_empty());
    }

    #[test]
    fn latest_and_running() {
        let pool = setup();
        let conn = pool.get().unwrap();
        assert!(SessionRepo::latest(&conn).unwrap().is_none());
        assert!(SessionRepo::running(&conn).unwrap().is_none());

        let session = create(&conn, Tier::One, None);
        assert_eq!(SessionRepo::latest(&conn).unwrap().unwrap().id, session.id);
        assert_eq!(SessionRepo::running(&conn).unwrap().unwrap().id, session.id);

        SessionRepo::finalize(&conn, session.id, "completed", Some(0)).unwrap();
        assert!(SessionRepo::running(&conn).unwrap().is_none());
    }
}
