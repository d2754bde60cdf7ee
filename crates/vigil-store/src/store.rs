//! The `Store` facade — the one handle other crates hold.
//!
//! Serializes writes behind an in-process lock (SQLite allows one writer at a
//! time anyway) and retries transient `SQLITE_BUSY` failures with linear
//! backoff plus jitter. Reads go straight to the pool.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tracing::instrument;

use vigil_core::tier::Tier;

use crate::connection::{
    ConnectionConfig, ConnectionPool, PooledConnection, check_integrity, new_file,
};
use crate::errors::{Result, StoreError};
use crate::migrations::run_migrations;
use crate::repositories::config::ConfigRepo;
use crate::repositories::cooldown::{CooldownRepo, InsertActionOptions};
use crate::repositories::event::{EventRepo, InsertEventOptions, ListEventsOptions};
use crate::repositories::memory::{InsertMemoryOptions, MemoryRepo, UpdateMemoryOptions};
use crate::repositories::session::{CreateSessionOptions, ListSessionsOptions, SessionRepo};
use crate::repositories::streak::StreakRepo;
use crate::row_types::{
    ConfigRow, CooldownActionRow, CooldownSummaryRow, EventRow, HealthStreakRow, MemoryRow,
    SessionRow,
};

/// Outcome of a memory upsert.
#[derive(Clone, Debug, PartialEq)]
pub enum MemoryUpsert {
    /// An existing active (service, category) row was reinforced.
    Reinforced {
        /// Row id.
        id: i64,
        /// Confidence after the bump.
        confidence: f64,
    },
    /// No active row existed; a new one was inserted.
    Inserted {
        /// New row id.
        id: i64,
    },
}

/// Store facade over the connection pool and all repositories.
///
/// INVARIANT: writes are serialized by `write_lock`; SQLite's
/// `UNIQUE` indexes enforce the single-running-session and
/// one-active-memory-per-pair invariants at the schema level.
pub struct Store {
    pool: ConnectionPool,
    write_lock: Mutex<()>,
}

impl Store {
    const BUSY_MAX_RETRIES: u32 = 32;

    /// Wrap an already-migrated pool.
    pub fn new(pool: ConnectionPool) -> Self {
        Self {
            pool,
            write_lock: Mutex::new(()),
        }
    }

    /// Open a database file, verify integrity, and apply pending migrations.
    ///
    /// Integrity failure maps to [`StoreError::Corrupt`] so the binary can
    /// exit with its dedicated code.
    pub fn open(path: &Path, config: &ConnectionConfig) -> Result<Self> {
        let pool = new_file(path, config)?;
        {
            let conn = pool.get()?;
            check_integrity(&conn)?;
            let _ = run_migrations(&conn)?;
        }
        Ok(Self::new(pool))
    }

    /// In-memory store with the full schema (tests).
    pub fn open_in_memory() -> Result<Self> {
        let pool = crate::connection::new_in_memory(&ConnectionConfig::default())?;
        {
            let conn = pool.get()?;
            let _ = run_migrations(&conn)?;
        }
        Ok(Self::new(pool))
    }

    fn conn(&self) -> Result<PooledConnection> {
        Ok(self.pool.get()?)
    }

    fn lock_writes(&self) -> Result<MutexGuard<'_, ()>> {
        self.write_lock
            .lock()
            .map_err(|_| StoreError::Internal("write lock poisoned".into()))
    }

    /// Retry on `SQLITE_BUSY`/`SQLITE_LOCKED` with linear backoff + jitter.
    #[allow(clippy::unused_self)]
    fn retry_on_busy<T>(&self, mut f: impl FnMut() -> Result<T>) -> Result<T> {
        let mut attempts = 0u32;
        loop {
            match f() {
                Ok(value) => return Ok(value),
                Err(err) if err.is_busy() && attempts < Self::BUSY_MAX_RETRIES => {
                    attempts += 1;
                    let base_ms = u64::from(attempts).saturating_mul(10).min(500);
                    let jitter_range = base_ms / 4;
                    let jitter = if jitter_range > 0 {
                        rand::random::<u64>() % (jitter_range * 2 + 1)
                    } else {
                        0
                    };
                    std::thread::sleep(Duration::from_millis(
                        base_ms.saturating_sub(jitter_range) + jitter,
                    ));
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn write<T>(&self, mut f: impl FnMut(&rusqlite::Connection) -> Result<T>) -> Result<T> {
        let _guard = self.lock_writes()?;
        self.retry_on_busy(|| {
            let conn = self.conn()?;
            f(&conn)
        })
    }

    fn read<T>(&self, f: impl FnOnce(&rusqlite::Connection) -> Result<T>) -> Result<T> {
        let conn = self.conn()?;
        f(&conn)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Sessions
    // ─────────────────────────────────────────────────────────────────────

    /// Create a session row in `running` state.
    #[instrument(skip(self, prompt), fields(tier = tier.as_u8(), trigger))]
    pub fn create_session(
        &self,
        tier: Tier,
        model: &str,
        prompt: &str,
        trigger: &str,
        parent_id: Option<i64>,
    ) -> Result<SessionRow> {
        self.write(|conn| {
            SessionRepo::create(
                conn,
                &CreateSessionOptions {
                    tier,
                    model,
                    prompt,
                    trigger,
                    parent_id,
                },
            )
        })
    }

    /// Fetch a session.
    pub fn get_session(&self, id: i64) -> Result<Option<SessionRow>> {
        self.read(|conn| SessionRepo::get(conn, id))
    }

    /// Overwrite a session's status.
    pub fn update_session_status(&self, id: i64, status: &str) -> Result<bool> {
        self.write(|conn| SessionRepo::update_status(conn, id, status))
    }

    /// Terminal status + exit code + end time.
    pub fn finalize_session(&self, id: i64, status: &str, exit_code: Option<i32>) -> Result<bool> {
        self.write(|conn| SessionRepo::finalize(conn, id, status, exit_code))
    }

    /// Result fields from the terminal stream event.
    pub fn set_session_result(
        &self,
        id: i64,
        response: Option<&str>,
        cost_usd: Option<f64>,
        turns: Option<i64>,
        duration_ms: Option<i64>,
    ) -> Result<bool> {
        self.write(|conn| SessionRepo::set_result(conn, id, response, cost_usd, turns, duration_ms))
    }

    /// Post-run summary text.
    pub fn set_session_summary(&self, id: i64, summary: &str) -> Result<bool> {
        self.write(|conn| SessionRepo::set_summary(conn, id, summary))
    }

    /// Log file path.
    pub fn set_session_log_path(&self, id: i64, log_path: &str) -> Result<bool> {
        self.write(|conn| SessionRepo::set_log_path(conn, id, log_path))
    }

    /// List sessions, newest first.
    pub fn list_sessions(&self, opts: &ListSessionsOptions<'_>) -> Result<Vec<SessionRow>> {
        self.read(|conn| SessionRepo::list(conn, opts))
    }

    /// Direct escalation children.
    pub fn session_children(&self, id: i64) -> Result<Vec<SessionRow>> {
        self.read(|conn| SessionRepo::children(conn, id))
    }

    /// Full escalation chain containing `id`, root first.
    pub fn session_chain(&self, id: i64) -> Result<Vec<SessionRow>> {
        self.read(|conn| SessionRepo::chain(conn, id))
    }

    /// Summed cost across the chain containing `id`.
    pub fn session_chain_cost(&self, id: i64) -> Result<f64> {
        self.read(|conn| SessionRepo::chain_cost(conn, id))
    }

    /// Most recently started session.
    pub fn latest_session(&self) -> Result<Option<SessionRow>> {
        self.read(SessionRepo::latest)
    }

    /// The currently running session, if any.
    pub fn running_session(&self) -> Result<Option<SessionRow>> {
        self.read(SessionRepo::running)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Events
    // ─────────────────────────────────────────────────────────────────────

    /// Append an event row.
    pub fn insert_event(
        &self,
        session_id: Option<i64>,
        level: &str,
        service: Option<&str>,
        message: &str,
    ) -> Result<EventRow> {
        self.write(|conn| {
            EventRepo::insert(
                conn,
                &InsertEventOptions {
                    session_id,
                    level,
                    service,
                    message,
                },
            )
        })
    }

    /// List events with filters.
    pub fn list_events(&self, opts: &ListEventsOptions<'_>) -> Result<Vec<EventRow>> {
        self.read(|conn| EventRepo::list(conn, opts))
    }

    /// Events for one session, oldest first.
    pub fn events_for_session(&self, session_id: i64) -> Result<Vec<EventRow>> {
        self.read(|conn| EventRepo::for_session(conn, session_id))
    }

    // ─────────────────────────────────────────────────────────────────────
    // Memories
    // ─────────────────────────────────────────────────────────────────────

    /// Atomic reinforce-or-insert. Both branches run inside one transaction
    /// so a concurrent upsert of the same pair cannot create two active rows.
    #[instrument(skip(self, observation), fields(service, category))]
    pub fn upsert_memory(
        &self,
        service: Option<&str>,
        category: &str,
        observation: &str,
        initial_confidence: f64,
        reinforce_delta: f64,
        session_id: Option<i64>,
        tier: u8,
    ) -> Result<MemoryUpsert> {
        self.write(|conn| {
            let tx = conn.unchecked_transaction()?;
            let outcome = match MemoryRepo::find_active(&tx, service, category)? {
                Some(existing) => {
                    let confidence = MemoryRepo::reinforce(&tx, existing.id, reinforce_delta)?;
                    MemoryUpsert::Reinforced {
                        id: existing.id,
                        confidence,
                    }
                }
                None => {
                    let row = MemoryRepo::insert(
                        &tx,
                        &InsertMemoryOptions {
                            service,
                            category,
                            observation,
                            confidence: initial_confidence,
                            session_id,
                            tier,
                        },
                    )?;
                    MemoryUpsert::Inserted { id: row.id }
                }
            };
            tx.commit()?;
            Ok(outcome)
        })
    }

    /// Fetch a memory.
    pub fn get_memory(&self, id: i64) -> Result<Option<MemoryRow>> {
        self.read(|conn| MemoryRepo::get(conn, id))
    }

    /// Find the active memory for a (service, category) pair.
    pub fn find_active_memory(
        &self,
        service: Option<&str>,
        category: &str,
    ) -> Result<Option<MemoryRow>> {
        self.read(|conn| MemoryRepo::find_active(conn, service, category))
    }

    /// List memories, most confident first.
    pub fn list_memories(&self, include_inactive: bool) -> Result<Vec<MemoryRow>> {
        self.read(|conn| MemoryRepo::list(conn, include_inactive))
    }

    /// Active memories ready for context injection.
    pub fn memories_for_injection(&self, floor: f64) -> Result<Vec<MemoryRow>> {
        self.read(|conn| MemoryRepo::active_for_injection(conn, floor))
    }

    /// Active memories whose `updated_at` predates `cutoff`.
    pub fn stale_memories(&self, cutoff: &str) -> Result<Vec<MemoryRow>> {
        self.read(|conn| MemoryRepo::active_stale(conn, cutoff))
    }

    /// Write a decayed confidence/active pair.
    pub fn apply_memory_decay(&self, id: i64, confidence: f64, active: bool) -> Result<bool> {
        self.write(|conn| MemoryRepo::apply_decay(conn, id, confidence, active))
    }

    /// Operator field update.
    pub fn update_memory(&self, id: i64, opts: &UpdateMemoryOptions<'_>) -> Result<bool> {
        self.write(|conn| MemoryRepo::update(conn, id, opts))
    }

    /// Operator delete.
    pub fn delete_memory(&self, id: i64) -> Result<bool> {
        self.write(|conn| MemoryRepo::delete(conn, id))
    }

    /// Count of active memories.
    pub fn count_active_memories(&self) -> Result<i64> {
        self.read(MemoryRepo::count_active)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Cooldowns & streaks
    // ─────────────────────────────────────────────────────────────────────

    /// Append a cooldown action row.
    pub fn insert_cooldown_action(
        &self,
        service: &str,
        action: &str,
        success: bool,
        tier: u8,
        session_id: Option<i64>,
    ) -> Result<CooldownActionRow> {
        self.write(|conn| {
            CooldownRepo::insert(
                conn,
                &InsertActionOptions {
                    service,
                    action,
                    success,
                    tier,
                    session_id,
                },
            )
        })
    }

    /// Count successful actions in the window, honouring the streak floor.
    pub fn count_cooldown_actions(
        &self,
        service: &str,
        action: &str,
        window_start: &str,
    ) -> Result<i64> {
        self.read(|conn| {
            let floor = StreakRepo::reset_marker(conn, service)?;
            CooldownRepo::count_in_window(conn, service, action, window_start, floor.as_deref())
        })
    }

    /// Oldest counted action in the window, honouring the streak floor.
    pub fn oldest_cooldown_action(
        &self,
        service: &str,
        action: &str,
        window_start: &str,
    ) -> Result<Option<String>> {
        self.read(|conn| {
            let floor = StreakRepo::reset_marker(conn, service)?;
            CooldownRepo::oldest_in_window(conn, service, action, window_start, floor.as_deref())
        })
    }

    /// Dashboard summary of the last 24 h.
    pub fn cooldown_summary_since(&self, since: &str) -> Result<Vec<CooldownSummaryRow>> {
        self.read(|conn| CooldownRepo::summary_since(conn, since))
    }

    /// Most recent actions.
    pub fn recent_cooldown_actions(&self, limit: i64) -> Result<Vec<CooldownActionRow>> {
        self.read(|conn| CooldownRepo::list_recent(conn, limit))
    }

    /// Record a healthy observation; returns the new streak count.
    pub fn record_healthy(&self, service: &str) -> Result<i64> {
        self.write(|conn| StreakRepo::record_healthy(conn, service))
    }

    /// Record an unhealthy observation.
    pub fn record_unhealthy(&self, service: &str) -> Result<()> {
        self.write(|conn| StreakRepo::record_unhealthy(conn, service))
    }

    /// Streak row for a service.
    pub fn health_streak(&self, service: &str) -> Result<Option<HealthStreakRow>> {
        self.read(|conn| StreakRepo::get(conn, service))
    }

    /// All streaks.
    pub fn health_streaks(&self) -> Result<Vec<HealthStreakRow>> {
        self.read(StreakRepo::list)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Config
    // ─────────────────────────────────────────────────────────────────────

    /// Get a persisted config value.
    pub fn get_config(&self, key: &str) -> Result<Option<String>> {
        self.read(|conn| ConfigRepo::get(conn, key))
    }

    /// Upsert a persisted config value.
    pub fn set_config(&self, key: &str, value: &str) -> Result<()> {
        self.write(|conn| ConfigRepo::set(conn, key, value))
    }

    /// All persisted config entries.
    pub fn all_config(&self) -> Result<Vec<ConfigRow>> {
        self.read(ConfigRepo::all)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
