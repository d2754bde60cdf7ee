//! The cooldown decision/record engine.

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{error, instrument, warn};

use vigil_core::marker::CooldownKind;
use vigil_store::Store;

use crate::Result;
use crate::state_file::{ActionEntry, CooldownFile};

/// Answer to "may service S take this action now?".
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Decision {
    /// Under the cap — go ahead.
    Allowed,
    /// Cap reached.
    Denied {
        /// Human-readable reason, shown on the dashboard and to the agent.
        reason: String,
        /// When the oldest counted action ages out of the window.
        next_eligible_at: String,
    },
}

/// What a [`CooldownEngine::record`] call managed to persist.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordOutcome {
    /// File and table both updated.
    Consistent,
    /// One side failed after a retry — logged, session continues. The table
    /// recomputes counters on the next decision, so safety holds.
    Skewed,
}

/// The cooldown engine. One per process, shared via `Arc`.
pub struct CooldownEngine {
    store: Arc<Store>,
    path: PathBuf,
    /// Serialises state-file read-modify-write cycles.
    file_lock: Mutex<()>,
}

impl CooldownEngine {
    /// Create an engine over the shared store and the state-file path.
    #[must_use]
    pub fn new(store: Arc<Store>, path: PathBuf) -> Self {
        Self {
            store,
            path,
            file_lock: Mutex::new(()),
        }
    }

    /// Ensure the state file exists (startup / pre-session check).
    pub fn ensure_state_file(&self) -> Result<()> {
        let _guard = self.file_lock.lock();
        let _ = CooldownFile::load_or_init(&self.path)?;
        Ok(())
    }

    /// May `service` take `kind` now? Counting uses the table (authoritative)
    /// and honours the healthy-streak reset marker.
    #[instrument(skip(self))]
    pub fn may_act(&self, service: &str, kind: CooldownKind) -> Result<Decision> {
        let window_start = (chrono::Utc::now() - kind.window()).to_rfc3339();
        let count = self
            .store
            .count_cooldown_actions(service, kind.as_str(), &window_start)?;
        if count < kind.limit() {
            return Ok(Decision::Allowed);
        }

        let oldest = self
            .store
            .oldest_cooldown_action(service, kind.as_str(), &window_start)?;
        let next_eligible_at = oldest
            .as_deref()
            .and_then(|ts| chrono::DateTime::parse_from_rfc3339(ts).ok())
            .map_or_else(
                // Counted rows exist, so a missing/unparseable timestamp is
                // store damage; fall back to the full window from now.
                || (chrono::Utc::now() + kind.window()).to_rfc3339(),
                |ts| (ts.with_timezone(&chrono::Utc) + kind.window()).to_rfc3339(),
            );

        Ok(Decision::Denied {
            reason: format!(
                "{service} already had {count} {kind}(s) in the last {}h (limit {})",
                kind.window().num_hours(),
                kind.limit()
            ),
            next_eligible_at,
        })
    }

    /// Record an attempted action in both sources of truth.
    ///
    /// Each side is retried once on failure. A one-sided failure is logged
    /// as write skew and the session continues — the table recomputes
    /// counters on the next decision, and the agent re-reads the file before
    /// its next remediation.
    #[instrument(skip(self))]
    pub fn record(
        &self,
        service: &str,
        kind: CooldownKind,
        success: bool,
        tier: u8,
        session_id: Option<i64>,
    ) -> RecordOutcome {
        let timestamp = chrono::Utc::now().to_rfc3339();

        let file_ok = {
            let _guard = self.file_lock.lock();
            let entry = ActionEntry {
                timestamp: timestamp.clone(),
                success,
            };
            self.try_twice(|| {
                CooldownFile::append_action(&self.path, service, kind, entry.clone())
            })
        };

        let table_ok = self.try_twice(|| {
            let _ = self
                .store
                .insert_cooldown_action(service, kind.as_str(), success, tier, session_id)?;
            Ok(())
        });

        match (file_ok, table_ok) {
            (true, true) => RecordOutcome::Consistent,
            (file_ok, table_ok) => {
                warn!(
                    service,
                    kind = kind.as_str(),
                    file_ok,
                    table_ok,
                    "cooldown write skew"
                );
                RecordOutcome::Skewed
            }
        }
    }

    /// Record a health observation: feed the streak table and mirror the
    /// counter into the state file. File failures are logged, never fatal.
    #[instrument(skip(self))]
    pub fn record_health(&self, service: &str, healthy: bool) -> Result<i64> {
        let count = if healthy {
            self.store.record_healthy(service)?
        } else {
            self.store.record_unhealthy(service)?;
            0
        };

        let _guard = self.file_lock.lock();
        if let Err(err) = CooldownFile::set_healthy_count(&self.path, service, count) {
            warn!(service, error = %err, "failed to mirror healthy count into cooldown file");
        }
        Ok(count)
    }

    /// The state-file document, for the dashboard (file authoritative).
    pub fn snapshot(&self) -> Result<CooldownFile> {
        let _guard = self.file_lock.lock();
        CooldownFile::load_or_init(&self.path)
    }

    /// Compare file and table views for a service, logging discrepancies.
    /// Nothing is auto-repaired.
    pub fn audit(&self, service: &str, kind: CooldownKind) -> Result<()> {
        let snapshot = self.snapshot()?;
        let file_count = snapshot
            .services
            .get(service)
            .map_or(0, |s| s.entries(kind).iter().filter(|e| e.success).count())
            as i64;
        let table_count =
            self.store
                .count_cooldown_actions(service, kind.as_str(), "1970-01-01T00:00:00Z")?;
        if file_count != table_count {
            warn!(
                service,
                kind = kind.as_str(),
                file_count,
                table_count,
                "cooldown sources disagree"
            );
        }
        Ok(())
    }

    #[allow(clippy::unused_self)]
    fn try_twice(&self, mut op: impl FnMut() -> Result<()>) -> bool {
        match op() {
            Ok(()) => true,
            Err(first) => {
                warn!(error = %first, "cooldown write failed, retrying once");
                match op() {
                    Ok(()) => true,
                    Err(second) => {
                        error!(error = %second, "cooldown write failed twice");
                        false
                    }
                }
            }
        }
    }
}

impl std::fmt::Debug for CooldownEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CooldownEngine")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
