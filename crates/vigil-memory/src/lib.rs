//! # vigil-memory
//!
//! The agent memory engine: persistent cross-session knowledge with
//! reinforcement, staleness decay, and token-budgeted context assembly.
//!
//! Three operations, all backed by [`vigil_store::Store`]:
//!
//! - [`MemoryEngine::upsert`] — called by the stream parser for every
//!   `[MEMORY:…]` marker. Same (service, category) reinforces the existing
//!   active row; otherwise a new row is inserted at the initial confidence.
//! - [`MemoryEngine::decay`] — runs once at the start of every session.
//!   Active memories untouched for more than the grace period lose
//!   confidence per whole week past it, and fall inactive below the floor.
//! - [`MemoryEngine::context`] — assembles the markdown block injected into
//!   the subprocess system prompt, most confident first, until the token
//!   budget is spent.
//!
//! Reinforcement deliberately conflates paraphrases: a second observation for
//! the same (service, category) bumps confidence and keeps the original text.

#![deny(unsafe_code)]

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use vigil_core::text::estimate_tokens;
use vigil_store::store::MemoryUpsert;
use vigil_store::{Store, StoreError};

/// Confidence assigned to a freshly observed memory.
pub const INITIAL_CONFIDENCE: f64 = 0.7;
/// Confidence bump per reinforcement, capped at 1.0.
pub const REINFORCE_DELTA: f64 = 0.1;
/// Below this confidence a memory is deactivated and no longer injected.
pub const CONFIDENCE_FLOOR: f64 = 0.3;
/// Days a memory may rest before decay starts.
pub const GRACE_DAYS: i64 = 30;
/// Confidence lost per whole week past the grace period.
pub const DECAY_PER_WEEK: f64 = 0.1;
/// Default token budget for [`MemoryEngine::context`].
pub const DEFAULT_BUDGET_TOKENS: usize = 2000;

/// Errors surfaced by the memory engine.
#[derive(Debug, Error)]
pub enum MemoryError {
    /// Underlying store failure.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// A stored timestamp failed to parse (store corruption or manual edit).
    #[error("unparseable timestamp {value:?} on memory {id}")]
    BadTimestamp {
        /// Memory row id.
        id: i64,
        /// The offending string.
        value: String,
    },
}

/// Outcome of an upsert, as reported to the parser for display.
#[derive(Clone, Debug, PartialEq)]
pub enum UpsertOutcome {
    /// Existing active pair was reinforced to the given confidence.
    Reinforced {
        /// Row id.
        id: i64,
        /// Confidence after the bump.
        confidence: f64,
    },
    /// A new memory was created.
    Created {
        /// New row id.
        id: i64,
    },
}

/// What one decay pass did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DecayReport {
    /// Active memories older than the grace period.
    pub scanned: usize,
    /// Memories whose confidence was reduced.
    pub decayed: usize,
    /// Memories that fell below the floor and were deactivated.
    pub deactivated: usize,
}

/// The memory engine. One per process, shared via `Arc`.
pub struct MemoryEngine {
    store: Arc<Store>,
}

impl MemoryEngine {
    /// Create an engine over the shared store.
    #[must_use]
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Record an observation from a `[MEMORY:…]` marker.
    #[instrument(skip(self, observation), fields(service, category))]
    pub fn upsert(
        &self,
        service: Option<&str>,
        category: &str,
        observation: &str,
        session_id: Option<i64>,
        tier: u8,
    ) -> Result<UpsertOutcome, MemoryError> {
        let outcome = self.store.upsert_memory(
            service,
            category,
            observation,
            INITIAL_CONFIDENCE,
            REINFORCE_DELTA,
            session_id,
            tier,
        )?;
        Ok(match outcome {
            MemoryUpsert::Reinforced { id, confidence } => {
                debug!(id, confidence, "memory reinforced");
                UpsertOutcome::Reinforced { id, confidence }
            }
            MemoryUpsert::Inserted { id } => {
                debug!(id, "memory created");
                UpsertOutcome::Created { id }
            }
        })
    }

    /// Run one staleness-decay pass. Called at session start, before any
    /// prompt is assembled.
    ///
    /// For every active memory whose `updated_at` is more than
    /// [`GRACE_DAYS`] old: lose [`DECAY_PER_WEEK`] per whole week past the
    /// grace period; deactivate below [`CONFIDENCE_FLOOR`].
    #[instrument(skip(self))]
    pub fn decay(&self) -> Result<DecayReport, MemoryError> {
        let now = chrono::Utc::now();
        let cutoff = (now - chrono::Duration::days(GRACE_DAYS)).to_rfc3339();
        let stale = self.store.stale_memories(&cutoff)?;

        let mut report = DecayReport {
            scanned: stale.len(),
            ..DecayReport::default()
        };

        for memory in stale {
            let updated_at = chrono::DateTime::parse_from_rfc3339(&memory.updated_at)
                .map_err(|_| MemoryError::BadTimestamp {
                    id: memory.id,
                    value: memory.updated_at.clone(),
                })?
                .with_timezone(&chrono::Utc);

            let weeks_past_grace =
                (now - updated_at - chrono::Duration::days(GRACE_DAYS)).num_weeks();
            if weeks_past_grace < 1 {
                continue;
            }

            let confidence = memory.confidence - DECAY_PER_WEEK * weeks_past_grace as f64;
            let confidence = confidence.max(0.0);
            if confidence < CONFIDENCE_FLOOR {
                let _ = self.store.apply_memory_decay(memory.id, confidence, false)?;
                report.deactivated += 1;
                debug!(
                    id = memory.id,
                    confidence, "memory deactivated by decay"
                );
            } else {
                let _ = self.store.apply_memory_decay(memory.id, confidence, true)?;
            }
            report.decayed += 1;
        }

        if report.decayed > 0 {
            info!(
                scanned = report.scanned,
                decayed = report.decayed,
                deactivated = report.deactivated,
                "memory decay pass"
            );
        }
        Ok(report)
    }

    /// Assemble the memory context block for prompt injection.
    ///
    /// Active memories at or above the floor, grouped by service with
    /// general (service-less) memories last, most confident first within a
    /// group. Memories are added until the next would exceed `budget_tokens`
    /// (estimated at four bytes per token). Returns the empty string when
    /// nothing qualifies.
    #[instrument(skip(self))]
    pub fn context(&self, budget_tokens: usize) -> Result<String, MemoryError> {
        let rows = self.store.memories_for_injection(CONFIDENCE_FLOOR)?;
        let total = rows.len();
        if total == 0 {
            return Ok(String::new());
        }

        let mut body = String::new();
        let mut included = 0usize;
        let mut spent = 0usize;
        let mut current_group: Option<Option<String>> = None;

        for memory in rows {
            let line = format!(
                "- [{}, {:.2}] {}\n",
                memory.category, memory.confidence, memory.observation
            );
            let cost = estimate_tokens(&line);
            if spent + cost > budget_tokens {
                break;
            }

            let group = memory.service.clone();
            if current_group.as_ref() != Some(&group) {
                let heading = group.as_deref().unwrap_or("general");
                body.push_str(&format!("\n### {heading}\n"));
                current_group = Some(group);
            }
            body.push_str(&line);
            spent += cost;
            included += 1;
        }

        if included == 0 {
            warn!(total, budget_tokens, "memory budget too small for any entry");
            return Ok(String::new());
        }

        Ok(format!(
            "## Agent Memory ({included} of {total} memories, ~{spent} tokens)\n{body}"
        ))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
