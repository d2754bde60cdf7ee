//! # vigil-cooldown
//!
//! The cooldown safety engine — the ultimate gate on destructive
//! remediation. Two hard caps per service:
//!
//! - **restart**: at most 2 within a rolling 4-hour window
//! - **redeployment**: at most 1 within a rolling 24-hour window
//!
//! The engine owns two sources of truth that must agree: a human-readable
//! JSON file (`cooldown.json`, authoritative for the dashboard view) and the
//! `cooldown_actions` table (authoritative for counting). Both are updated on
//! every write; a one-sided failure is retried once, then logged as
//! "cooldown write skew" while the session continues.
//!
//! Two consecutive healthy observations for a service reset its counters —
//! implemented by ignoring action rows older than the streak's reset marker
//! when counting (see `vigil_store::repositories::streak`).

#![deny(unsafe_code)]

pub mod engine;
pub mod state_file;

pub use engine::{CooldownEngine, Decision, RecordOutcome};
pub use state_file::{ActionEntry, CooldownFile, ServiceCooldowns};

use thiserror::Error;

/// Errors surfaced by the cooldown engine.
#[derive(Debug, Error)]
pub enum CooldownError {
    /// Underlying store failure.
    #[error(transparent)]
    Store(#[from] vigil_store::StoreError),
    /// State-file I/O failure.
    #[error("cooldown state file error: {0}")]
    Io(#[from] std::io::Error),
    /// State-file JSON failure.
    #[error("cooldown state file is not valid JSON: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, CooldownError>;
