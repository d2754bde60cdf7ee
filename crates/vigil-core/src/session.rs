//! Session lifecycle vocabulary.
//!
//! A session is one run of the agent subprocess. The supervisor owns the
//! state machine:
//!
//! ```text
//! created → running → completed    (exit 0, no handoff)
//!                  → failed        (non-zero exit or launch failure)
//!                  → timed_out     (wall-clock exceeded)
//!                  → escalated     (exit 0 + valid handoff; child spawns)
//! ```

use serde::{Deserialize, Serialize};

/// Lifecycle state of a session row.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Subprocess is live. At most one session is in this state process-wide.
    Running,
    /// Exited zero with no escalation handoff.
    Completed,
    /// Non-zero exit, crash, or launch failure.
    Failed,
    /// Killed after exceeding the wall-clock timeout.
    TimedOut,
    /// Exited zero and handed off to a higher tier.
    Escalated,
}

impl SessionStatus {
    /// Storage/wire string for this status.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Running => "running",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
            SessionStatus::TimedOut => "timed_out",
            SessionStatus::Escalated => "escalated",
        }
    }

    /// Parse a storage string. Returns `None` for unknown values.
    #[must_use]
    pub fn parse(s: &str) -> Option<SessionStatus> {
        match s {
            "running" => Some(SessionStatus::Running),
            "completed" => Some(SessionStatus::Completed),
            "failed" => Some(SessionStatus::Failed),
            "timed_out" => Some(SessionStatus::TimedOut),
            "escalated" => Some(SessionStatus::Escalated),
            _ => None,
        }
    }

    /// Whether the session has reached a terminal state.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, SessionStatus::Running)
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What caused a session to start.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    /// The periodic scheduler tick.
    Scheduled,
    /// An operator action on the dashboard.
    Manual,
    /// A JSON API or chat-protocol request.
    Api,
    /// An alert webhook.
    Alert,
}

impl TriggerKind {
    /// Storage/wire string for this trigger.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            TriggerKind::Scheduled => "scheduled",
            TriggerKind::Manual => "manual",
            TriggerKind::Api => "api",
            TriggerKind::Alert => "alert",
        }
    }

    /// Parse a storage string. Returns `None` for unknown values.
    #[must_use]
    pub fn parse(s: &str) -> Option<TriggerKind> {
        match s {
            "scheduled" => Some(TriggerKind::Scheduled),
            "manual" => Some(TriggerKind::Manual),
            "api" => Some(TriggerKind::Api),
            "alert" => Some(TriggerKind::Alert),
            _ => None,
        }
    }
}

impl std::fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_string_round_trip() {
        for status in [
            SessionStatus::Running,
            SessionStatus::Completed,
            SessionStatus::Failed,
            SessionStatus::TimedOut,
            SessionStatus::Escalated,
        ] {
            assert_eq!(SessionStatus::parse(status.as_str()), Some(status));
        }
    }

    #[test]
    fn status_unknown_rejected() {
        assert!(SessionStatus::parse("pending").is_none());
        assert!(SessionStatus::parse("").is_none());
    }

    #[test]
    fn only_running_is_non_terminal() {
        assert!(!SessionStatus::Running.is_terminal());
        assert!(SessionStatus::Completed.is_terminal());
        assert!(SessionStatus::Failed.is_terminal());
        assert!(SessionStatus::TimedOut.is_terminal());
        assert!(SessionStatus::Escalated.is_terminal());
    }

    #[test]
    fn status_serde_snake_case() {
        let json = serde_json::to_string(&SessionStatus::TimedOut).unwrap();
        assert_eq!(json, "\"timed_out\"");
    }

    #[test]
    fn trigger_string_round_trip() {
        for trigger in [
            TriggerKind::Scheduled,
            TriggerKind::Manual,
            TriggerKind::Api,
            TriggerKind::Alert,
        ] {
            assert_eq!(TriggerKind::parse(trigger.as_str()), Some(trigger));
        }
    }

    #[test]
    fn trigger_unknown_rejected() {
        assert!(TriggerKind::parse("cron").is_none());
    }
}
