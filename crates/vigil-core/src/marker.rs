//! Typed vocabulary for structured markers in assistant text.
//!
//! The agent embeds `[EVENT:…]`, `[MEMORY:…]`, and `[COOLDOWN:…]` tokens in
//! its output; the stream parser extracts them with pinned regexes. The enums
//! here are the closed sets those regexes admit — parsing an unknown level or
//! category is impossible by construction.

use serde::{Deserialize, Serialize};

/// Severity of an `[EVENT:…]` marker.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventLevel {
    /// Routine observation.
    Info,
    /// Degraded but functioning.
    Warning,
    /// Down or data-loss risk.
    Critical,
}

impl EventLevel {
    /// Storage/wire string.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            EventLevel::Info => "info",
            EventLevel::Warning => "warning",
            EventLevel::Critical => "critical",
        }
    }

    /// Parse a marker/storage string. Returns `None` for unknown values.
    #[must_use]
    pub fn parse(s: &str) -> Option<EventLevel> {
        match s {
            "info" => Some(EventLevel::Info),
            "warning" => Some(EventLevel::Warning),
            "critical" => Some(EventLevel::Critical),
            _ => None,
        }
    }
}

impl std::fmt::Display for EventLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Category of a `[MEMORY:…]` marker.
///
/// At most one active memory exists per (service, category) pair, so the
/// category set doubles as the dedup key space.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryCategory {
    /// Startup/shutdown durations, slow endpoints.
    Timing,
    /// Inter-service dependencies.
    Dependency,
    /// Recurring behavioral quirks.
    Behavior,
    /// What fixed a problem before.
    Remediation,
    /// Scheduled maintenance patterns.
    Maintenance,
}

impl MemoryCategory {
    /// All categories, in marker-grammar order.
    pub const ALL: [MemoryCategory; 5] = [
        MemoryCategory::Timing,
        MemoryCategory::Dependency,
        MemoryCategory::Behavior,
        MemoryCategory::Remediation,
        MemoryCategory::Maintenance,
    ];

    /// Storage/wire string.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            MemoryCategory::Timing => "timing",
            MemoryCategory::Dependency => "dependency",
            MemoryCategory::Behavior => "behavior",
            MemoryCategory::Remediation => "remediation",
            MemoryCategory::Maintenance => "maintenance",
        }
    }

    /// Parse a marker/storage string. Returns `None` for unknown values.
    #[must_use]
    pub fn parse(s: &str) -> Option<MemoryCategory> {
        match s {
            "timing" => Some(MemoryCategory::Timing),
            "dependency" => Some(MemoryCategory::Dependency),
            "behavior" => Some(MemoryCategory::Behavior),
            "remediation" => Some(MemoryCategory::Remediation),
            "maintenance" => Some(MemoryCategory::Maintenance),
            _ => None,
        }
    }
}

impl std::fmt::Display for MemoryCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Destructive action class of a `[COOLDOWN:…]` marker.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CooldownKind {
    /// Service restart. Capped at 2 per rolling 4 hours per service.
    Restart,
    /// Full redeployment. Capped at 1 per rolling 24 hours per service.
    Redeployment,
}

impl CooldownKind {
    /// Storage/wire string.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            CooldownKind::Restart => "restart",
            CooldownKind::Redeployment => "redeployment",
        }
    }

    /// Parse a marker/storage string. Returns `None` for unknown values.
    #[must_use]
    pub fn parse(s: &str) -> Option<CooldownKind> {
        match s {
            "restart" => Some(CooldownKind::Restart),
            "redeployment" => Some(CooldownKind::Redeployment),
            _ => None,
        }
    }

    /// Rolling window in which this action is capped.
    #[must_use]
    pub fn window(self) -> chrono::Duration {
        match self {
            CooldownKind::Restart => chrono::Duration::hours(4),
            CooldownKind::Redeployment => chrono::Duration::hours(24),
        }
    }

    /// Maximum successful actions allowed inside [`Self::window`].
    #[must_use]
    pub fn limit(self) -> i64 {
        match self {
            CooldownKind::Restart => 2,
            CooldownKind::Redeployment => 1,
        }
    }
}

impl std::fmt::Display for CooldownKind {
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
    fn level_round_trip() {
        for level in [EventLevel::Info, EventLevel::Warning, EventLevel::Critical] {
            assert_eq!(EventLevel::parse(level.as_str()), Some(level));
        }
        assert!(EventLevel::parse("debug").is_none());
    }

    #[test]
    fn category_round_trip() {
        for cat in MemoryCategory::ALL {
            assert_eq!(MemoryCategory::parse(cat.as_str()), Some(cat));
        }
        assert!(MemoryCategory::parse("observation").is_none());
    }

    #[test]
    fn cooldown_round_trip() {
        for kind in [CooldownKind::Restart, CooldownKind::Redeployment] {
            assert_eq!(CooldownKind::parse(kind.as_str()), Some(kind));
        }
        assert!(CooldownKind::parse("reboot").is_none());
    }

    #[test]
    fn cooldown_windows_and_limits() {
        assert_eq!(CooldownKind::Restart.window(), chrono::Duration::hours(4));
        assert_eq!(CooldownKind::Restart.limit(), 2);
        assert_eq!(
            CooldownKind::Redeployment.window(),
            chrono::Duration::hours(24)
        );
        assert_eq!(CooldownKind::Redeployment.limit(), 1);
    }

    #[test]
    fn serde_snake_case() {
        assert_eq!(
            serde_json::to_string(&EventLevel::Critical).unwrap(),
            "\"critical\""
        );
        assert_eq!(
            serde_json::to_string(&MemoryCategory::Remediation).unwrap(),
            "\"remediation\""
        );
        assert_eq!(
            serde_json::to_string(&CooldownKind::Redeployment).unwrap(),
            "\"redeployment\""
        );
    }
}
