//! Row structs shared between repositories and the API layer.
//!
//! Fields serialize camelCase — these types go straight onto the JSON wire.
//! All timestamps are RFC 3339 UTC strings, exactly as stored.

use serde::{Deserialize, Serialize};

/// One run of the agent subprocess.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRow {
    /// Monotonic row id.
    pub id: i64,
    /// Capability tier (1–3).
    pub tier: u8,
    /// Model the subprocess ran with.
    pub model: String,
    /// Starting prompt (path or inline text).
    pub prompt: String,
    /// What started the session (`scheduled|manual|api|alert`).
    pub trigger: String,
    /// Lifecycle state.
    pub status: String,
    /// Start time.
    pub started_at: String,
    /// End time, once terminal.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<String>,
    /// Subprocess exit code (−1 for launch failure).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    /// Path of the raw NDJSON log file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_path: Option<String>,
    /// Final response text from the terminal result event.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    /// Post-run LLM summary (≤2 sentences).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Total cost in USD as reported by the subprocess.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost_usd: Option<f64>,
    /// Conversation turns.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub turns: Option<i64>,
    /// Wall-clock duration in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
    /// Escalation parent, when this session was spawned from a handoff.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<i64>,
}

/// One extracted `[EVENT:…]` marker.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRow {
    /// Row id.
    pub id: i64,
    /// Session that produced the event, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<i64>,
    /// Severity (`info|warning|critical`).
    pub level: String,
    /// Implicated service, if named.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    /// Free-form message.
    pub message: String,
    /// Creation time.
    pub created_at: String,
}

/// One persistent agent memory.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryRow {
    /// Row id.
    pub id: i64,
    /// Service the observation is about (`None` = general).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    /// Observation category.
    pub category: String,
    /// The observation text.
    pub observation: String,
    /// Confidence in [0.0, 1.0].
    pub confidence: f64,
    /// Whether the memory is injected into future sessions.
    pub active: bool,
    /// Creation time.
    pub created_at: String,
    /// Last reinforcement/decay write.
    pub updated_at: String,
    /// Session that created the memory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<i64>,
    /// Tier at creation.
    pub tier: u8,
}

/// One attempted destructive action.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CooldownActionRow {
    /// Row id.
    pub id: i64,
    /// Target service.
    pub service: String,
    /// Action class (`restart|redeployment`).
    pub action: String,
    /// When the action was attempted.
    pub timestamp: String,
    /// Whether the agent reported success.
    pub success: bool,
    /// Tier at the time of action.
    pub tier: u8,
    /// Session that performed the action.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<i64>,
}

/// Aggregated cooldown activity for the dashboard (last 24 h).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CooldownSummaryRow {
    /// Target service.
    pub service: String,
    /// Action class.
    pub action: String,
    /// Actions in the window.
    pub count: i64,
    /// Most recent action time.
    pub last_at: String,
}

/// Per-service consecutive-healthy counter.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthStreakRow {
    /// Service name.
    pub service: String,
    /// Consecutive healthy observations.
    pub consecutive_healthy: i64,
    /// Last observation time.
    pub last_checked: String,
    /// When the streak last reached 2 — cooldown counting ignores action
    /// rows older than this.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reset_at: Option<String>,
}

/// One persisted config entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigRow {
    /// Config key.
    pub key: String,
    /// Config value (stringly typed; the settings layer parses).
    pub value: String,
    /// Last write time.
    pub updated_at: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
