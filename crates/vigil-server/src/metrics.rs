//! Prometheus recorder and metric name constants.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the global Prometheus recorder. Call once at startup, before any
/// metric is recorded. Returns the handle that renders `/metrics`.
pub fn install_recorder() -> PrometheusHandle {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install metrics recorder");
    info!("prometheus metrics recorder installed");
    handle
}

// Metric name constants to avoid typos across crates.

/// Sessions finished, labelled by terminal status (counter).
pub const SESSIONS_TOTAL: &str = "sessions_total";
/// Whether a session currently holds the latch (gauge, 0/1).
pub const SESSION_RUNNING: &str = "session_running";
/// Hub lines dropped for slow subscribers (counter).
pub const HUB_DROPPED_LINES_TOTAL: &str = "hub_dropped_lines_total";
/// Stream lines that failed JSON decoding (counter).
pub const STREAM_NON_JSON_LINES_TOTAL: &str = "stream_non_json_lines_total";
/// Stream events with an unrecognised type tag (counter).
pub const STREAM_UNKNOWN_EVENTS_TOTAL: &str = "stream_unknown_events_total";
/// HTTP requests by route family (counter).
pub const HTTP_REQUESTS_TOTAL: &str = "http_requests_total";
/// Webhook briefs synthesised, labelled by outcome (counter).
pub const WEBHOOK_BRIEFS_TOTAL: &str = "webhook_briefs_total";

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
