//! Per-session stream parser.
//!
//! One `StreamParser` lives for the duration of one subprocess. The session
//! manager feeds it stdout lines; everything else (log file, hub topics,
//! store writes, marker side effects) happens here. Per-line failures are
//! logged and swallowed — the subprocess is untrusted and must never be able
//! to crash the supervisor.

use std::fs::File;
use std::io::{BufWriter, Write as _};
use std::path::Path;
use std::sync::Arc;

use metrics::counter;
use tracing::{debug, warn};

use vigil_cooldown::CooldownEngine;
use vigil_hub::{Channel, SessionHub};
use vigil_memory::MemoryEngine;
use vigil_store::Store;

use crate::StreamError;
use crate::events::{AgentEvent, ResultEvent};
use crate::format::format_event;
use crate::markers::{Marker, extract_markers};

/// Parser for one session's stdout stream.
pub struct StreamParser {
    session_id: i64,
    tier: u8,
    store: Arc<Store>,
    memory: Arc<MemoryEngine>,
    cooldown: Arc<CooldownEngine>,
    hub: Arc<SessionHub>,
    log: BufWriter<File>,
    unknown_events: u64,
    result: Option<ResultEvent>,
}

impl StreamParser {
    /// Create a parser, opening the session log file and recording its path
    /// on the session row.
    pub fn new(
        session_id: i64,
        tier: u8,
        store: Arc<Store>,
        memory: Arc<MemoryEngine>,
        cooldown: Arc<CooldownEngine>,
        hub: Arc<SessionHub>,
        log_path: &Path,
    ) -> Result<Self, StreamError> {
        let file = File::create(log_path)?;
        let _ = store.set_session_log_path(session_id, &log_path.to_string_lossy())?;
        Ok(Self {
            session_id,
            tier,
            store,
            memory,
            cooldown,
            hub,
            log: BufWriter::new(file),
            unknown_events: 0,
            result: None,
        })
    }

    /// Process one stdout line.
    pub fn handle_line(&mut self, raw: &str) {
        let now = chrono::Utc::now().to_rfc3339();
        if let Err(err) = writeln!(self.log, "{now}\t{raw}") {
            warn!(session_id = self.session_id, error = %err, "failed to write session log line");
        }

        let Ok(value) = serde_json::from_str::<serde_json::Value>(raw) else {
            // Stderr noise or partial output: keep it in the log file only.
            counter!("stream_non_json_lines_total").increment(1);
            debug!(session_id = self.session_id, line = raw, "non-JSON stream line");
            return;
        };

        self.hub.publish(self.session_id, Channel::Raw, raw);

        let event = AgentEvent::from_value(&value);
        if let AgentEvent::Unknown { event_type } = &event {
            self.unknown_events += 1;
            counter!("stream_unknown_events_total").increment(1);
            debug!(
                session_id = self.session_id,
                event_type, "unknown stream event forwarded raw"
            );
        }

        if let Some(fragment) = format_event(&event) {
            self.hub
                .publish(self.session_id, Channel::Display, &fragment);
        }

        for text in event.text_blocks() {
            for marker in extract_markers(text) {
                self.apply_marker(marker);
            }
        }

        if let AgentEvent::Result(result) = event {
            self.finish_result(result);
        }
    }

    fn apply_marker(&mut self, marker: Marker) {
        match marker {
            Marker::Event {
                level,
                service,
                message,
            } => {
                if let Err(err) = self.store.insert_event(
                    Some(self.session_id),
                    level.as_str(),
                    service.as_deref(),
                    &message,
                ) {
                    warn!(session_id = self.session_id, error = %err, "failed to persist event marker");
                }
                // Service-scoped events double as health observations: info
                // feeds the healthy streak, warning/critical zero it.
                if let Some(service) = &service {
                    let healthy = level == vigil_core::marker::EventLevel::Info;
                    if let Err(err) = self.cooldown.record_health(service, healthy) {
                        warn!(session_id = self.session_id, error = %err, "failed to record health observation");
                    }
                }
            }
            Marker::Memory {
                category,
                service,
                observation,
            } => {
                if let Err(err) = self.memory.upsert(
                    service.as_deref(),
                    category.as_str(),
                    &observation,
                    Some(self.session_id),
                    self.tier,
                ) {
                    warn!(session_id = self.session_id, error = %err, "failed to persist memory marker");
                }
            }
            Marker::Cooldown {
                kind,
                service,
                success,
                message,
            } => {
                debug!(
                    session_id = self.session_id,
                    service = %service,
                    kind = kind.as_str(),
                    success,
                    message = %message,
                    "cooldown marker"
                );
                let _ = self
                    .cooldown
                    .record(&service, kind, success, self.tier, Some(self.session_id));
            }
        }
    }

    fn finish_result(&mut self, result: ResultEvent) {
        if let Err(err) = self.store.set_session_result(
            self.session_id,
            result.result.as_deref(),
            result.total_cost_usd,
            result.num_turns,
            result.duration_ms,
        ) {
            warn!(session_id = self.session_id, error = %err, "failed to store session result");
        }
        self.result = Some(result);
        if let Err(err) = self.log.flush() {
            warn!(session_id = self.session_id, error = %err, "failed to flush session log");
        }
        self.hub.close(self.session_id);
    }

    /// Flush the log and close hub topics if no terminal event arrived
    /// (crash or timeout paths).
    pub fn finish(&mut self) {
        if let Err(err) = self.log.flush() {
            warn!(session_id = self.session_id, error = %err, "failed to flush session log");
        }
        if self.result.is_none() {
            self.hub.close(self.session_id);
        }
    }

    /// The terminal result event, once seen.
    #[must_use]
    pub fn result(&self) -> Option<&ResultEvent> {
        self.result.as_ref()
    }

    /// How many unknown event types were forwarded.
    #[must_use]
    pub fn unknown_event_count(&self) -> u64 {
        self.unknown_events
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
