//! Compact display formatting for the dashboard stream.
//!
//! One stream event becomes at most one short text fragment. HTML escaping
//! is the server's job; these fragments are plain text.

use serde_json::Value;

use vigil_core::text::truncate_with_suffix;

use crate::events::{AgentEvent, ContentBlock};

/// Longest fragment we will emit for a single event.
const MAX_FRAGMENT_BYTES: usize = 500;

fn summarize_tool_input(name: &str, input: &Value) -> String {
    // Surface the most recognisable argument per tool; fall back to
    // compact JSON.
    let detail = input
        .get("command")
        .or_else(|| input.get("file_path"))
        .or_else(|| input.get("path"))
        .or_else(|| input.get("pattern"))
        .or_else(|| input.get("url"))
        .and_then(Value::as_str)
        .map_or_else(|| input.to_string(), String::from);
    format!("→ {name}: {detail}")
}

/// Format one classified event for the display topic. `None` means the
/// event produces no visible fragment.
#[must_use]
pub fn format_event(event: &AgentEvent) -> Option<String> {
    let fragment = match event {
        AgentEvent::System { subtype } => match subtype.as_deref() {
            Some("init") => "⚙ session initialized".to_string(),
            Some(other) => format!("⚙ {other}"),
            None => "⚙ system".to_string(),
        },
        AgentEvent::Assistant { blocks } => {
            let mut parts = Vec::new();
            for block in blocks {
                match block {
                    ContentBlock::Text { text } => {
                        let trimmed = text.trim();
                        if !trimmed.is_empty() {
                            parts.push(trimmed.to_string());
                        }
                    }
                    ContentBlock::Thinking => parts.push("… thinking".to_string()),
                    ContentBlock::ToolUse { name, input } => {
                        parts.push(summarize_tool_input(name, input));
                    }
                }
            }
            if parts.is_empty() {
                return None;
            }
            parts.join("\n")
        }
        AgentEvent::User { results } => {
            if results.is_empty() {
                return None;
            }
            results
                .iter()
                .map(|r| {
                    if r.is_error {
                        format!("✗ tool error: {}", r.content.trim())
                    } else if r.content.trim().is_empty() {
                        "✓ tool ok".to_string()
                    } else {
                        format!("✓ {}", first_line(&r.content))
                    }
                })
                .collect::<Vec<_>>()
                .join("\n")
        }
        AgentEvent::Result(result) => {
            let turns = result
                .num_turns
                .map_or_else(|| "?".to_string(), |n| n.to_string());
            let cost = result
                .total_cost_usd
                .map_or_else(|| "$?".to_string(), |c| format!("${c:.4}"));
            let secs = result
                .duration_ms
                .map_or_else(|| "?s".to_string(), |ms| format!("{:.0}s", ms as f64 / 1000.0));
            if result.is_error {
                format!("■ finished with error · {turns} turns · {cost} · {secs}")
            } else {
                format!("■ finished · {turns} turns · {cost} · {secs}")
            }
        }
        AgentEvent::Unknown { .. } => return None,
    };
    Some(truncate_with_suffix(&fragment, MAX_FRAGMENT_BYTES, "…"))
}

fn first_line(s: &str) -> &str {
    s.trim().lines().next().unwrap_or("")
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
