//! Typed model of the subprocess event stream.
//!
//! The agent CLI emits one JSON object per stdout line, tagged by `type`:
//! `system` (with a `subtype`), `assistant` (a message with content blocks),
//! `user` (tool results coming back), and the terminal `result` carrying
//! cost/turns/duration. Anything else is preserved as [`AgentEvent::Unknown`]
//! so new CLI versions cannot break the supervisor.

use serde::Deserialize;
use serde_json::Value;

/// One content block inside an assistant message.
#[derive(Clone, Debug, PartialEq)]
pub enum ContentBlock {
    /// Plain assistant text (scanned for markers).
    Text {
        /// The text.
        text: String,
    },
    /// Extended-thinking block (shown, never scanned).
    Thinking,
    /// A tool invocation.
    ToolUse {
        /// Tool name.
        name: String,
        /// Tool input object.
        input: Value,
    },
}

/// A tool result block inside a `user` event.
#[derive(Clone, Debug, PartialEq)]
pub struct ToolResultBlock {
    /// Result content, flattened to text.
    pub content: String,
    /// Whether the tool reported an error.
    pub is_error: bool,
}

/// The terminal `result` event.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct ResultEvent {
    /// Whether the run ended in error.
    #[serde(default)]
    pub is_error: bool,
    /// Final response text.
    #[serde(default)]
    pub result: Option<String>,
    /// Conversation turns.
    #[serde(default)]
    pub num_turns: Option<i64>,
    /// Total cost in USD.
    #[serde(default)]
    pub total_cost_usd: Option<f64>,
    /// Wall-clock duration in milliseconds.
    #[serde(default)]
    pub duration_ms: Option<i64>,
}

/// One classified stream event.
#[derive(Clone, Debug, PartialEq)]
pub enum AgentEvent {
    /// Lifecycle notice from the CLI itself.
    System {
        /// e.g. `init`.
        subtype: Option<String>,
    },
    /// Assistant message with content blocks.
    Assistant {
        /// The blocks, in message order.
        blocks: Vec<ContentBlock>,
    },
    /// Tool results flowing back to the model.
    User {
        /// The tool result blocks.
        results: Vec<ToolResultBlock>,
    },
    /// Terminal event; exactly one per session.
    Result(ResultEvent),
    /// Unrecognised `type` tag — forwarded raw, counted, never fatal.
    Unknown {
        /// The tag we did not recognise.
        event_type: String,
    },
}

fn parse_content_blocks(message: &Value) -> Vec<ContentBlock> {
    let Some(content) = message.get("content").and_then(Value::as_array) else {
        return Vec::new();
    };
    content
        .iter()
        .filter_map(|block| match block.get("type").and_then(Value::as_str) {
            Some("text") => Some(ContentBlock::Text {
                text: block
                    .get("text")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            }),
            Some("thinking") => Some(ContentBlock::Thinking),
            Some("tool_use") => Some(ContentBlock::ToolUse {
                name: block
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown")
                    .to_string(),
                input: block.get("input").cloned().unwrap_or(Value::Null),
            }),
            _ => None,
        })
        .collect()
}

fn flatten_tool_content(content: &Value) -> String {
    match content {
        Value::String(s) => s.clone(),
        Value::Array(parts) => parts
            .iter()
            .filter_map(|p| p.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("\n"),
        _ => String::new(),
    }
}

fn parse_tool_results(message: &Value) -> Vec<ToolResultBlock> {
    let Some(content) = message.get("content").and_then(Value::as_array) else {
        return Vec::new();
    };
    content
        .iter()
        .filter(|block| block.get("type").and_then(Value::as_str) == Some("tool_result"))
        .map(|block| ToolResultBlock {
            content: block
                .get("content")
                .map(flatten_tool_content)
                .unwrap_or_default(),
            is_error: block
                .get("is_error")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        })
        .collect()
}

impl AgentEvent {
    /// Classify one already-decoded stream event.
    #[must_use]
    pub fn from_value(value: &Value) -> AgentEvent {
        let event_type = value.get("type").and_then(Value::as_str).unwrap_or("");
        match event_type {
            "system" => AgentEvent::System {
                subtype: value
                    .get("subtype")
                    .and_then(Value::as_str)
                    .map(String::from),
            },
            "assistant" => AgentEvent::Assistant {
                blocks: value
                    .get("message")
                    .map(parse_content_blocks)
                    .unwrap_or_default(),
            },
            "user" => AgentEvent::User {
                results: value
                    .get("message")
                    .map(parse_tool_results)
                    .unwrap_or_default(),
            },
            "result" => AgentEvent::Result(
                serde_json::from_value(value.clone()).unwrap_or_default(),
            ),
            other => AgentEvent::Unknown {
                event_type: other.to_string(),
            },
        }
    }

    /// All assistant text blocks (marker-scan input).
    #[must_use]
    pub fn text_blocks(&self) -> Vec<&str> {
        match self {
            AgentEvent::Assistant { blocks } => blocks
                .iter()
                .filter_map(|b| match b {
                    ContentBlock::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn system_event() {
        let value = json!({"type": "system", "subtype": "init", "session_id": "abc"});
        assert_eq!(
            AgentEvent::from_value(&value),
            AgentEvent::System {
                subtype: Some("init".into())
            }
        );
    }

    #[test]
    fn assistant_text_and_tool_use() {
        let value = json!({
            "type": "assistant",
            "message": {"content": [
                {"type": "text", "text": "Checking jellyfin now."},
                {"type": "tool_use", "name": "Bash", "input": {"command": "systemctl status jellyfin"}},
                {"type": "thinking", "thinking": "hmm"}
            ]}
        });
        let event = AgentEvent::from_value(&value);
        let AgentEvent::Assistant { blocks } = &event else {
            panic!("expected assistant");
        };
        assert_eq!(blocks.len(), 3);
        assert_eq!(event.text_blocks(), vec!["Checking jellyfin now."]);
        assert_eq!(
            blocks[1],
            ContentBlock::ToolUse {
                name: "Bash".into(),
                input: json!({"command": "systemctl status jellyfin"}),
            }
        );
        assert_eq!(blocks[2], ContentBlock::Thinking);
    }

    #[test]
    fn user_tool_result_string_content() {
        let value = json!({
            "type": "user",
            "message": {"content": [
                {"type": "tool_result", "content": "active (running)", "is_error": false}
            ]}
        });
        let AgentEvent::User { results } = AgentEvent::from_value(&value) else {
            panic!("expected user");
        };
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].content, "active (running)");
        assert!(!results[0].is_error);
    }

    #[test]
    fn user_tool_result_block_content() {
        let value = json!({
            "type": "user",
            "message": {"content": [
                {"type": "tool_result", "is_error": true,
                 "content": [{"type": "text", "text": "unit not found"}]}
            ]}
        });
        let AgentEvent::User { results } = AgentEvent::from_value(&value) else {
            panic!("expected user");
        };
        assert_eq!(results[0].content, "unit not found");
        assert!(results[0].is_error);
    }

    #[test]
    fn result_event_full() {
        let value = json!({
            "type": "result", "subtype": "success", "is_error": false,
            "result": "All services healthy.", "num_turns": 14,
            "total_cost_usd": 0.0732, "duration_ms": 95_300
        });
        let AgentEvent::Result(result) = AgentEvent::from_value(&value) else {
            panic!("expected result");
        };
        assert!(!result.is_error);
        assert_eq!(result.result.as_deref(), Some("All services healthy."));
        assert_eq!(result.num_turns, Some(14));
        assert_eq!(result.total_cost_usd, Some(0.0732));
        assert_eq!(result.duration_ms, Some(95_300));
    }

    #[test]
    fn result_event_minimal() {
        let value = json!({"type": "result", "is_error": true});
        let AgentEvent::Result(result) = AgentEvent::from_value(&value) else {
            panic!("expected result");
        };
        assert!(result.is_error);
        assert!(result.result.is_none());
        assert!(result.total_cost_usd.is_none());
    }

    #[test]
    fn unknown_type_preserved() {
        let value = json!({"type": "telemetry", "data": 1});
        assert_eq!(
            AgentEvent::from_value(&value),
            AgentEvent::Unknown {
                event_type: "telemetry".into()
            }
        );
    }

    #[test]
    fn missing_type_is_unknown() {
        let value = json!({"hello": "world"});
        assert_eq!(
            AgentEvent::from_value(&value),
            AgentEvent::Unknown {
                event_type: String::new()
            }
        );
    }

    #[test]
    fn malformed_blocks_are_skipped() {
        let value = json!({
            "type": "assistant",
            "message": {"content": [
                {"type": "text"},
                {"no_type": true},
                {"type": "tool_use"}
            ]}
        });
        let AgentEvent::Assistant { blocks } = AgentEvent::from_value(&value) else {
            panic!("expected assistant");
        };
        // Text with missing body still yields an empty text block; the
        // untyped block is dropped; tool_use gets placeholder fields.
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0], ContentBlock::Text { text: String::new() });
        assert_eq!(
            blocks[1],
            ContentBlock::ToolUse {
                name: "unknown".into(),
                input: Value::Null
            }
        );
    }
}
