//! OpenAI-compatible chat surface.
//!
//! Any OpenAI chat client can point at the supervisor and trigger a session:
//! the last `user` message becomes the prompt (older messages are
//! intentionally ignored — sessions are stateless), and the model id picks
//! the starting tier. Responses come back either as OpenAI-shaped SSE chunks
//! or as one synchronous completion built from the session's final response.

use std::convert::Infallible;
use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use futures::Stream;
use serde::Deserialize;
use serde_json::{Value, json};

use vigil_core::session::TriggerKind;
use vigil_core::tier::Tier;
use vigil_hub::Channel;
use vigil_stream::{AgentEvent, ContentBlock};

use crate::auth::require_bearer;
use crate::errors::ApiError;
use crate::state::AppState;

/// The four advertised model ids, in fixed order.
pub const MODEL_IDS: [&str; 4] = [
    "claude-ops",
    "claude-ops-tier1",
    "claude-ops-tier2",
    "claude-ops-tier3",
];

/// Fixed `created` stamp for the advertised models.
const MODELS_CREATED: i64 = 1_735_689_600; // 2025-01-01T00:00:00Z

/// Map a requested model id to a starting tier. Unknown ids run at tier 1.
#[must_use]
pub fn tier_for_model(model: &str) -> Tier {
    if model.ends_with("tier3") {
        Tier::Three
    } else if model.ends_with("tier2") {
        Tier::Two
    } else {
        Tier::One
    }
}

/// One incoming chat message. `content` is a string or an array of parts.
#[derive(Deserialize)]
pub struct ChatMessage {
    /// Message role.
    pub role: String,
    /// Message content.
    pub content: Value,
}

fn content_text(content: &Value) -> String {
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

/// The prompt is the last `user` message; everything older is ignored.
#[must_use]
pub fn last_user_prompt(messages: &[ChatMessage]) -> Option<String> {
    messages
        .iter()
        .rev()
        .find(|m| m.role == "user")
        .map(|m| content_text(&m.content))
        .filter(|text| !text.trim().is_empty())
}

/// `GET /v1/models` — the four ids, always in the same order.
pub async fn models() -> Json<Value> {
    let data: Vec<Value> = MODEL_IDS
        .iter()
        .map(|id| {
            json!({
                "id": id,
                "object": "model",
                "created": MODELS_CREATED,
                "owned_by": "vigil",
            })
        })
        .collect();
    Json(json!({"object": "list", "data": data}))
}

#[derive(Deserialize)]
pub struct ChatCompletionBody {
    #[serde(default)]
    model: Option<String>,
    messages: Vec<ChatMessage>,
    #[serde(default)]
    stream: bool,
}

fn completion_id(session_id: i64) -> String {
    format!("chatcmpl-vigil-{session_id}")
}

fn chunk(session_id: i64, model: &str, delta: Value, finish: Option<&str>) -> Value {
    json!({
        "id": completion_id(session_id),
        "object": "chat.completion.chunk",
        "created": chrono::Utc::now().timestamp(),
        "model": model,
        "choices": [{
            "index": 0,
            "delta": delta,
            "finish_reason": finish,
        }],
    })
}

/// `POST /v1/chat/completions`.
pub async fn chat_completions(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<ChatCompletionBody>,
) -> Result<Response, ApiError> {
    require_bearer(&headers, &state.settings.snapshot())?;

    let prompt = last_user_prompt(&body.messages)
        .ok_or_else(|| ApiError::BadRequest("no user message in request".into()))?;
    let model = body.model.unwrap_or_else(|| "claude-ops".to_string());
    let tier = tier_for_model(&model);

    let session_id = state
        .control
        .trigger_ad_hoc(&prompt, tier, TriggerKind::Api)?;
    let (rx, guard) = state.control.subscribe(session_id, Channel::Raw);
    // The session can finish before we subscribe (fast failures close the
    // topic and the replay buffer with it) — short-circuit on terminal rows.
    let already_done = terminal_response(&state, session_id);

    if body.stream {
        let stream = sse_stream(session_id, model, rx, guard, already_done);
        Ok(Sse::new(stream)
            .keep_alive(KeepAlive::new().interval(std::time::Duration::from_secs(15)))
            .into_response())
    } else {
        let text = match already_done {
            Some(text) => text,
            None => collect_final_response(&state, session_id, rx).await,
        };
        drop(guard);
        Ok(Json(json!({
            "id": completion_id(session_id),
            "object": "chat.completion",
            "created": chrono::Utc::now().timestamp(),
            "model": model,
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": text},
                "finish_reason": "stop",
            }],
        }))
        .into_response())
    }
}

/// The stored final response of an already-terminal session, if any.
fn terminal_response(state: &AppState, session_id: i64) -> Option<String> {
    let session = state.store.get_session(session_id).ok().flatten()?;
    if session.status == "running" {
        return None;
    }
    Some(
        session
            .response
            .unwrap_or_else(|| "(session produced no final response)".to_string()),
    )
}

/// Drain the raw stream until the terminal result; fall back to the stored
/// session row when the topic closes without one.
async fn collect_final_response(
    state: &AppState,
    session_id: i64,
    mut rx: tokio::sync::mpsc::Receiver<Arc<String>>,
) -> String {
    while let Some(line) = rx.recv().await {
        let Ok(value) = serde_json::from_str::<Value>(&line) else {
            continue;
        };
        if let AgentEvent::Result(result) = AgentEvent::from_value(&value) {
            if let Some(text) = result.result {
                return text;
            }
            break;
        }
    }
    state
        .store
        .get_session(session_id)
        .ok()
        .flatten()
        .and_then(|s| s.response)
        .unwrap_or_else(|| "(session produced no final response)".to_string())
}

/// Map raw stream lines to OpenAI-shaped SSE chunks. Assistant text becomes
/// content deltas, tool invocations become `tool_calls` deltas, and the
/// terminal result yields a stop chunk followed by `[DONE]`.
fn sse_stream(
    session_id: i64,
    model: String,
    mut rx: tokio::sync::mpsc::Receiver<Arc<String>>,
    guard: vigil_hub::SubscriptionGuard,
    already_done: Option<String>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    async_stream::stream! {
        let _guard = guard;
        let mut tool_call_index = 0u32;

        yield Ok(Event::default().data(
            chunk(session_id, &model, json!({"role": "assistant"}), None).to_string(),
        ));

        if let Some(text) = already_done {
            yield Ok(Event::default().data(
                chunk(session_id, &model, json!({"content": text}), None).to_string(),
            ));
            yield Ok(Event::default().data(
                chunk(session_id, &model, json!({}), Some("stop")).to_string(),
            ));
            yield Ok(Event::default().data("[DONE]"));
            return;
        }

        while let Some(line) = rx.recv().await {
            let Ok(value) = serde_json::from_str::<Value>(&line) else {
                continue;
            };
            match AgentEvent::from_value(&value) {
                AgentEvent::Assistant { blocks } => {
                    for block in blocks {
                        match block {
                            ContentBlock::Text { text } if !text.is_empty() => {
                                yield Ok(Event::default().data(
                                    chunk(session_id, &model, json!({"content": text}), None)
                                        .to_string(),
                                ));
                            }
                            ContentBlock::ToolUse { name, input } => {
                                let delta = json!({
                                    "tool_calls": [{
                                        "index": tool_call_index,
                                        "id": format!("call_{session_id}_{tool_call_index}"),
                                        "type": "function",
                                        "function": {
                                            "name": name,
                                            "arguments": input.to_string(),
                                        },
                                    }],
                                });
                                tool_call_index += 1;
                                yield Ok(Event::default().data(
                                    chunk(session_id, &model, delta, None).to_string(),
                                ));
                            }
                            _ => {}
                        }
                    }
                }
                AgentEvent::Result(_) => break,
                _ => {}
            }
        }

        yield Ok(Event::default().data(
            chunk(session_id, &model, json!({}), Some("stop")).to_string(),
        ));
        yield Ok(Event::default().data("[DONE]"));
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_mapping() {
        assert_eq!(tier_for_model("claude-ops-tier1"), Tier::One);
        assert_eq!(tier_for_model("claude-ops-tier2"), Tier::Two);
        assert_eq!(tier_for_model("claude-ops-tier3"), Tier::Three);
        assert_eq!(tier_for_model("claude-ops"), Tier::One);
        assert_eq!(tier_for_model("gpt-4o"), Tier::One);
    }

    #[test]
    fn last_user_message_wins() {
        let messages = vec![
            ChatMessage {
                role: "system".into(),
                content: json!("be helpful"),
            },
            ChatMessage {
                role: "user".into(),
                content: json!("old question"),
            },
            ChatMessage {
                role: "assistant".into(),
                content: json!("old answer"),
            },
            ChatMessage {
                role: "user".into(),
                content: json!("check jellyfin"),
            },
        ];
        assert_eq!(last_user_prompt(&messages).unwrap(), "check jellyfin");
    }

    #[test]
    fn content_parts_joined() {
        let messages = vec![ChatMessage {
            role: "user".into(),
            content: json!([
                {"type": "text", "text": "part one"},
                {"type": "text", "text": "part two"}
            ]),
        }];
        assert_eq!(last_user_prompt(&messages).unwrap(), "part one\npart two");
    }

    #[test]
    fn no_user_message_is_none() {
        let messages = vec![ChatMessage {
            role: "assistant".into(),
            content: json!("hello"),
        }];
        assert!(last_user_prompt(&messages).is_none());
        assert!(last_user_prompt(&[]).is_none());
    }

    #[tokio::test]
    async fn models_fixed_order() {
        let Json(first) = models().await;
        let Json(second) = models().await;

        let ids: Vec<&str> = first["data"]
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["id"].as_str().unwrap())
            .collect();
        assert_eq!(
            ids,
            vec![
                "claude-ops",
                "claude-ops-tier1",
                "claude-ops-tier2",
                "claude-ops-tier3"
            ]
        );
        assert_eq!(first["data"], second["data"]);
    }

    #[test]
    fn chunk_shape() {
        let value = chunk(7, "claude-ops-tier2", json!({"content": "hi"}), None);
        assert_eq!(value["object"], "chat.completion.chunk");
        assert_eq!(value["model"], "claude-ops-tier2");
        assert_eq!(value["choices"][0]["delta"]["content"], "hi");
        assert!(value["choices"][0]["finish_reason"].is_null());

        let done = chunk(7, "claude-ops", json!({}), Some("stop"));
        assert_eq!(done["choices"][0]["finish_reason"], "stop");
    }
}
