//! Ollama-compatible surface.
//!
//! Same capability as the OpenAI family (trigger a session, stream its
//! output), shaped like Ollama's API: NDJSON chunks with `message` /
//! `response` fields and a terminal `done: true` object.

use std::sync::Arc;

use axum::Json;
use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, header};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use serde_json::{Value, json};

use vigil_core::session::TriggerKind;
use vigil_hub::Channel;
use vigil_stream::{AgentEvent, ContentBlock};

use crate::auth::require_bearer;
use crate::errors::ApiError;
use crate::routes::openai::{ChatMessage, last_user_prompt, tier_for_model};
use crate::state::AppState;

/// `GET /api/version`
pub async fn version() -> Json<Value> {
    Json(json!({"version": env!("CARGO_PKG_VERSION")}))
}

/// `GET /api/tags` — the same four models the OpenAI surface advertises.
pub async fn tags() -> Json<Value> {
    let models: Vec<Value> = crate::routes::openai::MODEL_IDS
        .iter()
        .map(|id| {
            json!({
                "name": format!("{id}:latest"),
                "model": format!("{id}:latest"),
                "modified_at": "2025-01-01T00:00:00Z",
                "size": 0,
                "digest": "",
                "details": {"family": "claude-ops"},
            })
        })
        .collect();
    Json(json!({"models": models}))
}

#[derive(Deserialize)]
pub struct OllamaChatBody {
    #[serde(default)]
    model: Option<String>,
    messages: Vec<ChatMessage>,
    /// Ollama streams by default.
    #[serde(default = "default_stream")]
    stream: bool,
}

#[derive(Deserialize)]
pub struct OllamaGenerateBody {
    #[serde(default)]
    model: Option<String>,
    prompt: String,
    #[serde(default = "default_stream")]
    stream: bool,
}

fn default_stream() -> bool {
    true
}

/// Which wire field carries the text on this endpoint family.
#[derive(Clone, Copy)]
enum Shape {
    /// `/api/chat` — `message.content`.
    Chat,
    /// `/api/generate` — `response`.
    Generate,
}

fn delta_object(shape: Shape, model: &str, text: &str, done: bool) -> Value {
    let created_at = chrono::Utc::now().to_rfc3339();
    match shape {
        Shape::Chat => json!({
            "model": model,
            "created_at": created_at,
            "message": {"role": "assistant", "content": text},
            "done": done,
        }),
        Shape::Generate => json!({
            "model": model,
            "created_at": created_at,
            "response": text,
            "done": done,
        }),
    }
}

async fn run(
    state: AppState,
    model: String,
    prompt: String,
    stream: bool,
    shape: Shape,
) -> Result<Response, ApiError> {
    let tier = tier_for_model(&model);
    let session_id = state
        .control
        .trigger_ad_hoc(&prompt, tier, TriggerKind::Api)?;
    let (mut rx, guard) = state.control.subscribe(session_id, Channel::Raw);
    // Same race as the OpenAI surface: the topic may already be closed.
    let already_done = terminal_response(&state, session_id);

    if stream {
        let ndjson = async_stream::stream! {
            let _guard = guard;
            if let Some(text) = already_done {
                let chunk = delta_object(shape, &model, &text, false);
                yield Ok::<_, std::convert::Infallible>(format!("{chunk}\n"));
                let mut done = delta_object(shape, &model, "", true);
                if let Some(obj) = done.as_object_mut() {
                    let _ = obj.insert("done_reason".to_string(), json!("stop"));
                }
                yield Ok(format!("{done}\n"));
                return;
            }
            while let Some(line) = rx.recv().await {
                let Ok(value) = serde_json::from_str::<Value>(&line) else {
                    continue;
                };
                match AgentEvent::from_value(&value) {
                    AgentEvent::Assistant { blocks } => {
                        for block in blocks {
                            if let ContentBlock::Text { text } = block {
                                if !text.is_empty() {
                                    let chunk = delta_object(shape, &model, &text, false);
                                    yield Ok::<_, std::convert::Infallible>(format!("{chunk}\n"));
                                }
                            }
                        }
                    }
                    AgentEvent::Result(_) => break,
                    _ => {}
                }
            }
            let mut done = delta_object(shape, &model, "", true);
            if let Some(obj) = done.as_object_mut() {
                let _ = obj.insert("done_reason".to_string(), json!("stop"));
            }
            yield Ok(format!("{done}\n"));
        };
        Ok((
            [(header::CONTENT_TYPE, "application/x-ndjson")],
            Body::from_stream(ndjson),
        )
            .into_response())
    } else {
        let text = match already_done {
            Some(text) => text,
            None => final_response(&state, session_id, rx).await,
        };
        drop(guard);
        let mut body = delta_object(shape, &model, &text, true);
        if let Some(obj) = body.as_object_mut() {
            let _ = obj.insert("done_reason".to_string(), json!("stop"));
        }
        Ok(Json(body).into_response())
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

async fn final_response(
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

/// `POST /api/chat`
pub async fn chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<OllamaChatBody>,
) -> Result<Response, ApiError> {
    require_bearer(&headers, &state.settings.snapshot())?;
    let prompt = last_user_prompt(&body.messages)
        .ok_or_else(|| ApiError::BadRequest("no user message in request".into()))?;
    let model = body.model.unwrap_or_else(|| "claude-ops".to_string());
    run(state, model, prompt, body.stream, Shape::Chat).await
}

/// `POST /api/generate`
pub async fn generate(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<OllamaGenerateBody>,
) -> Result<Response, ApiError> {
    require_bearer(&headers, &state.settings.snapshot())?;
    if body.prompt.trim().is_empty() {
        return Err(ApiError::BadRequest("prompt must not be empty".into()));
    }
    let model = body.model.unwrap_or_else(|| "claude-ops".to_string());
    run(state, model, body.prompt, body.stream, Shape::Generate).await
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_delta_shape() {
        let value = delta_object(Shape::Chat, "claude-ops", "hello", false);
        assert_eq!(value["message"]["content"], "hello");
        assert_eq!(value["done"], false);
        assert!(value.get("response").is_none());
    }

    #[test]
    fn generate_delta_shape() {
        let value = delta_object(Shape::Generate, "claude-ops", "hello", true);
        assert_eq!(value["response"], "hello");
        assert_eq!(value["done"], true);
        assert!(value.get("message").is_none());
    }

    #[tokio::test]
    async fn version_reports_package_version() {
        let Json(value) = version().await;
        assert_eq!(value["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn tags_lists_four_models() {
        let Json(value) = tags().await;
        let models = value["models"].as_array().unwrap();
        assert_eq!(models.len(), 4);
        assert_eq!(models[0]["name"], "claude-ops:latest");
    }
}
