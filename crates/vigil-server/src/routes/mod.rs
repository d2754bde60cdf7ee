//! Router assembly.

use axum::Router;
use axum::extract::State;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub mod api;
pub mod dashboard;
pub mod ollama;
pub mod openai;
pub mod webhook;

async fn metrics_endpoint(State(state): State<AppState>) -> String {
    state
        .prometheus
        .as_ref()
        .map(metrics_exporter_prometheus::PrometheusHandle::render)
        .unwrap_or_default()
}

/// Build the full router over the shared state.
pub fn router(state: AppState) -> Router {
    Router::new()
        // Dashboard (HTML)
        .route("/", get(dashboard::overview))
        .route("/sessions", get(dashboard::sessions))
        .route("/sessions/trigger", post(dashboard::trigger))
        .route("/sessions/{id}", get(dashboard::session_detail))
        .route("/sessions/{id}/stream", get(dashboard::session_stream))
        .route("/events", get(dashboard::events))
        .route("/memories", get(dashboard::memories).post(dashboard::memory_create))
        .route("/memories/{id}/update", post(dashboard::memory_update))
        .route("/memories/{id}/delete", post(dashboard::memory_delete))
        .route("/cooldowns", get(dashboard::cooldowns))
        .route("/config", get(dashboard::config).post(dashboard::config_update))
        // JSON API v1
        .route("/api/v1/health", get(api::health))
        .route("/api/v1/sessions", get(api::list_sessions))
        .route("/api/v1/sessions/trigger", post(api::trigger_session))
        .route("/api/v1/sessions/{id}", get(api::get_session))
        .route("/api/v1/events", get(api::list_events))
        .route("/api/v1/memories", get(api::list_memories).post(api::create_memory))
        .route(
            "/api/v1/memories/{id}",
            get(api::get_memory)
                .put(api::update_memory)
                .delete(api::delete_memory),
        )
        .route("/api/v1/cooldowns", get(api::cooldowns))
        .route("/api/v1/config", get(api::get_config).put(api::put_config))
        .route("/api/v1/webhook", post(webhook::receive))
        // OpenAI-compatible
        .route("/v1/models", get(openai::models))
        .route("/v1/chat/completions", post(openai::chat_completions))
        // Ollama-compatible
        .route("/api/version", get(ollama::version))
        .route("/api/tags", get(ollama::tags))
        .route("/api/chat", post(ollama::chat))
        .route("/api/generate", post(ollama::generate))
        // Observability
        .route("/metrics", get(metrics_endpoint))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
