//! JSON API v1.
//!
//! All responses are JSON. Write endpoints take JSON bodies — axum's `Json`
//! extractor already answers 415 for a wrong media type and 400 for a
//! malformed body, which is exactly the contract.

use std::collections::BTreeMap;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use serde::Deserialize;
use serde_json::{Value, json};

use vigil_core::session::TriggerKind;
use vigil_core::tier::Tier;
use vigil_store::repositories::event::ListEventsOptions;
use vigil_store::repositories::memory::UpdateMemoryOptions;
use vigil_store::repositories::session::ListSessionsOptions;

use crate::errors::ApiError;
use crate::state::AppState;

/// `GET /api/v1/health`
pub async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "busy": state.control.is_busy(),
    }))
}

#[derive(Deserialize)]
pub struct SessionListQuery {
    limit: Option<i64>,
    offset: Option<i64>,
    status: Option<String>,
}

/// `GET /api/v1/sessions?limit=&offset=&status=`
pub async fn list_sessions(
    State(state): State<AppState>,
    Query(query): Query<SessionListQuery>,
) -> Result<Json<Value>, ApiError> {
    let sessions = state.store.list_sessions(&ListSessionsOptions {
        status: query.status.as_deref(),
        limit: query.limit,
        offset: query.offset,
    })?;
    Ok(Json(json!({"sessions": sessions})))
}

/// `GET /api/v1/sessions/{id}` — session plus parent, children, chain cost.
pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    let session = state
        .store
        .get_session(id)?
        .ok_or(ApiError::NotFound("session"))?;
    let parent = match session.parent_id {
        Some(parent_id) => state.store.get_session(parent_id)?,
        None => None,
    };
    let children = state.store.session_children(id)?;
    let chain_cost = state.store.session_chain_cost(id)?;
    Ok(Json(json!({
        "session": session,
        "parent": parent,
        "children": children,
        "chainCost": chain_cost,
    })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerBody {
    prompt: String,
    #[serde(default)]
    tier: Option<u8>,
}

/// `POST /api/v1/sessions/trigger` — 201 with the new session, 409 on busy.
pub async fn trigger_session(
    State(state): State<AppState>,
    Json(body): Json<TriggerBody>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    if body.prompt.trim().is_empty() {
        return Err(ApiError::BadRequest("prompt must not be empty".into()));
    }
    let tier = body
        .tier
        .map(|n| {
            Tier::from_u8(n.clamp(1, Tier::MAX.as_u8()))
                .unwrap_or(Tier::One)
        })
        .unwrap_or(Tier::One);

    let id = state
        .control
        .trigger_ad_hoc(&body.prompt, tier, TriggerKind::Api)
        .map_err(|err| match err {
            // The chat surfaces answer 429; this endpoint contracts 409.
            vigil_runtime::RuntimeError::AlreadyRunning => ApiError::Conflict,
            other => other.into(),
        })?;
    let session = state
        .store
        .get_session(id)?
        .ok_or(ApiError::NotFound("session"))?;
    Ok((StatusCode::CREATED, Json(json!({"session": session}))))
}

#[derive(Deserialize)]
pub struct EventListQuery {
    level: Option<String>,
    service: Option<String>,
    limit: Option<i64>,
    offset: Option<i64>,
}

/// `GET /api/v1/events?level=&service=&limit=&offset=`
pub async fn list_events(
    State(state): State<AppState>,
    Query(query): Query<EventListQuery>,
) -> Result<Json<Value>, ApiError> {
    let events = state.store.list_events(&ListEventsOptions {
        level: query.level.as_deref(),
        service: query.service.as_deref(),
        limit: query.limit,
        offset: query.offset,
    })?;
    Ok(Json(json!({"events": events})))
}

#[derive(Deserialize)]
pub struct MemoryListQuery {
    #[serde(default)]
    include_inactive: bool,
}

/// `GET /api/v1/memories?include_inactive=`
pub async fn list_memories(
    State(state): State<AppState>,
    Query(query): Query<MemoryListQuery>,
) -> Result<Json<Value>, ApiError> {
    let memories = state.store.list_memories(query.include_inactive)?;
    Ok(Json(json!({"memories": memories})))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMemoryBody {
    service: Option<String>,
    category: String,
    observation: String,
}

/// `POST /api/v1/memories` — operator-created memory, through the same
/// upsert pipeline as the parser so the one-active-per-pair invariant holds.
pub async fn create_memory(
    State(state): State<AppState>,
    Json(body): Json<CreateMemoryBody>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    if vigil_core::marker::MemoryCategory::parse(&body.category).is_none() {
        return Err(ApiError::BadRequest(format!(
            "unknown category {:?}",
            body.category
        )));
    }
    if body.observation.trim().is_empty() {
        return Err(ApiError::BadRequest("observation must not be empty".into()));
    }
    let outcome = state
        .memory
        .upsert(
            body.service.as_deref(),
            &body.category,
            &body.observation,
            None,
            Tier::One.as_u8(),
        )
        .map_err(|err| match err {
            vigil_memory::MemoryError::Store(store) => ApiError::Database(store),
            other => ApiError::BadRequest(other.to_string()),
        })?;

    let id = match outcome {
        vigil_memory::UpsertOutcome::Created { id }
        | vigil_memory::UpsertOutcome::Reinforced { id, .. } => id,
    };
    let memory = state
        .store
        .get_memory(id)?
        .ok_or(ApiError::NotFound("memory"))?;
    Ok((StatusCode::CREATED, Json(json!({"memory": memory}))))
}

/// `GET /api/v1/memories/{id}`
pub async fn get_memory(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    let memory = state
        .store
        .get_memory(id)?
        .ok_or(ApiError::NotFound("memory"))?;
    Ok(Json(json!({"memory": memory})))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMemoryBody {
    observation: Option<String>,
    confidence: Option<f64>,
    active: Option<bool>,
}

/// `PUT /api/v1/memories/{id}` — partial update.
pub async fn update_memory(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<UpdateMemoryBody>,
) -> Result<Json<Value>, ApiError> {
    let changed = state.store.update_memory(
        id,
        &UpdateMemoryOptions {
            observation: body.observation.as_deref(),
            confidence: body.confidence,
            active: body.active,
        },
    )?;
    if !changed {
        return Err(ApiError::NotFound("memory"));
    }
    let memory = state
        .store
        .get_memory(id)?
        .ok_or(ApiError::NotFound("memory"))?;
    Ok(Json(json!({"memory": memory})))
}

/// `DELETE /api/v1/memories/{id}`
pub async fn delete_memory(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    if state.store.delete_memory(id)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound("memory"))
    }
}

/// `GET /api/v1/cooldowns` — file snapshot first (authoritative for the
/// view), table summary alongside.
pub async fn cooldowns(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let file = state.cooldown.snapshot().ok();
    let since = (chrono::Utc::now() - chrono::Duration::hours(24)).to_rfc3339();
    let recent = state.store.cooldown_summary_since(&since)?;
    let actions = state.store.recent_cooldown_actions(50)?;
    Ok(Json(json!({
        "file": file,
        "recent": recent,
        "actions": actions,
    })))
}

/// `GET /api/v1/config` — live settings plus the persisted entries.
pub async fn get_config(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let settings = state.settings.snapshot();
    let entries = state.store.all_config()?;
    Ok(Json(json!({"settings": settings, "entries": entries})))
}

/// `PUT /api/v1/config` — partial body of key/value strings. Each key is
/// applied to the live handle and persisted, so edits survive restarts.
pub async fn put_config(
    State(state): State<AppState>,
    Json(body): Json<BTreeMap<String, String>>,
) -> Result<Json<Value>, ApiError> {
    if body.is_empty() {
        return Err(ApiError::BadRequest("no settings in body".into()));
    }
    // Validate everything before applying anything.
    {
        let mut probe = state.settings.snapshot();
        for (key, value) in &body {
            probe
                .apply_kv(key, value)
                .map_err(|err| ApiError::BadRequest(err.to_string()))?;
        }
    }
    for (key, value) in &body {
        state.settings.apply(|s| {
            let _ = s.apply_kv(key, value);
        });
        state.store.set_config(key, value)?;
    }
    let settings = state.settings.snapshot();
    Ok(Json(json!({"settings": settings})))
}
