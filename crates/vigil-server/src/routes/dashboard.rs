//! Dashboard HTML pages.
//!
//! Data model and cadence are the contract here, not the markup: live pages
//! poll every 5 seconds via HTMX, `HX-Request` returns fragments only, and
//! the overview feed merges session milestones, events, and memories —
//! newest first, at most 40 items.

use std::convert::Infallible;

use axum::Form;
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{Html, Redirect};
use futures::Stream;
use serde::Deserialize;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;

use vigil_core::session::TriggerKind;
use vigil_core::tier::Tier;
use vigil_hub::Channel;
use vigil_store::repositories::event::ListEventsOptions;
use vigil_store::repositories::memory::UpdateMemoryOptions;
use vigil_store::repositories::session::ListSessionsOptions;
use vigil_store::row_types::SessionRow;
use vigil_stream::format::format_event;
use vigil_stream::AgentEvent;

use crate::errors::ApiError;
use crate::html::{POLL_SECONDS, escape, page};
use crate::state::AppState;

/// Most items the overview feed will show.
const FEED_LIMIT: usize = 40;

struct FeedItem {
    at: String,
    line: String,
}

fn session_label(session: &SessionRow) -> String {
    format!(
        "<a href=\"/sessions/{id}\">#{id}</a>",
        id = session.id
    )
}

fn tldr(session: &SessionRow) -> String {
    let text = session
        .summary
        .clone()
        .or_else(|| session.response.clone())
        .unwrap_or_else(|| format!("session {} — no response recorded", session.status));
    escape(&vigil_core::text::truncate_with_suffix(&text, 400, "…"))
}

/// `GET /` — activity overview.
pub async fn overview(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Html<String>, ApiError> {
    let latest = state.store.latest_session()?;
    let mut items: Vec<FeedItem> = Vec::new();

    for session in state.store.list_sessions(&ListSessionsOptions {
        limit: Some(20),
        ..Default::default()
    })? {
        items.push(FeedItem {
            at: session.started_at.clone(),
            line: format!(
                "▶ session {} started · tier {} · {}",
                session_label(&session),
                session.tier,
                escape(&session.trigger)
            ),
        });
        if let Some(ended_at) = &session.ended_at {
            items.push(FeedItem {
                at: ended_at.clone(),
                line: format!(
                    "■ session {} {}",
                    session_label(&session),
                    escape(&session.status)
                ),
            });
        }
    }

    for event in state.store.list_events(&ListEventsOptions {
        limit: Some(FEED_LIMIT as i64),
        ..Default::default()
    })? {
        let service = event
            .service
            .as_deref()
            .map(|s| format!("{}: ", escape(s)))
            .unwrap_or_default();
        items.push(FeedItem {
            at: event.created_at.clone(),
            line: format!(
                "<span class=\"{level}\">{level}</span> {service}{message}",
                level = escape(&event.level),
                message = escape(&event.message)
            ),
        });
    }

    for memory in state.store.list_memories(false)?.into_iter().take(FEED_LIMIT) {
        let service = memory.service.as_deref().unwrap_or("general");
        items.push(FeedItem {
            at: memory.updated_at.clone(),
            line: format!(
                "🧠 {} / {} ({:.2}) {}",
                escape(service),
                escape(&memory.category),
                memory.confidence,
                escape(&memory.observation)
            ),
        });
    }

    items.sort_by(|a, b| b.at.cmp(&a.at));
    items.truncate(FEED_LIMIT);

    let tldr_block = latest.as_ref().map_or_else(
        || "<p>No sessions yet.</p>".to_string(),
        |session| {
            format!(
                "<p><strong>Last session {}:</strong> {}</p>",
                session_label(session),
                tldr(session)
            )
        },
    );

    let feed_rows: String = items
        .iter()
        .map(|item| format!("<tr><td>{}</td><td>{}</td></tr>\n", escape(&item.at), item.line))
        .collect();
    let fragment = format!(
        "<div hx-get=\"/\" hx-trigger=\"every {POLL_SECONDS}s\" hx-swap=\"outerHTML\">\n\
         {tldr_block}\n<table>{feed_rows}</table>\n</div>"
    );
    Ok(Html(page(&headers, "Overview", &fragment)))
}

#[derive(Deserialize)]
pub struct FlashQuery {
    flash: Option<String>,
}

/// `GET /sessions` — list with escalation-chain grouping.
pub async fn sessions(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<FlashQuery>,
) -> Result<Html<String>, ApiError> {
    let sessions = state.store.list_sessions(&ListSessionsOptions {
        limit: Some(100),
        ..Default::default()
    })?;

    let mut rows = String::new();
    for session in &sessions {
        // Escalated sessions are chain parents: mark with the arrow.
        let marker = if session.status == "escalated" {
            "↑ "
        } else if session.parent_id.is_some() {
            "└ "
        } else {
            ""
        };
        rows.push_str(&format!(
            "<tr><td>{marker}{label}</td><td>{tier}</td><td>{status}</td><td>{trigger}</td>\
             <td>{started}</td><td>{cost}</td></tr>\n",
            label = session_label(session),
            tier = session.tier,
            status = escape(&session.status),
            trigger = escape(&session.trigger),
            started = escape(&session.started_at),
            cost = session
                .cost_usd
                .map_or_else(String::new, |c| format!("${c:.4}")),
        ));
    }

    let flash = match query.flash.as_deref() {
        Some("busy") => "<p class=\"warning\">A session is already running.</p>",
        _ => "",
    };
    let fragment = format!(
        "{flash}\n<form method=\"post\" action=\"/sessions/trigger\">\n\
         <input name=\"prompt\" placeholder=\"ad-hoc prompt\" size=\"60\">\n\
         <select name=\"tier\"><option>1</option><option>2</option><option>3</option></select>\n\
         <button type=\"submit\">trigger</button>\n</form>\n\
         <div hx-get=\"/sessions\" hx-trigger=\"every {POLL_SECONDS}s\" hx-swap=\"outerHTML\">\n\
         <table><tr><th>id</th><th>tier</th><th>status</th><th>trigger</th>\
         <th>started</th><th>cost</th></tr>\n{rows}</table>\n</div>"
    );
    Ok(Html(page(&headers, "Sessions", &fragment)))
}

#[derive(Deserialize)]
pub struct TriggerForm {
    prompt: String,
    tier: Option<u8>,
}

/// `POST /sessions/trigger` — dashboard form trigger; busy redirects with a
/// flash instead of erroring.
pub async fn trigger(
    State(state): State<AppState>,
    Form(form): Form<TriggerForm>,
) -> Redirect {
    if form.prompt.trim().is_empty() {
        return Redirect::to("/sessions");
    }
    let tier = form
        .tier
        .and_then(Tier::from_u8)
        .unwrap_or(Tier::One);
    match state
        .control
        .trigger_ad_hoc(&form.prompt, tier, TriggerKind::Manual)
    {
        Ok(id) => Redirect::to(&format!("/sessions/{id}")),
        Err(_) => Redirect::to("/sessions?flash=busy"),
    }
}

/// Re-render a session's activity log from its NDJSON log file.
fn activity_log(session: &SessionRow) -> String {
    let Some(log_path) = &session.log_path else {
        return String::new();
    };
    let Ok(raw) = std::fs::read_to_string(log_path) else {
        return String::new();
    };
    raw.lines()
        .rev()
        .take(200)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .filter_map(|line| {
            let (_, json) = line.split_once('\t')?;
            let value = serde_json::from_str::<serde_json::Value>(json).ok()?;
            format_event(&AgentEvent::from_value(&value))
        })
        .map(|fragment| format!("{}\n", escape(&fragment)))
        .collect()
}

/// `GET /sessions/{id}`
pub async fn session_detail(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Html<String>, ApiError> {
    let session = state
        .store
        .get_session(id)?
        .ok_or(ApiError::NotFound("session"))?;
    let children = state.store.session_children(id)?;
    let chain_cost = state.store.session_chain_cost(id)?;

    let mut meta = format!(
        "<table>\
         <tr><th>status</th><td>{status}</td></tr>\
         <tr><th>tier</th><td>{tier}</td></tr>\
         <tr><th>model</th><td>{model}</td></tr>\
         <tr><th>trigger</th><td>{trigger}</td></tr>\
         <tr><th>started</th><td>{started}</td></tr>\
         <tr><th>ended</th><td>{ended}</td></tr>\
         <tr><th>exit code</th><td>{exit}</td></tr>\
         <tr><th>turns</th><td>{turns}</td></tr>\
         <tr><th>cost</th><td>{cost}</td></tr>\
         <tr><th>chain cost</th><td>${chain_cost:.4}</td></tr>",
        status = escape(&session.status),
        tier = session.tier,
        model = escape(&session.model),
        trigger = escape(&session.trigger),
        started = escape(&session.started_at),
        ended = session.ended_at.as_deref().map(escape).unwrap_or_default(),
        exit = session
            .exit_code
            .map_or_else(String::new, |c| c.to_string()),
        turns = session.turns.map_or_else(String::new, |t| t.to_string()),
        cost = session
            .cost_usd
            .map_or_else(String::new, |c| format!("${c:.4}")),
    );
    if let Some(parent_id) = session.parent_id {
        meta.push_str(&format!(
            "<tr><th>parent</th><td><a href=\"/sessions/{parent_id}\">#{parent_id}</a></td></tr>"
        ));
    }
    for child in &children {
        meta.push_str(&format!(
            "<tr><th>child</th><td><a href=\"/sessions/{id}\">#{id}</a> (tier {tier})</td></tr>",
            id = child.id,
            tier = child.tier
        ));
    }
    meta.push_str("</table>");

    let summary = session
        .summary
        .as_deref()
        .map(|s| format!("<p><em>{}</em></p>", escape(s)))
        .unwrap_or_default();
    let response = session
        .response
        .as_deref()
        .map(|r| format!("<h2>Response</h2><pre>{}</pre>", escape(r)))
        .unwrap_or_default();

    let live = if session.status == "running" {
        format!(
            "<h2>Live</h2><pre hx-ext=\"sse\" sse-connect=\"/sessions/{id}/stream\" \
             sse-swap=\"message\" hx-swap=\"beforeend\"></pre>"
        )
    } else {
        String::new()
    };
    let log = activity_log(&session);
    let log_block = if log.is_empty() {
        String::new()
    } else {
        format!("<h2>Activity</h2><pre>{log}</pre>")
    };

    let fragment = format!("{meta}\n{summary}\n{response}\n{live}\n{log_block}");
    Ok(Html(page(
        &headers,
        &format!("Session #{id}"),
        &fragment,
    )))
}

/// `GET /sessions/{id}/stream` — SSE over the display topic.
pub async fn session_stream(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (rx, guard) = state.control.subscribe(id, Channel::Display);
    let stream = ReceiverStream::new(rx).map(move |line| {
        let _hold = &guard;
        Ok(Event::default().data((*line).clone()))
    });
    Sse::new(stream).keep_alive(KeepAlive::new().interval(std::time::Duration::from_secs(15)))
}

#[derive(Deserialize)]
pub struct EventFilterQuery {
    level: Option<String>,
    service: Option<String>,
}

/// `GET /events`
pub async fn events(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<EventFilterQuery>,
) -> Result<Html<String>, ApiError> {
    let events = state.store.list_events(&ListEventsOptions {
        level: query.level.as_deref(),
        service: query.service.as_deref(),
        limit: Some(100),
        ..Default::default()
    })?;

    let rows: String = events
        .iter()
        .map(|event| {
            format!(
                "<tr><td>{at}</td><td class=\"{level}\">{level}</td><td>{service}</td>\
                 <td>{message}</td><td>{session}</td></tr>\n",
                at = escape(&event.created_at),
                level = escape(&event.level),
                service = event.service.as_deref().map(escape).unwrap_or_default(),
                message = escape(&event.message),
                session = event
                    .session_id
                    .map_or_else(String::new, |id| format!("<a href=\"/sessions/{id}\">#{id}</a>")),
            )
        })
        .collect();
    let fragment = format!(
        "<div hx-get=\"/events\" hx-trigger=\"every {POLL_SECONDS}s\" hx-swap=\"outerHTML\">\n\
         <table><tr><th>time</th><th>level</th><th>service</th><th>message</th><th>session</th></tr>\n\
         {rows}</table>\n</div>"
    );
    Ok(Html(page(&headers, "Events", &fragment)))
}

/// `GET /memories`
pub async fn memories(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Html<String>, ApiError> {
    let memories = state.store.list_memories(true)?;
    let rows: String = memories
        .iter()
        .map(|memory| {
            format!(
                "<tr><td>{service}</td><td>{category}</td><td>{observation}</td>\
                 <td>{confidence:.2}</td><td>{active}</td><td>\
                 <form class=\"inline\" method=\"post\" action=\"/memories/{id}/delete\">\
                 <button>delete</button></form></td></tr>\n",
                service = memory.service.as_deref().map(escape).unwrap_or_else(|| "general".into()),
                category = escape(&memory.category),
                observation = escape(&memory.observation),
                confidence = memory.confidence,
                active = if memory.active { "✓" } else { "·" },
                id = memory.id,
            )
        })
        .collect();

    let fragment = format!(
        "<form method=\"post\" action=\"/memories\">\n\
         <input name=\"service\" placeholder=\"service (optional)\">\n\
         <select name=\"category\"><option>timing</option><option>dependency</option>\
         <option>behavior</option><option>remediation</option><option>maintenance</option></select>\n\
         <input name=\"observation\" placeholder=\"observation\" size=\"50\">\n\
         <button type=\"submit\">add</button>\n</form>\n\
         <table><tr><th>service</th><th>category</th><th>observation</th>\
         <th>confidence</th><th>active</th><th></th></tr>\n{rows}</table>"
    );
    Ok(Html(page(&headers, "Memories", &fragment)))
}

#[derive(Deserialize)]
pub struct MemoryCreateForm {
    service: String,
    category: String,
    observation: String,
}

/// `POST /memories` — operator create through the upsert pipeline.
pub async fn memory_create(
    State(state): State<AppState>,
    Form(form): Form<MemoryCreateForm>,
) -> Result<Redirect, ApiError> {
    if form.observation.trim().is_empty() {
        return Ok(Redirect::to("/memories"));
    }
    let service = if form.service.trim().is_empty() {
        None
    } else {
        Some(form.service.trim())
    };
    state
        .memory
        .upsert(service, &form.category, form.observation.trim(), None, 1)
        .map_err(|err| match err {
            vigil_memory::MemoryError::Store(store) => ApiError::Database(store),
            other => ApiError::BadRequest(other.to_string()),
        })?;
    Ok(Redirect::to("/memories"))
}

#[derive(Deserialize)]
pub struct MemoryUpdateForm {
    observation: Option<String>,
    confidence: Option<f64>,
    active: Option<bool>,
}

/// `POST /memories/{id}/update`
pub async fn memory_update(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Form(form): Form<MemoryUpdateForm>,
) -> Result<Redirect, ApiError> {
    let _ = state.store.update_memory(
        id,
        &UpdateMemoryOptions {
            observation: form.observation.as_deref(),
            confidence: form.confidence,
            active: form.active,
        },
    )?;
    Ok(Redirect::to("/memories"))
}

/// `POST /memories/{id}/delete`
pub async fn memory_delete(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Redirect, ApiError> {
    let _ = state.store.delete_memory(id)?;
    Ok(Redirect::to("/memories"))
}

/// `GET /cooldowns` — the JSON file first, table summary as fallback.
pub async fn cooldowns(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Html<String>, ApiError> {
    let body = match state.cooldown.snapshot() {
        Ok(snapshot) => {
            let mut rows = String::new();
            for (service, cooldowns) in &snapshot.services {
                rows.push_str(&format!(
                    "<tr><td>{service}</td><td>{restarts}</td><td>{redeployments}</td>\
                     <td>{healthy}</td></tr>\n",
                    service = escape(service),
                    restarts = cooldowns.restarts.len(),
                    redeployments = cooldowns.redeployments.len(),
                    healthy = cooldowns.consecutive_healthy,
                ));
            }
            format!(
                "<table><tr><th>service</th><th>restarts</th><th>redeployments</th>\
                 <th>healthy streak</th></tr>\n{rows}</table>"
            )
        }
        Err(_) => {
            // File unreadable: fall back to the table view.
            let since = (chrono::Utc::now() - chrono::Duration::hours(24)).to_rfc3339();
            let rows: String = state
                .store
                .cooldown_summary_since(&since)?
                .iter()
                .map(|row| {
                    format!(
                        "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>\n",
                        escape(&row.service),
                        escape(&row.action),
                        row.count,
                        escape(&row.last_at)
                    )
                })
                .collect();
            format!(
                "<p class=\"warning\">cooldown.json unreadable, table view</p>\
                 <table><tr><th>service</th><th>action</th><th>count</th><th>last</th></tr>\n\
                 {rows}</table>"
            )
        }
    };
    let fragment = format!(
        "<div hx-get=\"/cooldowns\" hx-trigger=\"every {POLL_SECONDS}s\" hx-swap=\"outerHTML\">\n\
         {body}\n</div>"
    );
    Ok(Html(page(&headers, "Cooldowns", &fragment)))
}

/// `GET /config`
pub async fn config(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Html<String>, ApiError> {
    let settings = state.settings.snapshot();
    let entries = state.store.all_config()?;

    let rows: String = entries
        .iter()
        .map(|entry| {
            format!(
                "<tr><td>{}</td><td>{}</td><td>{}</td></tr>\n",
                escape(&entry.key),
                escape(&entry.value),
                escape(&entry.updated_at)
            )
        })
        .collect();
    let settings_json =
        serde_json::to_string_pretty(&settings).unwrap_or_else(|_| "{}".to_string());

    let fragment = format!(
        "<form method=\"post\" action=\"/config\">\n\
         <input name=\"key\" placeholder=\"key (e.g. interval)\">\n\
         <input name=\"value\" placeholder=\"value\">\n\
         <button type=\"submit\">set</button>\n</form>\n\
         <h2>Persisted entries</h2>\n\
         <table><tr><th>key</th><th>value</th><th>updated</th></tr>\n{rows}</table>\n\
         <h2>Effective settings</h2>\n<pre>{}</pre>",
        escape(&settings_json)
    );
    Ok(Html(page(&headers, "Config", &fragment)))
}

#[derive(Deserialize)]
pub struct ConfigForm {
    key: String,
    value: String,
}

/// `POST /config` — apply to the live handle and persist.
pub async fn config_update(
    State(state): State<AppState>,
    Form(form): Form<ConfigForm>,
) -> Result<Redirect, ApiError> {
    let mut probe = state.settings.snapshot();
    probe
        .apply_kv(&form.key, &form.value)
        .map_err(|err| ApiError::BadRequest(err.to_string()))?;

    state.settings.apply(|s| {
        let _ = s.apply_kv(&form.key, &form.value);
    });
    state.store.set_config(&form.key, &form.value)?;
    Ok(Redirect::to("/config"))
}
