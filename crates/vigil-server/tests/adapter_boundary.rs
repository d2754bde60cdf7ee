//! HTTP surface tests over the full router, with the session manager
//! replaced by a stub so no subprocess is ever spawned.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tower::ServiceExt;

use vigil_cooldown::CooldownEngine;
use vigil_core::session::TriggerKind;
use vigil_core::tier::Tier;
use vigil_hub::{Channel, SessionHub, SubscriptionGuard};
use vigil_memory::MemoryEngine;
use vigil_runtime::{RuntimeError, SessionControl};
use vigil_server::{AppState, router};
use vigil_settings::{Settings, SettingsHandle};
use vigil_store::Store;

/// Stand-in for the session manager: creates a finished session row
/// synchronously and records the requested tier.
struct StubControl {
    store: Arc<Store>,
    hub: Arc<SessionHub>,
    busy: AtomicBool,
    last_tier: Mutex<Option<Tier>>,
    last_prompt: Mutex<Option<String>>,
}

impl StubControl {
    fn new(store: Arc<Store>, hub: Arc<SessionHub>) -> Self {
        Self {
            store,
            hub,
            busy: AtomicBool::new(false),
            last_tier: Mutex::new(None),
            last_prompt: Mutex::new(None),
        }
    }
}

impl SessionControl for StubControl {
    fn trigger_ad_hoc(
        &self,
        prompt: &str,
        start_tier: Tier,
        trigger: TriggerKind,
    ) -> Result<i64, RuntimeError> {
        if self.busy.load(Ordering::SeqCst) {
            return Err(RuntimeError::AlreadyRunning);
        }
        *self.last_tier.lock() = Some(start_tier);
        *self.last_prompt.lock() = Some(prompt.to_string());

        let session = self.store.create_session(
            start_tier,
            "stub-model",
            prompt,
            trigger.as_str(),
            None,
        )?;
        let _ = self.store.set_session_result(
            session.id,
            Some("stub response"),
            Some(0.001),
            Some(1),
            Some(10),
        )?;
        let _ = self
            .store
            .finalize_session(session.id, "completed", Some(0))?;
        Ok(session.id)
    }

    fn subscribe(
        &self,
        session_id: i64,
        channel: Channel,
    ) -> (
        tokio::sync::mpsc::Receiver<Arc<String>>,
        SubscriptionGuard,
    ) {
        self.hub.subscribe(session_id, channel)
    }

    fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }
}

struct Fixture {
    state: AppState,
    stub: Arc<StubControl>,
    _dir: tempfile::TempDir,
}

fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(Store::open_in_memory().unwrap());
    let hub = Arc::new(SessionHub::new());
    let stub = Arc::new(StubControl::new(Arc::clone(&store), Arc::clone(&hub)));

    let mut settings = Settings::default();
    settings.chat_api_key = Some("sk-chat".into());
    settings.state_dir = dir.path().to_path_buf();

    let state = AppState {
        store: Arc::clone(&store),
        settings: SettingsHandle::new(settings),
        hub: Arc::clone(&hub),
        cooldown: Arc::new(CooldownEngine::new(
            Arc::clone(&store),
            dir.path().join("cooldown.json"),
        )),
        memory: Arc::new(MemoryEngine::new(Arc::clone(&store))),
        control: Arc::clone(&stub) as Arc<dyn SessionControl>,
        prometheus: None,
    };
    Fixture {
        state,
        stub,
        _dir: dir,
    }
}

async fn send(fx: &Fixture, request: Request<Body>) -> (StatusCode, Value) {
    let response = router(fx.state.clone()).oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn bearer(mut request: Request<Body>, token: &str) -> Request<Body> {
    let _ = request.headers_mut().insert(
        header::AUTHORIZATION,
        format!("Bearer {token}").parse().unwrap(),
    );
    request
}

// ─────────────────────────────────────────────────────────────────────────────
// JSON API v1
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn health_reports_ok() {
    let fx = fixture();
    let (status, body) = send(&fx, get("/api/v1/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["busy"], false);
}

#[tokio::test]
async fn trigger_then_list_round_trip() {
    let fx = fixture();
    let (status, body) = send(
        &fx,
        json_request(
            "POST",
            "/api/v1/sessions/trigger",
            json!({"prompt": "check the nas"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = body["session"]["id"].as_i64().unwrap();
    assert_eq!(body["session"]["trigger"], "api");

    let (status, body) = send(&fx, get("/api/v1/sessions")).await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<i64> = body["sessions"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["id"].as_i64().unwrap())
        .collect();
    assert!(ids.contains(&id));
}

#[tokio::test]
async fn trigger_busy_returns_conflict() {
    let fx = fixture();
    fx.stub.busy.store(true, Ordering::SeqCst);
    let (status, body) = send(
        &fx,
        json_request("POST", "/api/v1/sessions/trigger", json!({"prompt": "x"})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "a session is already running");
}

#[tokio::test]
async fn trigger_without_json_content_type_is_415() {
    let fx = fixture();
    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/sessions/trigger")
        .header(header::CONTENT_TYPE, "text/plain")
        .body(Body::from("prompt=x"))
        .unwrap();
    let (status, _) = send(&fx, request).await;
    assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
}

#[tokio::test]
async fn trigger_empty_prompt_is_400() {
    let fx = fixture();
    let (status, _) = send(
        &fx,
        json_request("POST", "/api/v1/sessions/trigger", json!({"prompt": "  "})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn session_detail_includes_chain_cost() {
    let fx = fixture();
    let store = &fx.state.store;

    let parent = store
        .create_session(Tier::One, "m", "p", "scheduled", None)
        .unwrap();
    store
        .set_session_result(parent.id, None, Some(0.02), None, None)
        .unwrap();
    store
        .finalize_session(parent.id, "escalated", Some(0))
        .unwrap();

    let child = store
        .create_session(Tier::Two, "m", "p2", "scheduled", Some(parent.id))
        .unwrap();
    store
        .set_session_result(child.id, None, Some(0.05), None, None)
        .unwrap();
    store
        .finalize_session(child.id, "escalated", Some(0))
        .unwrap();

    let grandchild = store
        .create_session(Tier::Three, "m", "p3", "scheduled", Some(child.id))
        .unwrap();
    store
        .set_session_result(grandchild.id, None, Some(0.10), None, None)
        .unwrap();
    store
        .finalize_session(grandchild.id, "completed", Some(0))
        .unwrap();

    let (status, body) = send(&fx, get(&format!("/api/v1/sessions/{}", child.id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["session"]["id"], child.id);
    assert_eq!(body["parent"]["id"], parent.id);
    assert_eq!(body["children"][0]["id"], grandchild.id);
    let chain_cost = body["chainCost"].as_f64().unwrap();
    assert!((chain_cost - 0.17).abs() < 1e-9);
}

#[tokio::test]
async fn missing_session_is_404() {
    let fx = fixture();
    let (status, _) = send(&fx, get("/api/v1/sessions/404404")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn events_filter_by_level() {
    let fx = fixture();
    let store = &fx.state.store;
    store
        .insert_event(None, "info", Some("a"), "fine")
        .unwrap();
    store
        .insert_event(None, "critical", Some("b"), "down")
        .unwrap();

    let (status, body) = send(&fx, get("/api/v1/events?level=critical")).await;
    assert_eq!(status, StatusCode::OK);
    let events = body["events"].as_array().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["message"], "down");
}

#[tokio::test]
async fn memory_crud_lifecycle() {
    let fx = fixture();

    // Create.
    let (status, body) = send(
        &fx,
        json_request(
            "POST",
            "/api/v1/memories",
            json!({"service": "jellyfin", "category": "timing", "observation": "Takes 60s to start"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = body["memory"]["id"].as_i64().unwrap();
    assert_eq!(body["memory"]["confidence"], 0.7);

    // Same pair again reinforces instead of duplicating.
    let (status, body) = send(
        &fx,
        json_request(
            "POST",
            "/api/v1/memories",
            json!({"service": "jellyfin", "category": "timing", "observation": "slow boot"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["memory"]["id"], id);
    let confidence = body["memory"]["confidence"].as_f64().unwrap();
    assert!((confidence - 0.8).abs() < 1e-9);

    // Update.
    let (status, body) = send(
        &fx,
        json_request(
            "PUT",
            &format!("/api/v1/memories/{id}"),
            json!({"observation": "takes about a minute"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["memory"]["observation"], "takes about a minute");

    // Delete.
    let request = Request::builder()
        .method("DELETE")
        .uri(format!("/api/v1/memories/{id}"))
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&fx, request).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&fx, get(&format!("/api/v1/memories/{id}"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn memory_unknown_category_rejected() {
    let fx = fixture();
    let (status, _) = send(
        &fx,
        json_request(
            "POST",
            "/api/v1/memories",
            json!({"category": "vibes", "observation": "x"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn config_put_updates_live_and_persisted() {
    let fx = fixture();
    let (status, body) = send(
        &fx,
        json_request("PUT", "/api/v1/config", json!({"interval": "1200"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["settings"]["intervalSecs"], 1200);

    assert_eq!(fx.state.settings.snapshot().interval_secs, 1200);
    assert_eq!(
        fx.state.store.get_config("interval").unwrap().as_deref(),
        Some("1200")
    );
}

#[tokio::test]
async fn config_put_unknown_key_rejected_atomically() {
    let fx = fixture();
    let (status, _) = send(
        &fx,
        json_request(
            "PUT",
            "/api/v1/config",
            json!({"interval": "1200", "bogus_key": "x"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    // Nothing applied.
    assert_eq!(fx.state.settings.snapshot().interval_secs, 3600);
    assert!(fx.state.store.get_config("interval").unwrap().is_none());
}

#[tokio::test]
async fn cooldowns_endpoint_serves_file_snapshot() {
    let fx = fixture();
    fx.state.cooldown.ensure_state_file().unwrap();
    let _ = fx
        .state
        .cooldown
        .record("jellyfin", vigil_core::marker::CooldownKind::Restart, true, 1, None);

    let (status, body) = send(&fx, get("/api/v1/cooldowns")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["file"]["services"]["jellyfin"]["restarts"]
            .as_array()
            .unwrap()
            .len(),
        1
    );
    assert_eq!(body["recent"][0]["service"], "jellyfin");
}

// ─────────────────────────────────────────────────────────────────────────────
// OpenAI surface
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn models_list_is_idempotent() {
    let fx = fixture();
    let (_, first) = send(&fx, get("/v1/models")).await;
    let (_, second) = send(&fx, get("/v1/models")).await;

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
    assert_eq!(first, second);
}

#[tokio::test]
async fn chat_completions_requires_auth() {
    let fx = fixture();
    let body = json!({"model": "claude-ops", "messages": [{"role": "user", "content": "hi"}]});

    let (status, _) = send(
        &fx,
        json_request("POST", "/v1/chat/completions", body.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(
        &fx,
        bearer(
            json_request("POST", "/v1/chat/completions", body),
            "sk-wrong",
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn chat_completions_503_when_key_unset() {
    let fx = fixture();
    fx.state.settings.apply(|s| s.chat_api_key = None);
    let body = json!({"model": "claude-ops", "messages": [{"role": "user", "content": "hi"}]});
    let (status, _) = send(
        &fx,
        bearer(json_request("POST", "/v1/chat/completions", body), "sk-chat"),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn chat_completions_tier_routing_and_sync_response() {
    let fx = fixture();
    let body = json!({
        "model": "claude-ops-tier2",
        "messages": [
            {"role": "user", "content": "old"},
            {"role": "assistant", "content": "answer"},
            {"role": "user", "content": "investigate sonarr"}
        ],
        "stream": false
    });
    let (status, response) = send(
        &fx,
        bearer(json_request("POST", "/v1/chat/completions", body), "sk-chat"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["model"], "claude-ops-tier2");
    assert_eq!(
        response["choices"][0]["message"]["content"],
        "stub response"
    );
    assert_eq!(response["choices"][0]["finish_reason"], "stop");

    assert_eq!(*fx.stub.last_tier.lock(), Some(Tier::Two));
    assert_eq!(
        fx.stub.last_prompt.lock().as_deref(),
        Some("investigate sonarr")
    );

    // The triggered session exists with tier 2.
    let session = fx.state.store.latest_session().unwrap().unwrap();
    assert_eq!(session.tier, 2);
}

#[tokio::test]
async fn chat_completions_busy_is_429() {
    let fx = fixture();
    fx.stub.busy.store(true, Ordering::SeqCst);
    let body = json!({"model": "claude-ops", "messages": [{"role": "user", "content": "hi"}]});
    let (status, _) = send(
        &fx,
        bearer(json_request("POST", "/v1/chat/completions", body), "sk-chat"),
    )
    .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn chat_completions_no_user_message_is_400() {
    let fx = fixture();
    let body = json!({"model": "claude-ops", "messages": [{"role": "system", "content": "hi"}]});
    let (status, _) = send(
        &fx,
        bearer(json_request("POST", "/v1/chat/completions", body), "sk-chat"),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// ─────────────────────────────────────────────────────────────────────────────
// Ollama surface
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn ollama_version_and_tags_open() {
    let fx = fixture();
    let (status, body) = send(&fx, get("/api/version")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["version"].is_string());

    let (status, body) = send(&fx, get("/api/tags")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["models"].as_array().unwrap().len(), 4);
}

#[tokio::test]
async fn ollama_chat_sync() {
    let fx = fixture();
    let body = json!({
        "model": "claude-ops-tier3",
        "messages": [{"role": "user", "content": "check backups"}],
        "stream": false
    });
    let (status, response) = send(
        &fx,
        bearer(json_request("POST", "/api/chat", body), "sk-chat"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["message"]["content"], "stub response");
    assert_eq!(response["done"], true);
    assert_eq!(*fx.stub.last_tier.lock(), Some(Tier::Three));
}

#[tokio::test]
async fn ollama_generate_sync() {
    let fx = fixture();
    let body = json!({"model": "claude-ops", "prompt": "check disks", "stream": false});
    let (status, response) = send(
        &fx,
        bearer(json_request("POST", "/api/generate", body), "sk-chat"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["response"], "stub response");
    assert_eq!(response["done"], true);
}

#[tokio::test]
async fn ollama_chat_requires_auth() {
    let fx = fixture();
    let body = json!({"messages": [{"role": "user", "content": "hi"}]});
    let (status, _) = send(&fx, json_request("POST", "/api/chat", body)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

// ─────────────────────────────────────────────────────────────────────────────
// Webhook
// ─────────────────────────────────────────────────────────────────────────────

fn webhook_request(body: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/api/v1/webhook")
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

#[tokio::test]
async fn webhook_triggers_alert_session() {
    let fx = fixture();
    // No anthropic key in the fixture: brief synthesis degrades to the raw
    // payload, which still must trigger a session.
    let (status, body) = send(&fx, webhook_request("disk full on nas", Some("sk-chat"))).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["status"], "triggered");
    assert!(body["sessionId"].is_i64());

    let session = fx.state.store.latest_session().unwrap().unwrap();
    assert_eq!(session.trigger, "alert");
}

#[tokio::test]
async fn webhook_busy_still_202_acknowledged() {
    let fx = fixture();
    fx.stub.busy.store(true, Ordering::SeqCst);
    let (status, body) = send(&fx, webhook_request("disk full", Some("sk-chat"))).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body, json!({"status": "acknowledged"}));
}

#[tokio::test]
async fn webhook_auth_failures() {
    let fx = fixture();
    let (status, _) = send(&fx, webhook_request("alert", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&fx, webhook_request("alert", Some("sk-wrong"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    fx.state.settings.apply(|s| s.chat_api_key = None);
    let (status, _) = send(&fx, webhook_request("alert", Some("sk-chat"))).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn webhook_empty_body_is_400() {
    let fx = fixture();
    let (status, _) = send(&fx, webhook_request("   ", Some("sk-chat"))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn webhook_tier_field_selects_tier() {
    let fx = fixture();
    let (status, _) = send(
        &fx,
        webhook_request(r#"{"tier": 2, "alert": "cpu pegged"}"#, Some("sk-chat")),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(*fx.stub.last_tier.lock(), Some(Tier::Two));
    // The tier field is stripped before the prompt is synthesised.
    let prompt = fx.stub.last_prompt.lock().clone().unwrap();
    assert!(!prompt.contains("tier"));
    assert!(prompt.contains("cpu pegged"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Dashboard
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn overview_renders_layout_and_fragment() {
    let fx = fixture();

    let response = router(fx.state.clone())
        .oneshot(get("/"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let html = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(html.contains("<!DOCTYPE html>"));
    assert!(html.contains("No sessions yet"));

    // HTMX polling request gets the fragment only.
    let request = Request::builder()
        .uri("/")
        .header("HX-Request", "true")
        .body(Body::empty())
        .unwrap();
    let response = router(fx.state.clone()).oneshot(request).await.unwrap();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let fragment = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(!fragment.contains("<!DOCTYPE html>"));
    assert!(fragment.contains("hx-trigger=\"every 5s\""));
}

#[tokio::test]
async fn dashboard_trigger_redirects_when_busy() {
    let fx = fixture();
    fx.stub.busy.store(true, Ordering::SeqCst);
    let request = Request::builder()
        .method("POST")
        .uri("/sessions/trigger")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from("prompt=check+things&tier=1"))
        .unwrap();
    let response = router(fx.state.clone()).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        response.headers().get(header::LOCATION).unwrap(),
        "/sessions?flash=busy"
    );
}

#[tokio::test]
async fn session_detail_page_renders() {
    let fx = fixture();
    let session = fx
        .state
        .store
        .create_session(Tier::One, "m", "p", "manual", None)
        .unwrap();
    fx.state
        .store
        .finalize_session(session.id, "completed", Some(0))
        .unwrap();

    let response = router(fx.state.clone())
        .oneshot(get(&format!("/sessions/{}", session.id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
