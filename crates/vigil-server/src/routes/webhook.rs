//! Alert webhook.
//!
//! Accepts any body from alerting tools (Alertmanager, Uptime Kuma, plain
//! curl), synthesises a short investigation brief via the LLM, and triggers
//! an ad-hoc session with trigger kind `alert`. A held latch still answers
//! 202 — upstream alert tools must never see a 5xx and start retrying.

use std::time::Duration;

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use metrics::counter;
use serde_json::{Value, json};
use tracing::{info, warn};

use vigil_core::session::TriggerKind;
use vigil_core::text::truncate_with_suffix;
use vigil_core::tier::Tier;
use vigil_llm::{AnthropicClient, CompletionRequest};
use vigil_runtime::RuntimeError;
use vigil_settings::Settings;

use crate::auth::require_bearer;
use crate::errors::ApiError;
use crate::state::AppState;

const DEFAULT_BRIEF_SYSTEM_PROMPT: &str =
    "You turn raw infrastructure alert payloads into a short investigation \
     brief for an on-call agent. Reply with 2-4 sentences: what fired, what \
     is likely affected, and where to start looking. No preamble, no \
     markdown.";

/// Hard ceiling on the synthesis call.
const SYNTHESIS_TIMEOUT: Duration = Duration::from_secs(30);

/// Payloads larger than this are truncated before synthesis.
const MAX_PAYLOAD_BYTES: usize = 16_000;

/// Pull an optional `tier` field out of a JSON payload, returning the
/// payload with the field stripped. Non-JSON bodies pass through untouched.
fn extract_tier(body: &[u8]) -> (Option<u8>, String) {
    if let Ok(mut value) = serde_json::from_slice::<Value>(body) {
        if let Some(obj) = value.as_object_mut() {
            let tier = obj
                .remove("tier")
                .and_then(|t| t.as_u64())
                .map(|t| t.min(u64::from(u8::MAX)) as u8);
            return (tier, value.to_string());
        }
    }
    (None, String::from_utf8_lossy(body).into_owned())
}

/// Synthesise the investigation brief from the (tier-stripped) payload.
async fn synthesize_brief(settings: &Settings, payload: &str) -> Result<String, ApiError> {
    let model = settings
        .webhook_model
        .clone()
        .or_else(|| settings.summary_model.clone())
        .unwrap_or_else(|| settings.tier_models[0].clone());

    let Some(api_key) = settings.anthropic_api_key.as_deref() else {
        // No synthesis key configured: degrade to the raw payload rather
        // than dropping the alert.
        warn!("no anthropic api key, using raw alert payload as prompt");
        return Ok(truncate_with_suffix(payload, 4_000, "…"));
    };

    let client = AnthropicClient::new(api_key);
    let request = CompletionRequest {
        model,
        system: Some(
            settings
                .webhook_system_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_BRIEF_SYSTEM_PROMPT.to_string()),
        ),
        prompt: truncate_with_suffix(payload, MAX_PAYLOAD_BYTES, "…"),
        max_tokens: 512,
        timeout: SYNTHESIS_TIMEOUT,
    };

    match client.complete(&request).await {
        Ok(brief) => {
            counter!("webhook_briefs_total", "outcome" => "ok").increment(1);
            Ok(brief.trim().to_string())
        }
        Err(err) => {
            counter!("webhook_briefs_total", "outcome" => "error").increment(1);
            warn!(error = %err, "webhook brief synthesis failed");
            Err(ApiError::SynthesisFailed)
        }
    }
}

/// `POST /api/v1/webhook`
pub async fn receive(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let settings = state.settings.snapshot();
    require_bearer(&headers, &settings)?;

    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(ApiError::BadRequest("empty alert payload".into()));
    }

    let (tier_field, payload) = extract_tier(&body);
    let start_tier = tier_field
        .and_then(Tier::from_u8)
        .unwrap_or(Tier::One)
        .clamp_to(settings.max_tier);

    let brief = synthesize_brief(&settings, &payload).await?;

    match state
        .control
        .trigger_ad_hoc(&brief, start_tier, TriggerKind::Alert)
    {
        Ok(session_id) => {
            info!(session_id, tier = start_tier.as_u8(), "alert session triggered");
            Ok((
                StatusCode::ACCEPTED,
                Json(json!({"status": "triggered", "sessionId": session_id})),
            ))
        }
        Err(RuntimeError::AlreadyRunning) => {
            // Never a 5xx: acknowledge so the upstream tool does not retry.
            info!("alert acknowledged while a session is in flight");
            Ok((
                StatusCode::ACCEPTED,
                Json(json!({"status": "acknowledged"})),
            ))
        }
        Err(err) => Err(err.into()),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_extracted_and_stripped() {
        let body = br#"{"tier": 2, "alert": "disk full", "host": "nas"}"#;
        let (tier, payload) = extract_tier(body);
        assert_eq!(tier, Some(2));
        let value: Value = serde_json::from_str(&payload).unwrap();
        assert!(value.get("tier").is_none());
        assert_eq!(value["alert"], "disk full");
    }

    #[test]
    fn non_json_body_passes_through() {
        let (tier, payload) = extract_tier(b"disk full on nas");
        assert_eq!(tier, None);
        assert_eq!(payload, "disk full on nas");
    }

    #[test]
    fn json_without_tier() {
        let (tier, payload) = extract_tier(br#"{"alert": "down"}"#);
        assert_eq!(tier, None);
        assert!(payload.contains("down"));
    }

    #[test]
    fn huge_tier_values_saturate() {
        let (tier, _) = extract_tier(br#"{"tier": 99999, "a": 1}"#);
        // Saturates into u8 range; Tier::from_u8 later rejects it → tier 1.
        assert_eq!(tier, Some(255));
        assert!(Tier::from_u8(255).is_none());
    }

    #[tokio::test]
    async fn missing_key_degrades_to_raw_payload() {
        let settings = Settings::default();
        let brief = synthesize_brief(&settings, "service X is down")
            .await
            .unwrap();
        assert_eq!(brief, "service X is down");
    }
}
