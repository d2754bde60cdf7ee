//! Post-run session summarisation.
//!
//! When a summary model and API key are configured, the final response of a
//! session is condensed to at most two sentences for the dashboard TL;DR.
//! Any failure leaves the summary NULL — summaries are decoration, never a
//! reason to fail a session.

use std::time::Duration;

use tracing::{debug, warn};

use vigil_core::text::truncate_with_suffix;
use vigil_llm::{AnthropicClient, CompletionRequest};
use vigil_settings::Settings;

const SUMMARY_SYSTEM_PROMPT: &str =
    "You summarize infrastructure health-check sessions. Reply with at most \
     two sentences: what was checked or found, and what action (if any) was \
     taken. No preamble.";

/// Response text longer than this is truncated before summarisation.
const MAX_INPUT_BYTES: usize = 12_000;

/// Summarise a session's final response. `None` when summarisation is not
/// configured or the call failed.
pub async fn summarize_session(settings: &Settings, response: &str) -> Option<String> {
    let model = settings.summary_model.as_deref()?;
    let api_key = settings.anthropic_api_key.as_deref()?;
    if response.trim().is_empty() {
        return None;
    }

    let client = AnthropicClient::new(api_key);
    let request = CompletionRequest {
        model: model.to_string(),
        system: Some(SUMMARY_SYSTEM_PROMPT.to_string()),
        prompt: truncate_with_suffix(response, MAX_INPUT_BYTES, "…"),
        max_tokens: 256,
        timeout: Duration::from_secs(30),
    };

    match client.complete(&request).await {
        Ok(summary) => {
            debug!(bytes = summary.len(), "session summary produced");
            Some(summary.trim().to_string())
        }
        Err(err) => {
            warn!(error = %err, "session summary failed, leaving null");
            None
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
