//! Anthropic Messages API client (non-streaming).

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::{LlmError, Result};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";

/// One single-turn completion request.
#[derive(Clone, Debug)]
pub struct CompletionRequest {
    /// Model id.
    pub model: String,
    /// Optional system prompt.
    pub system: Option<String>,
    /// The user message.
    pub prompt: String,
    /// Response token cap.
    pub max_tokens: u32,
    /// Hard wall-clock timeout for the call.
    pub timeout: Duration,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: Vec<WireMessage<'a>>,
}

#[derive(Deserialize)]
struct WireContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct WireResponse {
    content: Vec<WireContentBlock>,
}

#[derive(Deserialize)]
struct WireErrorDetail {
    #[serde(default)]
    message: String,
}

#[derive(Deserialize)]
struct WireError {
    #[serde(default)]
    error: Option<WireErrorDetail>,
}

/// Client over the Messages endpoint.
pub struct AnthropicClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl AnthropicClient {
    /// Create a client for the production endpoint.
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(api_key, DEFAULT_BASE_URL)
    }

    /// Create a client against a custom base URL (tests).
    #[must_use]
    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: base_url.into(),
        }
    }

    /// Run one completion and return the concatenated text blocks.
    #[instrument(skip(self, request), fields(model = %request.model))]
    pub async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let body = WireRequest {
            model: &request.model,
            max_tokens: request.max_tokens,
            system: request.system.as_deref(),
            messages: vec![WireMessage {
                role: "user",
                content: &request.prompt,
            }],
        };

        let response = self
            .http
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .timeout(request.timeout)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let raw = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<WireError>(&raw)
                .ok()
                .and_then(|e| e.error)
                .map_or(raw, |d| d.message);
            return Err(LlmError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: WireResponse = response.json().await?;
        let text: String = parsed
            .content
            .iter()
            .filter(|block| block.block_type == "text")
            .map(|block| block.text.as_str())
            .collect::<Vec<_>>()
            .join("");

        if text.trim().is_empty() {
            return Err(LlmError::Empty);
        }
        debug!(bytes = text.len(), "completion received");
        Ok(text)
    }
}

impl std::fmt::Debug for AnthropicClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> CompletionRequest {
        CompletionRequest {
            model: "claude-haiku-4-5".into(),
            system: Some("Summarize in two sentences.".into()),
            prompt: "The session restarted jellyfin.".into(),
            max_tokens: 256,
            timeout: Duration::from_secs(30),
        }
    }

    #[tokio::test]
    async fn successful_completion() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "sk-test"))
            .and(header("anthropic-version", API_VERSION))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "content": [
                    {"type": "text", "text": "Jellyfin was restarted "},
                    {"type": "text", "text": "and recovered."}
                ]
            })))
            .mount(&server)
            .await;

        let client = AnthropicClient::with_base_url("sk-test", server.uri());
        let text = client.complete(&request()).await.unwrap();
        assert_eq!(text, "Jellyfin was restarted and recovered.");
    }

    #[tokio::test]
    async fn api_error_surfaces_status_and_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "error": {"type": "authentication_error", "message": "invalid x-api-key"}
            })))
            .mount(&server)
            .await;

        let client = AnthropicClient::with_base_url("sk-bad", server.uri());
        let err = client.complete(&request()).await.unwrap_err();
        match err {
            LlmError::Api { status, message } => {
                assert_eq!(status, 401);
                assert_eq!(message, "invalid x-api-key");
            }
            other => panic!("expected api error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_content_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"content": []})),
            )
            .mount(&server)
            .await;

        let client = AnthropicClient::with_base_url("sk-test", server.uri());
        assert!(matches!(
            client.complete(&request()).await,
            Err(LlmError::Empty)
        ));
    }

    #[tokio::test]
    async fn non_text_blocks_are_ignored() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "content": [
                    {"type": "thinking", "thinking": "let me think"},
                    {"type": "text", "text": "Short answer."}
                ]
            })))
            .mount(&server)
            .await;

        let client = AnthropicClient::with_base_url("sk-test", server.uri());
        let text = client.complete(&request()).await.unwrap();
        assert_eq!(text, "Short answer.");
    }
}
