//! API error type with JSON responses.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Errors a route handler can return. Each maps to a status code and a
/// JSON `{"error": …}` body.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Store failure — details are logged, the client sees a generic body.
    #[error("database error")]
    Database(#[from] vigil_store::StoreError),

    /// Resource does not exist.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// Malformed request.
    #[error("{0}")]
    BadRequest(String),

    /// Bearer token missing or wrong.
    #[error("unauthorized")]
    Unauthorized,

    /// Chat API key not configured server-side.
    #[error("chat api key not configured")]
    KeyNotConfigured,

    /// The session latch is held (OpenAI/Ollama surface).
    #[error("a session is already running")]
    Busy,

    /// The session latch is held (JSON API v1 trigger).
    #[error("a session is already running")]
    Conflict,

    /// Webhook brief synthesis failed or timed out.
    #[error("synthesis failed")]
    SynthesisFailed,
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::KeyNotConfigured => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Busy => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Conflict => StatusCode::CONFLICT,
            ApiError::SynthesisFailed => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Database(err) = &self {
            error!(error = %err, "store error surfaced to api");
        }
        let body = Json(json!({"error": self.to_string()}));
        (self.status(), body).into_response()
    }
}

impl From<vigil_runtime::RuntimeError> for ApiError {
    fn from(err: vigil_runtime::RuntimeError) -> Self {
        match err {
            vigil_runtime::RuntimeError::AlreadyRunning => ApiError::Busy,
            vigil_runtime::RuntimeError::Store(store) => ApiError::Database(store),
            other => ApiError::BadRequest(other.to_string()),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(ApiError::Unauthorized.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            ApiError::KeyNotConfigured.status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(ApiError::Busy.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(ApiError::Conflict.status(), StatusCode::CONFLICT);
        assert_eq!(ApiError::SynthesisFailed.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(
            ApiError::NotFound("session").status(),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn database_error_is_generic() {
        let err = ApiError::Database(vigil_store::StoreError::Internal("secret detail".into()));
        assert_eq!(err.to_string(), "database error");
    }

    #[test]
    fn runtime_busy_maps_to_429_by_default() {
        // The chat surfaces (OpenAI/Ollama) answer 429; the JSON API v1
        // trigger maps AlreadyRunning to Conflict explicitly in its handler.
        let err: ApiError = vigil_runtime::RuntimeError::AlreadyRunning.into();
        assert_eq!(err.status(), StatusCode::TOO_MANY_REQUESTS);
    }
}
