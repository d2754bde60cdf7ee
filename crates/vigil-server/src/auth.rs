//! Bearer authentication for the OpenAI, Ollama, and webhook families.
//!
//! All three share one configured key (`CHAT_API_KEY`). Comparison goes
//! through SHA-256 digests so equality takes the same time whatever the
//! attacker guesses — byte-wise compare of two fixed-length digests leaks
//! nothing about where the first mismatch fell.

use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use sha2::{Digest, Sha256};

use vigil_settings::Settings;

use crate::errors::ApiError;

fn digests_equal(a: &str, b: &str) -> bool {
    let da = Sha256::digest(a.as_bytes());
    let db = Sha256::digest(b.as_bytes());
    da == db
}

/// Check the `Authorization: Bearer …` header against the configured key.
///
/// - key unset server-side → [`ApiError::KeyNotConfigured`] (503)
/// - header missing/malformed/wrong → [`ApiError::Unauthorized`] (401)
pub fn require_bearer(headers: &HeaderMap, settings: &Settings) -> Result<(), ApiError> {
    let Some(expected) = settings.chat_api_key.as_deref() else {
        return Err(ApiError::KeyNotConfigured);
    };
    let token = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(ApiError::Unauthorized)?;

    if digests_equal(token, expected) {
        Ok(())
    } else {
        Err(ApiError::Unauthorized)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn settings_with_key(key: Option<&str>) -> Settings {
        let mut s = Settings::default();
        s.chat_api_key = key.map(String::from);
        s
    }

    fn headers_with(token: Option<&str>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(token) = token {
            let _ = headers.insert(AUTHORIZATION, format!("Bearer {token}").parse().unwrap());
        }
        headers
    }

    #[test]
    fn valid_token_accepted() {
        let settings = settings_with_key(Some("sk-vigil"));
        require_bearer(&headers_with(Some("sk-vigil")), &settings).unwrap();
    }

    #[test]
    fn wrong_token_rejected() {
        let settings = settings_with_key(Some("sk-vigil"));
        assert!(matches!(
            require_bearer(&headers_with(Some("sk-wrong")), &settings),
            Err(ApiError::Unauthorized)
        ));
    }

    #[test]
    fn missing_header_rejected() {
        let settings = settings_with_key(Some("sk-vigil"));
        assert!(matches!(
            require_bearer(&headers_with(None), &settings),
            Err(ApiError::Unauthorized)
        ));
    }

    #[test]
    fn non_bearer_scheme_rejected() {
        let settings = settings_with_key(Some("sk-vigil"));
        let mut headers = HeaderMap::new();
        let _ = headers.insert(AUTHORIZATION, "Basic c2stdmlnaWw=".parse().unwrap());
        assert!(matches!(
            require_bearer(&headers, &settings),
            Err(ApiError::Unauthorized)
        ));
    }

    #[test]
    fn unconfigured_key_is_503_not_401() {
        let settings = settings_with_key(None);
        assert!(matches!(
            require_bearer(&headers_with(Some("anything")), &settings),
            Err(ApiError::KeyNotConfigured)
        ));
    }

    #[test]
    fn digest_compare_handles_length_mismatch() {
        assert!(!digests_equal("short", "a much longer candidate token"));
        assert!(digests_equal("same", "same"));
    }
}
