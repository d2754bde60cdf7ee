//! # vigil-llm
//!
//! Minimal Anthropic Messages API client for the supervisor's own synthesis
//! calls: post-run session summaries and webhook investigation briefs.
//!
//! The agent subprocess talks to its provider itself — this client exists
//! only for the two places the *supervisor* needs a short completion, so it
//! is deliberately non-streaming and single-turn.

#![deny(unsafe_code)]

pub mod anthropic;

pub use anthropic::{AnthropicClient, CompletionRequest};

use thiserror::Error;

/// Errors from a synthesis call.
#[derive(Debug, Error)]
pub enum LlmError {
    /// Transport failure (connect, TLS, timeout).
    #[error("llm transport error: {0}")]
    Http(#[from] reqwest::Error),
    /// The API answered with a non-success status.
    #[error("llm api error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error body, as far as it parsed.
        message: String,
    },
    /// The response contained no text content.
    #[error("llm response contained no text")]
    Empty,
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, LlmError>;
