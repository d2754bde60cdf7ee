//! Runtime error taxonomy.

use thiserror::Error;

/// Errors surfaced by the session manager.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// A session is already running; the latch was not acquired.
    /// Adapters map this to 429 (OpenAI/Ollama), 409 (JSON API trigger),
    /// 202 (webhook), or a flash redirect (dashboard).
    #[error("a session is already running")]
    AlreadyRunning,

    /// Store failure while creating or finalising a session.
    #[error(transparent)]
    Store(#[from] vigil_store::StoreError),

    /// Parser setup failure (log file, session row).
    #[error(transparent)]
    Stream(#[from] vigil_stream::StreamError),

    /// Filesystem failure during pre-session checks.
    #[error("runtime io error: {0}")]
    Io(#[from] std::io::Error),
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn already_running_message() {
        assert_eq!(
            RuntimeError::AlreadyRunning.to_string(),
            "a session is already running"
        );
    }
}
