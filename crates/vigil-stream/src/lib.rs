//! # vigil-stream
//!
//! Parser for the agent subprocess's newline-delimited JSON event stream.
//!
//! For every stdout line the parser:
//!
//! 1. stamps it with wall-clock time and appends `"<RFC3339>\t<raw>"` to the
//!    session log file
//! 2. publishes the verbatim line on the session's raw hub topic
//! 3. classifies it into an [`events::AgentEvent`], formats a compact
//!    fragment, and publishes that on the display topic
//! 4. scans assistant text blocks for `[EVENT:…]`, `[MEMORY:…]`, and
//!    `[COOLDOWN:…]` markers and persists each one
//! 5. on the terminal `result` event, writes response/cost/turns/duration to
//!    the session row and closes both hub topics
//!
//! Lines that fail JSON decoding are treated as stderr noise: logged to the
//! file, never forwarded to the structured streams. Unknown event types are
//! forwarded raw and counted, and never abort the session.

#![deny(unsafe_code)]

pub mod events;
pub mod format;
pub mod markers;
pub mod parser;

pub use events::{AgentEvent, ContentBlock, ResultEvent};
pub use markers::{Marker, extract_markers};
pub use parser::StreamParser;

use thiserror::Error;

/// Errors surfaced while setting up or tearing down a parser.
///
/// Per-line processing never fails — persistence errors are logged and the
/// stream continues, because nothing the subprocess emits may crash the
/// supervisor.
#[derive(Debug, Error)]
pub enum StreamError {
    /// Log-file I/O failure.
    #[error("session log error: {0}")]
    Io(#[from] std::io::Error),
    /// Store failure during setup.
    #[error(transparent)]
    Store(#[from] vigil_store::StoreError),
}
