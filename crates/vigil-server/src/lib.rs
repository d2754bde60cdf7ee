//! # vigil-server
//!
//! The HTTP adapter surface. Four endpoint families share one
//! [`state::AppState`], the single session latch (through
//! [`vigil_runtime::SessionControl`]), and the fan-out hub:
//!
//! - **Dashboard** — HTML pages with HTMX fragment rendering and 5-second
//!   polling; live session streams over SSE
//! - **JSON API v1** — paginated lists, memory CRUD, config GET/PUT,
//!   session trigger
//! - **OpenAI-compatible** — `/v1/models` and `/v1/chat/completions`
//!   (streaming and synchronous), so any chat client can trigger a session
//! - **Ollama-compatible** — `/api/version`, `/api/tags`, `/api/chat`,
//!   `/api/generate` with NDJSON streaming
//! - **Webhook** — `/api/v1/webhook`, alert payload → LLM brief → ad-hoc
//!   session; never a 5xx for a busy latch
//!
//! The OpenAI, Ollama, and webhook families authenticate with the same
//! bearer key, compared in constant time.

#![deny(unsafe_code)]

pub mod auth;
pub mod errors;
pub mod html;
pub mod metrics;
pub mod routes;
pub mod state;

pub use errors::ApiError;
pub use routes::router;
pub use state::AppState;
