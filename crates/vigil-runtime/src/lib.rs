//! # vigil-runtime
//!
//! The session manager: scheduling, subprocess lifecycle, and escalation.
//!
//! - [`latch::SessionLatch`] — the process-wide "one session at a time"
//!   mutual exclusion. Fair and non-reentrant: acquisition fails immediately
//!   when held, it never queues.
//! - [`manager::SessionManager`] — spawns the agent CLI, streams its stdout
//!   into the parser, enforces the wall-clock timeout, walks escalation
//!   chains via handoff documents, and writes the post-run summary.
//! - [`command`] — subprocess argument assembly, including the runtime
//!   context appended to the system prompt.
//! - [`descriptor`] — per-repo tool-descriptor merge into the baseline.
//! - [`control::SessionControl`] — the capability trait HTTP adapters
//!   depend on instead of the concrete manager.

#![deny(unsafe_code)]

pub mod command;
pub mod control;
pub mod descriptor;
pub mod errors;
pub mod handoff;
pub mod latch;
pub mod manager;
pub mod summary;

pub use control::SessionControl;
pub use errors::RuntimeError;
pub use latch::{LatchGuard, SessionLatch};
pub use manager::SessionManager;
