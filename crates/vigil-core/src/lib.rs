//! # vigil-core
//!
//! Foundation types and utilities for the vigil supervisor.
//!
//! This crate provides the shared vocabulary that all other vigil crates
//! depend on:
//!
//! - **Tiers**: [`tier::Tier`] — the 1–3 capability ladder for agent sessions
//! - **Session vocabulary**: [`session::SessionStatus`], [`session::TriggerKind`]
//! - **Marker vocabulary**: [`marker::EventLevel`], [`marker::MemoryCategory`],
//!   [`marker::CooldownKind`] — the typed halves of `[EVENT:…]`, `[MEMORY:…]`,
//!   and `[COOLDOWN:…]` markers
//! - **Handoff**: [`handoff::Handoff`] — the escalation document passed
//!   between tiers, with schema validation
//! - **Text**: [`text`] — UTF-8-safe truncation and token estimation
//! - **Logging**: [`logging::init`] — tracing subscriber setup
//!
//! ## Crate Position
//!
//! Foundation crate. Depended on by all other vigil crates.

#![deny(unsafe_code)]

pub mod handoff;
pub mod logging;
pub mod marker;
pub mod session;
pub mod text;
pub mod tier;
