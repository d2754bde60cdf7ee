//! # vigil-store
//!
//! Single-file embedded SQLite store for the vigil supervisor.
//!
//! The store owns every persistent entity: sessions, events, memories,
//! cooldown actions, health streaks, and the key/value config table. Schema
//! evolves through numbered Up/Down migrations applied in order at startup.
//!
//! Layout follows a repository pattern:
//!
//! - [`connection`] — r2d2 pool construction with WAL + foreign-key pragmas
//! - [`migrations`] — ordered, idempotent schema migrations
//! - [`row_types`] — plain row structs shared with the API layer
//! - [`repositories`] — stateless per-table operations taking `&Connection`
//! - [`store::Store`] — facade serializing writes and retrying on
//!   `SQLITE_BUSY`; the only type other crates hold
//!
//! Concurrency model: one writer at a time (in-process write lock), many
//! concurrent readers; `synchronous=FULL` under WAL so every write is durable
//! before the call returns.

#![deny(unsafe_code)]

pub mod connection;
pub mod errors;
pub mod migrations;
pub mod repositories;
pub mod row_types;
pub mod store;

pub use connection::{ConnectionConfig, ConnectionPool, PooledConnection, new_file, new_in_memory};
pub use errors::{Result, StoreError};
pub use migrations::run_migrations;
pub use store::Store;
