//! # vigil-settings
//!
//! Layered runtime settings for the vigil supervisor.
//!
//! Settings are resolved from four layers (lowest priority first):
//! 1. **Compiled defaults** — [`Settings::default()`]
//! 2. **Environment variables** — `INTERVAL`, `STATE_DIR`, `TIER1_MODEL`, …
//! 3. **Persisted config table** — overlaid at startup so dashboard edits
//!    survive restarts
//! 4. **Runtime PUT** — the config API writes the table and the live handle
//!
//! There is no ambient global: the binary builds a [`SettingsHandle`] once
//! and passes it into component constructors. Reads take a snapshot
//! (`Arc<RwLock>` + clone) so a session keeps consistent values even if an
//! operator edits config mid-run.

#![deny(unsafe_code)]

pub mod errors;
pub mod handle;
pub mod types;

pub use errors::{Result, SettingsError};
pub use handle::SettingsHandle;
pub use types::Settings;
