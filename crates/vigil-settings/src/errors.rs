//! Settings error taxonomy.

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SettingsError>;

/// Errors raised while resolving or updating settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// A value failed to parse for its key.
    #[error("invalid value {value:?} for {key}: {reason}")]
    InvalidValue {
        /// Setting key (normalised, lower-case).
        key: String,
        /// Offending value.
        value: String,
        /// Parse failure detail.
        reason: String,
    },

    /// The key is not a recognised setting.
    #[error("unknown setting key {0:?}")]
    UnknownKey(String),
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
