//! Tracing subscriber setup for the supervisor binary.

use tracing_subscriber::EnvFilter;

/// Initialise the global tracing subscriber.
///
/// Respects `RUST_LOG` when set; otherwise defaults to `info` for the vigil
/// crates and `warn` for everything else. Safe to call once per process —
/// a second call is a no-op so tests can race it harmlessly.
pub fn init(default_directive: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}

/// Default filter directive used by the binary when `RUST_LOG` is unset.
pub const DEFAULT_DIRECTIVE: &str = "warn,vigil=info,vigil_core=info,vigil_store=info,\
     vigil_runtime=info,vigil_server=info,vigil_stream=info,vigil_cooldown=info,\
     vigil_memory=info,vigil_hub=info,vigil_llm=info,vigil_settings=info";

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
