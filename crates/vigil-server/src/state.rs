//! Shared handler state.

use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;

use vigil_cooldown::CooldownEngine;
use vigil_hub::SessionHub;
use vigil_memory::MemoryEngine;
use vigil_runtime::SessionControl;
use vigil_settings::SettingsHandle;
use vigil_store::Store;

/// Handles shared by every route handler. Constructed once at startup and
/// cloned per request (all fields are `Arc`s or handles).
#[derive(Clone)]
pub struct AppState {
    /// The persistent store.
    pub store: Arc<Store>,
    /// Live settings.
    pub settings: SettingsHandle,
    /// Fan-out hub for live streams.
    pub hub: Arc<SessionHub>,
    /// Cooldown engine (dashboard reads the file snapshot through it).
    pub cooldown: Arc<CooldownEngine>,
    /// Memory engine (context preview, CRUD side effects).
    pub memory: Arc<MemoryEngine>,
    /// Trigger/subscribe capability — the session manager behind a trait.
    pub control: Arc<dyn SessionControl>,
    /// Prometheus render handle; `None` in tests that skip the recorder.
    pub prometheus: Option<PrometheusHandle>,
}
