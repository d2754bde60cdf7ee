//! The capability surface adapters depend on.
//!
//! The three wire protocols (dashboard, OpenAI, Ollama) and the webhook all
//! need the same two things: trigger an ad-hoc session, and subscribe to a
//! session's live stream. They take this trait, not the concrete manager.

use std::sync::Arc;

use tokio::sync::mpsc;

use vigil_core::session::TriggerKind;
use vigil_core::tier::Tier;
use vigil_hub::{Channel, SubscriptionGuard};

use crate::errors::RuntimeError;

/// Trigger/subscribe capability, implemented by [`crate::SessionManager`].
pub trait SessionControl: Send + Sync {
    /// Start an ad-hoc session. Returns the new session id once the row
    /// exists — before any subprocess output. Fails with
    /// [`RuntimeError::AlreadyRunning`] when the latch is held.
    fn trigger_ad_hoc(
        &self,
        prompt: &str,
        start_tier: Tier,
        trigger: TriggerKind,
    ) -> Result<i64, RuntimeError>;

    /// Subscribe to a session's live stream.
    fn subscribe(
        &self,
        session_id: i64,
        channel: Channel,
    ) -> (mpsc::Receiver<Arc<String>>, SubscriptionGuard);

    /// Whether a session currently holds the latch.
    fn is_busy(&self) -> bool;
}
