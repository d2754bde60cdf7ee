//! The process-wide session latch.
//!
//! Exactly one of the periodic scheduler, a manual trigger, an API trigger,
//! or an alert webhook may hold the latch at any time. Acquisition is
//! non-blocking and non-reentrant: a held latch fails the attempt
//! immediately, callers never queue.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// The latch. Cheap to clone; all clones share one flag.
#[derive(Clone, Default)]
pub struct SessionLatch {
    held: Arc<AtomicBool>,
}

/// RAII guard — the latch releases when this drops.
pub struct LatchGuard {
    held: Arc<AtomicBool>,
}

impl SessionLatch {
    /// Create a released latch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to take the latch. `None` when already held.
    #[must_use]
    pub fn try_acquire(&self) -> Option<LatchGuard> {
        self.held
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| LatchGuard {
                held: Arc::clone(&self.held),
            })
    }

    /// Whether the latch is currently held.
    #[must_use]
    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::Acquire)
    }
}

impl Drop for LatchGuard {
    fn drop(&mut self) {
        self.held.store(false, Ordering::Release);
    }
}

impl std::fmt::Debug for SessionLatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionLatch")
            .field("held", &self.is_held())
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
