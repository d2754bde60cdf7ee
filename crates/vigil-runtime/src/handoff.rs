//! Handoff file consumption.
//!
//! The handoff document itself (shape + validation) lives in
//! `vigil_core::handoff`; this module owns the filesystem protocol: read,
//! validate, and atomically consume so the next tier starts clean.

use std::path::Path;

use tracing::{debug, warn};

use vigil_core::handoff::Handoff;

/// Result of looking for a handoff after a session exits.
#[derive(Debug)]
pub enum HandoffCheck {
    /// No file — no escalation requested.
    Absent,
    /// A valid document, consumed from disk.
    Valid(Handoff),
    /// A document was present but rejected; it has been consumed so it
    /// cannot poison the next session. Escalation is skipped.
    Rejected,
}

/// Read, validate, and consume the handoff file.
///
/// The file is renamed to `<path>.consumed` in every case where it existed,
/// whether it validated or not — a stale or malformed document must never
/// leak into a later session.
pub fn take_handoff(path: &Path) -> HandoffCheck {
    if !path.exists() {
        return HandoffCheck::Absent;
    }

    let raw = match std::fs::read(path) {
        Ok(raw) => raw,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "failed to read handoff file");
            consume(path);
            return HandoffCheck::Rejected;
        }
    };
    consume(path);

    match Handoff::from_json(&raw) {
        Ok(handoff) => {
            debug!(from_tier = handoff.from_tier, "handoff accepted");
            HandoffCheck::Valid(handoff)
        }
        Err(err) => {
            warn!(path = %path.display(), error = %err, "handoff rejected, escalation skipped");
            HandoffCheck::Rejected
        }
    }
}

/// Remove any stale handoff before a session starts (pre-session check).
pub fn discard_stale(path: &Path) {
    if path.exists() {
        warn!(path = %path.display(), "stale handoff found before session start, discarding");
        consume(path);
    }
}

fn consume(path: &Path) {
    let consumed = path.with_extension("json.consumed");
    if let Err(err) = std::fs::rename(path, &consumed) {
        warn!(path = %path.display(), error = %err, "failed to consume handoff, removing instead");
        let _ = std::fs::remove_file(path);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
