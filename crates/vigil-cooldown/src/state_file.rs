//! The human-readable cooldown state file.
//!
//! Shape (pinned — the agent subprocess re-reads this file before every
//! remediation):
//!
//! ```json
//! {
//!   "services": {
//!     "jellyfin": {
//!       "restarts": [{"timestamp": "2026-01-01T10:00:00Z", "success": true}],
//!       "redeployments": [],
//!       "consecutive_healthy": 2
//!     }
//!   }
//! }
//! ```
//!
//! The file is created with an empty document when missing and never
//! blindly overwritten: every write is read-modify-write through a temp
//! file renamed into place.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write as _;
use std::path::Path;

use serde::{Deserialize, Serialize};

use vigil_core::marker::CooldownKind;

use crate::Result;

/// One recorded action attempt.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActionEntry {
    /// RFC 3339 UTC time of the attempt.
    pub timestamp: String,
    /// Whether the agent reported success.
    pub success: bool,
}

/// Per-service action history.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceCooldowns {
    /// Restart attempts, oldest first.
    pub restarts: Vec<ActionEntry>,
    /// Redeployment attempts, oldest first.
    pub redeployments: Vec<ActionEntry>,
    /// Mirror of the consecutive-healthy streak counter.
    pub consecutive_healthy: i64,
}

impl ServiceCooldowns {
    /// The entry list for an action kind.
    #[must_use]
    pub fn entries(&self, kind: CooldownKind) -> &[ActionEntry] {
        match kind {
            CooldownKind::Restart => &self.restarts,
            CooldownKind::Redeployment => &self.redeployments,
        }
    }

    fn entries_mut(&mut self, kind: CooldownKind) -> &mut Vec<ActionEntry> {
        match kind {
            CooldownKind::Restart => &mut self.restarts,
            CooldownKind::Redeployment => &mut self.redeployments,
        }
    }
}

/// The whole state document.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CooldownFile {
    /// Per-service histories, keyed by service name.
    pub services: BTreeMap<String, ServiceCooldowns>,
}

impl CooldownFile {
    /// Load the document, creating an empty one on disk when missing.
    /// An existing file is never replaced here, whatever it contains —
    /// a parse failure surfaces as an error instead.
    pub fn load_or_init(path: &Path) -> Result<CooldownFile> {
        if !path.exists() {
            let empty = CooldownFile::default();
            empty.write_to(path)?;
            return Ok(empty);
        }
        let raw = fs::read(path)?;
        Ok(serde_json::from_slice(&raw)?)
    }

    /// Append an action entry for a service and persist.
    pub fn append_action(
        path: &Path,
        service: &str,
        kind: CooldownKind,
        entry: ActionEntry,
    ) -> Result<()> {
        let mut doc = Self::load_or_init(path)?;
        doc.services
            .entry(service.to_string())
            .or_default()
            .entries_mut(kind)
            .push(entry);
        doc.write_to(path)
    }

    /// Mirror the streak counter for a service and persist.
    pub fn set_healthy_count(path: &Path, service: &str, count: i64) -> Result<()> {
        let mut doc = Self::load_or_init(path)?;
        doc.services
            .entry(service.to_string())
            .or_default()
            .consecutive_healthy = count;
        doc.write_to(path)
    }

    /// Serialize to pretty JSON and atomically replace the file.
    pub fn write_to(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_vec_pretty(self)?;
        let tmp = path.with_extension("json.tmp");
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(&json)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
