//! Escalation handoff document.
//!
//! A session that wants a more capable successor writes `handoff.json` to the
//! state directory before exiting. The session manager validates it, consumes
//! the file, and spawns the next tier with the proposed prompt.
//!
//! Unrecognised schema versions are rejected, and a document without a
//! `schema_version` field fails deserialization outright — absence is treated
//! exactly like an unknown version.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The only schema version this supervisor accepts.
pub const HANDOFF_SCHEMA_VERSION: u32 = 1;

/// Errors raised when reading or validating a handoff document.
#[derive(Debug, Error)]
pub enum HandoffError {
    /// The file did not parse as a handoff document (including a missing
    /// `schema_version` field).
    #[error("malformed handoff document: {0}")]
    Malformed(#[from] serde_json::Error),
    /// The document parsed but carries a version we do not understand.
    #[error("unsupported handoff schema version {found} (expected {HANDOFF_SCHEMA_VERSION})")]
    UnsupportedVersion {
        /// Version found in the document.
        found: u32,
    },
    /// The proposed prompt is empty — nothing to escalate with.
    #[error("handoff has an empty next_prompt")]
    EmptyPrompt,
}

/// Side-channel document written by one tier and read by the next.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Handoff {
    /// Must equal [`HANDOFF_SCHEMA_VERSION`]. Mandatory — no default.
    pub schema_version: u32,
    /// Tier that emitted the document.
    pub from_tier: u8,
    /// What the emitting session found.
    pub findings: String,
    /// Prompt proposed for the next tier.
    pub next_prompt: String,
    /// Services implicated in the findings.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub services: Vec<String>,
    /// Emitting session's id, if the agent knew it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<i64>,
}

impl Handoff {
    /// Parse and validate a handoff document from raw JSON bytes.
    pub fn from_json(raw: &[u8]) -> Result<Handoff, HandoffError> {
        let handoff: Handoff = serde_json::from_slice(raw)?;
        handoff.validate()?;
        Ok(handoff)
    }

    /// Validate an already-parsed document.
    pub fn validate(&self) -> Result<(), HandoffError> {
        if self.schema_version != HANDOFF_SCHEMA_VERSION {
            return Err(HandoffError::UnsupportedVersion {
                found: self.schema_version,
            });
        }
        if self.next_prompt.trim().is_empty() {
            return Err(HandoffError::EmptyPrompt);
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    fn valid_doc() -> serde_json::Value {
        json!({
            "schema_version": 1,
            "from_tier": 1,
            "findings": "jellyfin is flapping, OOM killer suspected",
            "next_prompt": "Investigate jellyfin memory usage and restart if safe.",
            "services": ["jellyfin"],
            "session_id": 42
        })
    }

    #[test]
    fn valid_document_accepted() {
        let raw = serde_json::to_vec(&valid_doc()).unwrap();
        let handoff = Handoff::from_json(&raw).unwrap();
        assert_eq!(handoff.from_tier, 1);
        assert_eq!(handoff.services, vec!["jellyfin"]);
        assert_eq!(handoff.session_id, Some(42));
    }

    #[test]
    fn unknown_version_rejected() {
        let mut doc = valid_doc();
        doc["schema_version"] = json!(2);
        let raw = serde_json::to_vec(&doc).unwrap();
        assert_matches!(
            Handoff::from_json(&raw),
            Err(HandoffError::UnsupportedVersion { found: 2 })
        );
    }

    #[test]
    fn missing_version_rejected_like_unknown() {
        let mut doc = valid_doc();
        let _ = doc.as_object_mut().unwrap().remove("schema_version");
        let raw = serde_json::to_vec(&doc).unwrap();
        assert_matches!(Handoff::from_json(&raw), Err(HandoffError::Malformed(_)));
    }

    #[test]
    fn empty_prompt_rejected() {
        let mut doc = valid_doc();
        doc["next_prompt"] = json!("   ");
        let raw = serde_json::to_vec(&doc).unwrap();
        assert_matches!(Handoff::from_json(&raw), Err(HandoffError::EmptyPrompt));
    }

    #[test]
    fn optional_fields_default() {
        let doc = json!({
            "schema_version": 1,
            "from_tier": 2,
            "findings": "disk filling on /var",
            "next_prompt": "Free space on /var, then verify backups."
        });
        let handoff = Handoff::from_json(&serde_json::to_vec(&doc).unwrap()).unwrap();
        assert!(handoff.services.is_empty());
        assert!(handoff.session_id.is_none());
    }

    #[test]
    fn garbage_rejected() {
        assert_matches!(
            Handoff::from_json(b"not json at all"),
            Err(HandoffError::Malformed(_))
        );
    }

    #[test]
    fn serde_round_trip() {
        let handoff = Handoff {
            schema_version: 1,
            from_tier: 1,
            findings: "found".into(),
            next_prompt: "do more".into(),
            services: vec!["svc".into()],
            session_id: None,
        };
        let raw = serde_json::to_vec(&handoff).unwrap();
        assert_eq!(Handoff::from_json(&raw).unwrap(), handoff);
    }
}
