//! Marker extraction from assistant text.
//!
//! Three marker shapes, regexes pinned:
//!
//! ```text
//! [EVENT:info|warning|critical(:service)?] message
//! [MEMORY:timing|dependency|behavior|remediation|maintenance(:service)?] observation
//! [COOLDOWN:restart|redeployment:service] success|failure — message
//! ```
//!
//! Markers are parsed greedily, one per regex match. A message runs until
//! the next `[` (the following marker) or `<` (an HTML tag boundary) — the
//! `regex` crate has no lookahead, so the boundary is a character class and
//! a literal `[`/`<` inside a message ends the capture. Matches from all
//! three shapes are returned in text order.

use std::sync::LazyLock;

use regex::Regex;

use vigil_core::marker::{CooldownKind, EventLevel, MemoryCategory};

static EVENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[EVENT:(info|warning|critical)(?::([A-Za-z0-9._-]+))?\]\s*([^\[<]+)")
        .expect("event marker regex")
});

static MEMORY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\[MEMORY:(timing|dependency|behavior|remediation|maintenance)(?::([A-Za-z0-9._-]+))?\]\s*([^\[<]+)",
    )
    .expect("memory marker regex")
});

static COOLDOWN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\[COOLDOWN:(restart|redeployment):([A-Za-z0-9._-]+)\]\s*(success|failure)\s*(?:[—–-]+\s*)?([^\[<]+)",
    )
    .expect("cooldown marker regex")
});

/// One extracted marker, in the order it appeared.
#[derive(Clone, Debug, PartialEq)]
pub enum Marker {
    /// `[EVENT:…]` — becomes an event row.
    Event {
        /// Severity.
        level: EventLevel,
        /// Implicated service, if named.
        service: Option<String>,
        /// Message text, trimmed.
        message: String,
    },
    /// `[MEMORY:…]` — becomes a memory upsert.
    Memory {
        /// Category.
        category: MemoryCategory,
        /// Service, if named.
        service: Option<String>,
        /// Observation text, trimmed.
        observation: String,
    },
    /// `[COOLDOWN:…]` — becomes a cooldown action record.
    Cooldown {
        /// Action class.
        kind: CooldownKind,
        /// Target service (mandatory in this shape).
        service: String,
        /// Whether the agent reported success.
        success: bool,
        /// Message text, trimmed.
        message: String,
    },
}

/// Scan one assistant text block for markers, returned in text order.
#[must_use]
pub fn extract_markers(text: &str) -> Vec<Marker> {
    let mut found: Vec<(usize, Marker)> = Vec::new();

    for caps in EVENT_RE.captures_iter(text) {
        let Some(level) = EventLevel::parse(&caps[1]) else {
            continue;
        };
        found.push((
            caps.get(0).map_or(0, |m| m.start()),
            Marker::Event {
                level,
                service: caps.get(2).map(|m| m.as_str().to_string()),
                message: caps[3].trim().to_string(),
            },
        ));
    }

    for caps in MEMORY_RE.captures_iter(text) {
        let Some(category) = MemoryCategory::parse(&caps[1]) else {
            continue;
        };
        found.push((
            caps.get(0).map_or(0, |m| m.start()),
            Marker::Memory {
                category,
                service: caps.get(2).map(|m| m.as_str().to_string()),
                observation: caps[3].trim().to_string(),
            },
        ));
    }

    for caps in COOLDOWN_RE.captures_iter(text) {
        let Some(kind) = CooldownKind::parse(&caps[1]) else {
            continue;
        };
        found.push((
            caps.get(0).map_or(0, |m| m.start()),
            Marker::Cooldown {
                kind,
                service: caps[2].to_string(),
                success: &caps[3] == "success",
                message: caps[4].trim().to_string(),
            },
        ));
    }

    found.sort_by_key(|(offset, _)| *offset);
    found
        .into_iter()
        .map(|(_, marker)| marker)
        .filter(|marker| !marker_message(marker).is_empty())
        .collect()
}

fn marker_message(marker: &Marker) -> &str {
    match marker {
        Marker::Event { message, .. } | Marker::Cooldown { message, .. } => message,
        Marker::Memory { observation, .. } => observation,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_with_service() {
        let markers = extract_markers("[EVENT:warning:jellyfin] transcode queue backed up");
        assert_eq!(
            markers,
            vec![Marker::Event {
                level: EventLevel::Warning,
                service: Some("jellyfin".into()),
                message: "transcode queue backed up".into(),
            }]
        );
    }

    #[test]
    fn event_without_service() {
        let markers = extract_markers("[EVENT:info] all checks passed");
        assert_eq!(
            markers,
            vec![Marker::Event {
                level: EventLevel::Info,
                service: None,
                message: "all checks passed".into(),
            }]
        );
    }

    #[test]
    fn unknown_level_is_not_a_marker() {
        assert!(extract_markers("[EVENT:debug] nope").is_empty());
    }

    #[test]
    fn memory_marker() {
        let markers = extract_markers("[MEMORY:timing:jellyfin] Takes 60s to start");
        assert_eq!(
            markers,
            vec![Marker::Memory {
                category: MemoryCategory::Timing,
                service: Some("jellyfin".into()),
                observation: "Takes 60s to start".into(),
            }]
        );
    }

    #[test]
    fn memory_without_service_is_general() {
        let markers = extract_markers("[MEMORY:maintenance] Backups run on Sundays at 03:00");
        assert_eq!(
            markers,
            vec![Marker::Memory {
                category: MemoryCategory::Maintenance,
                service: None,
                observation: "Backups run on Sundays at 03:00".into(),
            }]
        );
    }

    #[test]
    fn cooldown_success_em_dash() {
        let markers =
            extract_markers("[COOLDOWN:restart:jellyfin] success — service came back in 45s");
        assert_eq!(
            markers,
            vec![Marker::Cooldown {
                kind: CooldownKind::Restart,
                service: "jellyfin".into(),
                success: true,
                message: "service came back in 45s".into(),
            }]
        );
    }

    #[test]
    fn cooldown_failure_ascii_dash() {
        let markers = extract_markers("[COOLDOWN:redeployment:sonarr] failure - image pull timed out");
        assert_eq!(
            markers,
            vec![Marker::Cooldown {
                kind: CooldownKind::Redeployment,
                service: "sonarr".into(),
                success: false,
                message: "image pull timed out".into(),
            }]
        );
    }

    #[test]
    fn cooldown_requires_service() {
        assert!(extract_markers("[COOLDOWN:restart] success — no target").is_empty());
    }

    #[test]
    fn message_halts_at_next_marker() {
        let text = "[EVENT:info:a] first thing [EVENT:critical:b] second thing";
        let markers = extract_markers(text);
        assert_eq!(markers.len(), 2);
        assert_eq!(
            markers[0],
            Marker::Event {
                level: EventLevel::Info,
                service: Some("a".into()),
                message: "first thing".into(),
            }
        );
        assert_eq!(
            markers[1],
            Marker::Event {
                level: EventLevel::Critical,
                service: Some("b".into()),
                message: "second thing".into(),
            }
        );
    }

    #[test]
    fn message_halts_at_html_tag() {
        let markers = extract_markers("[EVENT:info] before tag <br> after tag");
        assert_eq!(
            markers,
            vec![Marker::Event {
                level: EventLevel::Info,
                service: None,
                message: "before tag".into(),
            }]
        );
    }

    #[test]
    fn mixed_markers_preserve_text_order() {
        let text = "status update [EVENT:warning:gitea] slow responses\n\
                    [MEMORY:behavior:gitea] Slows down during nightly mirror sync\n\
                    [COOLDOWN:restart:gitea] success — restarted cleanly";
        let markers = extract_markers(text);
        assert_eq!(markers.len(), 3);
        assert!(matches!(markers[0], Marker::Event { .. }));
        assert!(matches!(markers[1], Marker::Memory { .. }));
        assert!(matches!(markers[2], Marker::Cooldown { .. }));
    }

    #[test]
    fn plain_text_has_no_markers() {
        assert!(extract_markers("just chatting about [brackets] and such").is_empty());
        assert!(extract_markers("").is_empty());
    }

    #[test]
    fn empty_message_is_dropped() {
        assert!(extract_markers("[EVENT:info] <br>").is_empty());
    }

    #[test]
    fn service_names_with_dots_and_dashes() {
        let markers = extract_markers("[EVENT:critical:node-exporter.internal] scrape failing");
        assert_eq!(
            markers,
            vec![Marker::Event {
                level: EventLevel::Critical,
                service: Some("node-exporter.internal".into()),
                message: "scrape failing".into(),
            }]
        );
    }

    #[test]
    fn multiline_messages_capture_across_newlines() {
        // The character class excludes only '[' and '<', so newlines are
        // captured; trim keeps the interior newline.
        let markers = extract_markers("[EVENT:info] line one\nline two");
        assert_eq!(
            markers,
            vec![Marker::Event {
                level: EventLevel::Info,
                service: None,
                message: "line one\nline two".into(),
            }]
        );
    }
}
