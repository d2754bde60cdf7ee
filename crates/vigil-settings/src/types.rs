//! The settings type and its layered resolution.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::Serialize;

use vigil_core::tier::Tier;

use crate::errors::{Result, SettingsError};

/// Resolved supervisor settings.
///
/// Serialized camelCase for the config API. Secrets (`chat_api_key`,
/// `anthropic_api_key`) are never serialized.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// Seconds between scheduler ticks.
    pub interval_secs: u64,
    /// Directory for cooldown/handoff state.
    pub state_dir: PathBuf,
    /// Directory for session log files.
    pub results_dir: PathBuf,
    /// Directory scanned for per-repo tool descriptors.
    pub repos_dir: PathBuf,
    /// Dashboard/API listen port.
    pub dashboard_port: u16,
    /// Highest tier escalation may reach.
    pub max_tier: Tier,
    /// When set, the agent is told to observe without remediating.
    pub dry_run: bool,
    /// Model per tier, index 0 = tier 1.
    pub tier_models: [String; 3],
    /// Baseline allowed-tools list.
    pub allowed_tools: Vec<String>,
    /// Baseline disallowed-tools list.
    pub disallowed_tools: Vec<String>,
    /// Per-tier allowed-tools overrides.
    pub tier_allowed_tools: [Option<Vec<String>>; 3],
    /// Per-tier disallowed-tools overrides.
    pub tier_disallowed_tools: [Option<Vec<String>>; 3],
    /// Token budget for injected memory context.
    pub memory_budget: usize,
    /// Model for post-run summaries (`None` disables them).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary_model: Option<String>,
    /// Model for webhook brief synthesis (`None` falls back to summary model).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook_model: Option<String>,
    /// System prompt override for webhook brief synthesis.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook_system_prompt: Option<String>,
    /// Notification targets, passed through to the subprocess untouched.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub apprise_urls: Option<String>,
    /// Bearer key for the OpenAI/Ollama/webhook endpoints.
    #[serde(skip)]
    pub chat_api_key: Option<String>,
    /// API key for the supervisor's own synthesis calls.
    #[serde(skip)]
    pub anthropic_api_key: Option<String>,
    /// Whether the agent is told PR tools are available.
    pub pr_enabled: bool,
    /// Agent CLI binary.
    pub agent_bin: String,
    /// Wall-clock timeout for one session, seconds.
    pub session_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            interval_secs: 3600,
            state_dir: PathBuf::from("state"),
            results_dir: PathBuf::from("results"),
            repos_dir: PathBuf::from("repos"),
            dashboard_port: 8080,
            max_tier: Tier::Three,
            dry_run: false,
            tier_models: [
                "claude-haiku-4-5".to_string(),
                "claude-sonnet-4-5".to_string(),
                "claude-opus-4-1".to_string(),
            ],
            allowed_tools: vec![
                "Bash".to_string(),
                "Read".to_string(),
                "Grep".to_string(),
                "Glob".to_string(),
            ],
            disallowed_tools: vec!["WebSearch".to_string()],
            tier_allowed_tools: [None, None, None],
            tier_disallowed_tools: [None, None, None],
            memory_budget: 2000,
            summary_model: None,
            webhook_model: None,
            webhook_system_prompt: None,
            apprise_urls: None,
            chat_api_key: None,
            anthropic_api_key: None,
            pr_enabled: true,
            agent_bin: "claude".to_string(),
            session_timeout_secs: 1800,
        }
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(SettingsError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            reason: "expected a boolean".into(),
        }),
    }
}

fn parse_num<T: std::str::FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e: T::Err| SettingsError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
        reason: e.to_string(),
    })
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

impl Settings {
    /// Resolve from compiled defaults plus the process environment.
    pub fn from_env() -> Result<Self> {
        let vars: HashMap<String, String> = std::env::vars().collect();
        Self::from_env_map(&vars)
    }

    /// Resolve from compiled defaults plus an explicit variable map (tests).
    pub fn from_env_map(vars: &HashMap<String, String>) -> Result<Self> {
        let mut settings = Settings::default();
        for (key, value) in vars {
            match settings.apply_kv(key, value) {
                Ok(()) | Err(SettingsError::UnknownKey(_)) => {}
                Err(err) => return Err(err),
            }
        }
        Ok(settings)
    }

    /// Apply one key/value pair. Keys are case-insensitive and match the
    /// environment variable names (`INTERVAL`, `TIER2_MODEL`, …).
    ///
    /// Returns [`SettingsError::UnknownKey`] for unrecognised keys so callers
    /// can decide whether that is fatal (runtime PUT) or ignorable (process
    /// environment, which is full of unrelated variables).
    pub fn apply_kv(&mut self, key: &str, value: &str) -> Result<()> {
        let key = key.to_ascii_lowercase();
        match key.as_str() {
            "interval" => self.interval_secs = parse_num(&key, value)?,
            "state_dir" => self.state_dir = PathBuf::from(value),
            "results_dir" => self.results_dir = PathBuf::from(value),
            "repos_dir" => self.repos_dir = PathBuf::from(value),
            "dashboard_port" => self.dashboard_port = parse_num(&key, value)?,
            "max_tier" => {
                let n: u8 = parse_num(&key, value)?;
                self.max_tier = Tier::from_u8(n).ok_or_else(|| SettingsError::InvalidValue {
                    key: key.clone(),
                    value: value.to_string(),
                    reason: "tier must be 1-3".into(),
                })?;
            }
            "dry_run" => self.dry_run = parse_bool(&key, value)?,
            "tier1_model" => self.tier_models[0] = value.to_string(),
            "tier2_model" => self.tier_models[1] = value.to_string(),
            "tier3_model" => self.tier_models[2] = value.to_string(),
            "allowed_tools" => self.allowed_tools = parse_list(value),
            "disallowed_tools" => self.disallowed_tools = parse_list(value),
            "tier1_allowed_tools" => self.tier_allowed_tools[0] = Some(parse_list(value)),
            "tier2_allowed_tools" => self.tier_allowed_tools[1] = Some(parse_list(value)),
            "tier3_allowed_tools" => self.tier_allowed_tools[2] = Some(parse_list(value)),
            "tier1_disallowed_tools" => self.tier_disallowed_tools[0] = Some(parse_list(value)),
            "tier2_disallowed_tools" => self.tier_disallowed_tools[1] = Some(parse_list(value)),
            "tier3_disallowed_tools" => self.tier_disallowed_tools[2] = Some(parse_list(value)),
            "memory_budget" => self.memory_budget = parse_num(&key, value)?,
            "summary_model" => self.summary_model = some_nonempty(value),
            "webhook_model" => self.webhook_model = some_nonempty(value),
            "webhook_system_prompt" => self.webhook_system_prompt = some_nonempty(value),
            "apprise_urls" => self.apprise_urls = some_nonempty(value),
            "chat_api_key" => self.chat_api_key = some_nonempty(value),
            "anthropic_api_key" => self.anthropic_api_key = some_nonempty(value),
            "pr_enabled" => self.pr_enabled = parse_bool(&key, value)?,
            "agent_bin" => self.agent_bin = value.to_string(),
            "session_timeout" => self.session_timeout_secs = parse_num(&key, value)?,
            _ => return Err(SettingsError::UnknownKey(key)),
        }
        Ok(())
    }

    /// Overlay persisted config entries. Bad values are logged and skipped —
    /// a stale table row must not take the supervisor down.
    pub fn overlay(&mut self, entries: &[(String, String)]) {
        for (key, value) in entries {
            if let Err(err) = self.apply_kv(key, value) {
                tracing::warn!(key, value, error = %err, "skipping persisted config entry");
            }
        }
    }

    /// Model for a tier.
    #[must_use]
    pub fn model_for_tier(&self, tier: Tier) -> &str {
        &self.tier_models[usize::from(tier.as_u8() - 1)]
    }

    /// Allowed-tools for a tier: per-tier override, else the baseline.
    #[must_use]
    pub fn allowed_tools_for_tier(&self, tier: Tier) -> &[String] {
        self.tier_allowed_tools[usize::from(tier.as_u8() - 1)]
            .as_deref()
            .unwrap_or(&self.allowed_tools)
    }

    /// Disallowed-tools for a tier: per-tier override, else the baseline.
    #[must_use]
    pub fn disallowed_tools_for_tier(&self, tier: Tier) -> &[String] {
        self.tier_disallowed_tools[usize::from(tier.as_u8() - 1)]
            .as_deref()
            .unwrap_or(&self.disallowed_tools)
    }

    /// Database file under the state dir.
    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.state_dir.join("vigil.db")
    }

    /// Cooldown state file under the state dir.
    #[must_use]
    pub fn cooldown_path(&self) -> PathBuf {
        self.state_dir.join("cooldown.json")
    }

    /// Handoff document under the state dir.
    #[must_use]
    pub fn handoff_path(&self) -> PathBuf {
        self.state_dir.join("handoff.json")
    }
}

fn some_nonempty(value: &str) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn defaults_are_sane() {
        let s = Settings::default();
        assert_eq!(s.interval_secs, 3600);
        assert_eq!(s.dashboard_port, 8080);
        assert_eq!(s.max_tier, Tier::Three);
        assert_eq!(s.memory_budget, 2000);
        assert!(!s.dry_run);
        assert!(s.pr_enabled);
        assert_eq!(s.agent_bin, "claude");
    }

    #[test]
    fn env_overrides_defaults() {
        let vars = env(&[
            ("INTERVAL", "900"),
            ("MAX_TIER", "2"),
            ("DRY_RUN", "true"),
            ("TIER2_MODEL", "claude-test"),
            ("STATE_DIR", "/var/lib/vigil"),
        ]);
        let s = Settings::from_env_map(&vars).unwrap();
        assert_eq!(s.interval_secs, 900);
        assert_eq!(s.max_tier, Tier::Two);
        assert!(s.dry_run);
        assert_eq!(s.tier_models[1], "claude-test");
        assert_eq!(s.state_dir, PathBuf::from("/var/lib/vigil"));
    }

    #[test]
    fn unrelated_env_vars_ignored() {
        let vars = env(&[("PATH", "/usr/bin"), ("HOME", "/root"), ("INTERVAL", "60")]);
        let s = Settings::from_env_map(&vars).unwrap();
        assert_eq!(s.interval_secs, 60);
    }

    #[test]
    fn bad_env_value_is_fatal() {
        let vars = env(&[("INTERVAL", "soon")]);
        assert!(Settings::from_env_map(&vars).is_err());
    }

    #[test]
    fn max_tier_out_of_range_rejected() {
        let mut s = Settings::default();
        assert!(s.apply_kv("MAX_TIER", "5").is_err());
        assert!(s.apply_kv("max_tier", "0").is_err());
    }

    #[test]
    fn tool_lists_parse_and_trim() {
        let mut s = Settings::default();
        s.apply_kv("ALLOWED_TOOLS", "Bash, Read , Edit,").unwrap();
        assert_eq!(s.allowed_tools, vec!["Bash", "Read", "Edit"]);
    }

    #[test]
    fn tier_tool_overrides() {
        let mut s = Settings::default();
        s.apply_kv("TIER3_ALLOWED_TOOLS", "Bash,Edit,Write").unwrap();

        assert_eq!(
            s.allowed_tools_for_tier(Tier::Three),
            &["Bash", "Edit", "Write"]
        );
        // Other tiers fall back to the baseline.
        assert_eq!(s.allowed_tools_for_tier(Tier::One), s.allowed_tools.as_slice());
    }

    #[test]
    fn overlay_skips_bad_entries() {
        let mut s = Settings::default();
        s.overlay(&[
            ("interval".to_string(), "1200".to_string()),
            ("interval".to_string(), "garbage".to_string()),
            ("no_such_key".to_string(), "x".to_string()),
        ]);
        assert_eq!(s.interval_secs, 1200);
    }

    #[test]
    fn runtime_put_rejects_unknown_key() {
        let mut s = Settings::default();
        assert!(matches!(
            s.apply_kv("definitely_not_a_key", "1"),
            Err(SettingsError::UnknownKey(_))
        ));
    }

    #[test]
    fn empty_optional_values_stay_none() {
        let mut s = Settings::default();
        s.apply_kv("SUMMARY_MODEL", "  ").unwrap();
        assert!(s.summary_model.is_none());
        s.apply_kv("SUMMARY_MODEL", "claude-haiku-4-5").unwrap();
        assert_eq!(s.summary_model.as_deref(), Some("claude-haiku-4-5"));
    }

    #[test]
    fn derived_paths() {
        let mut s = Settings::default();
        s.apply_kv("STATE_DIR", "/srv/vigil").unwrap();
        assert_eq!(s.db_path(), PathBuf::from("/srv/vigil/vigil.db"));
        assert_eq!(s.cooldown_path(), PathBuf::from("/srv/vigil/cooldown.json"));
        assert_eq!(s.handoff_path(), PathBuf::from("/srv/vigil/handoff.json"));
    }

    #[test]
    fn secrets_not_serialized() {
        let mut s = Settings::default();
        s.chat_api_key = Some("sk-secret".into());
        s.anthropic_api_key = Some("sk-ant-secret".into());
        let json = serde_json::to_string(&s).unwrap();
        assert!(!json.contains("secret"));
    }
}
