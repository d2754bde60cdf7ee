//! Tool-descriptor merge.
//!
//! Repos under the repos dir may ship `.extensions/tool-config.json`
//! describing extra tool servers for the agent. Each tick the working
//! descriptor is rebuilt from the baseline — never from its own previous
//! contents — then repo entries are unioned in, alphabetically by repo
//! directory, with a repo entry of the same name winning over the baseline
//! (and a later repo over an earlier one).
//!
//! The write is protected by the scheduler latch: merging only happens
//! inside the pre-session checks.

use std::path::Path;

use serde_json::{Map, Value};
use tracing::{debug, warn};

/// Relative path of a repo's descriptor file.
pub const DESCRIPTOR_REL_PATH: &str = ".extensions/tool-config.json";

/// Top-level key whose entries are merged.
const SERVERS_KEY: &str = "mcpServers";

/// What one merge pass did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MergeReport {
    /// Repo directories scanned.
    pub repos_scanned: usize,
    /// Server entries in the merged result.
    pub entries: usize,
    /// Entries where a repo overrode the baseline or an earlier repo.
    pub overridden: usize,
}

fn servers_of(value: &Value) -> Map<String, Value> {
    value
        .get(SERVERS_KEY)
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default()
}

/// Rebuild `target` from `baseline` plus every repo descriptor.
pub fn merge_descriptors(
    baseline: &Path,
    repos_dir: &Path,
    target: &Path,
) -> std::io::Result<MergeReport> {
    let mut merged = if baseline.exists() {
        let raw = std::fs::read(baseline)?;
        serde_json::from_slice::<Value>(&raw).unwrap_or_else(|err| {
            warn!(path = %baseline.display(), error = %err, "baseline descriptor unparseable, starting empty");
            Value::Object(Map::new())
        })
    } else {
        Value::Object(Map::new())
    };
    if !merged.is_object() {
        warn!(path = %baseline.display(), "baseline descriptor is not an object, starting empty");
        merged = Value::Object(Map::new());
    }
    let mut servers = servers_of(&merged);

    let mut report = MergeReport::default();

    let mut repo_names: Vec<String> = match std::fs::read_dir(repos_dir) {
        Ok(entries) => entries
            .filter_map(std::result::Result::ok)
            .filter(|e| e.path().is_dir())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect(),
        Err(err) => {
            debug!(path = %repos_dir.display(), error = %err, "repos dir not readable, baseline only");
            Vec::new()
        }
    };
    repo_names.sort();

    for name in repo_names {
        let descriptor = repos_dir.join(&name).join(DESCRIPTOR_REL_PATH);
        if !descriptor.exists() {
            continue;
        }
        report.repos_scanned += 1;

        let value: Value = match std::fs::read(&descriptor)
            .map_err(|e| e.to_string())
            .and_then(|raw| serde_json::from_slice(&raw).map_err(|e| e.to_string()))
        {
            Ok(value) => value,
            Err(err) => {
                warn!(repo = name, error = err, "skipping unparseable tool descriptor");
                continue;
            }
        };

        for (server_name, server) in servers_of(&value) {
            if servers.insert(server_name.clone(), server).is_some() {
                report.overridden += 1;
                debug!(repo = name, server = server_name, "descriptor entry overridden");
            }
        }
    }

    report.entries = servers.len();
    if let Some(obj) = merged.as_object_mut() {
        let _ = obj.insert(SERVERS_KEY.to_string(), Value::Object(servers));
    }

    let json = serde_json::to_vec_pretty(&merged)?;
    let tmp = target.with_extension("json.tmp");
    std::fs::write(&tmp, json)?;
    std::fs::rename(&tmp, target)?;
    Ok(report)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(unused_results)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Fixture {
        dir: tempfile::TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                dir: tempfile::tempdir().unwrap(),
            }
        }

        fn baseline(&self, value: &Value) -> std::path::PathBuf {
            let path = self.dir.path().join("tool-config.base.json");
            std::fs::write(&path, serde_json::to_vec(value).unwrap()).unwrap();
            path
        }

        fn repos(&self) -> std::path::PathBuf {
            let path = self.dir.path().join("repos");
            std::fs::create_dir_all(&path).unwrap();
            path
        }

        fn repo_descriptor(&self, repo: &str, value: &Value) {
            let dir = self.dir.path().join("repos").join(repo).join(".extensions");
            std::fs::create_dir_all(&dir).unwrap();
            std::fs::write(
                dir.join("tool-config.json"),
                serde_json::to_vec(value).unwrap(),
            )
            .unwrap();
        }

        fn target(&self) -> std::path::PathBuf {
            self.dir.path().join("tool-config.json")
        }

        fn merged(&self) -> Value {
            serde_json::from_slice(&std::fs::read(self.target()).unwrap()).unwrap()
        }
    }

    #[test]
    fn baseline_only() {
        let fx = Fixture::new();
        let baseline = fx.baseline(&json!({"mcpServers": {"base": {"command": "base-cmd"}}}));
        let report = merge_descriptors(&baseline, &fx.repos(), &fx.target()).unwrap();

        assert_eq!(report.entries, 1);
        assert_eq!(report.repos_scanned, 0);
        assert_eq!(fx.merged()["mcpServers"]["base"]["command"], "base-cmd");
    }

    #[test]
    fn missing_baseline_starts_empty() {
        let fx = Fixture::new();
        let baseline = fx.dir.path().join("nope.json");
        let report = merge_descriptors(&baseline, &fx.repos(), &fx.target()).unwrap();
        assert_eq!(report.entries, 0);
        assert_eq!(fx.merged()["mcpServers"], json!({}));
    }

    #[test]
    fn repo_entries_unioned() {
        let fx = Fixture::new();
        let baseline = fx.baseline(&json!({"mcpServers": {"base": {"command": "base"}}}));
        fx.repo_descriptor("media", &json!({"mcpServers": {"jellyfin": {"command": "jf"}}}));

        let report = merge_descriptors(&baseline, &fx.repos(), &fx.target()).unwrap();
        assert_eq!(report.entries, 2);
        assert_eq!(report.repos_scanned, 1);
        let merged = fx.merged();
        assert_eq!(merged["mcpServers"]["base"]["command"], "base");
        assert_eq!(merged["mcpServers"]["jellyfin"]["command"], "jf");
    }

    #[test]
    fn repo_overrides_baseline() {
        let fx = Fixture::new();
        let baseline = fx.baseline(&json!({"mcpServers": {"shared": {"command": "old"}}}));
        fx.repo_descriptor("infra", &json!({"mcpServers": {"shared": {"command": "new"}}}));

        let report = merge_descriptors(&baseline, &fx.repos(), &fx.target()).unwrap();
        assert_eq!(report.overridden, 1);
        assert_eq!(fx.merged()["mcpServers"]["shared"]["command"], "new");
    }

    #[test]
    fn alphabetical_order_later_repo_wins() {
        let fx = Fixture::new();
        let baseline = fx.baseline(&json!({"mcpServers": {}}));
        fx.repo_descriptor("zeta", &json!({"mcpServers": {"dup": {"command": "from-zeta"}}}));
        fx.repo_descriptor("alpha", &json!({"mcpServers": {"dup": {"command": "from-alpha"}}}));

        merge_descriptors(&baseline, &fx.repos(), &fx.target()).unwrap();
        // alpha merges first, zeta second — zeta wins.
        assert_eq!(fx.merged()["mcpServers"]["dup"]["command"], "from-zeta");
    }

    #[test]
    fn rebuild_discards_previous_target_state() {
        let fx = Fixture::new();
        let baseline = fx.baseline(&json!({"mcpServers": {}}));
        std::fs::write(
            fx.target(),
            serde_json::to_vec(&json!({"mcpServers": {"ghost": {}}})).unwrap(),
        )
        .unwrap();

        merge_descriptors(&baseline, &fx.repos(), &fx.target()).unwrap();
        // The previous target's "ghost" entry is gone: baseline is the root.
        assert_eq!(fx.merged()["mcpServers"], json!({}));
    }

    #[test]
    fn unparseable_repo_descriptor_skipped() {
        let fx = Fixture::new();
        let baseline = fx.baseline(&json!({"mcpServers": {"base": {}}}));
        let dir = fx.dir.path().join("repos").join("broken").join(".extensions");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("tool-config.json"), b"{ nope").unwrap();

        let report = merge_descriptors(&baseline, &fx.repos(), &fx.target()).unwrap();
        assert_eq!(report.entries, 1);
    }

    #[test]
    fn repos_without_descriptor_ignored() {
        let fx = Fixture::new();
        let baseline = fx.baseline(&json!({"mcpServers": {}}));
        std::fs::create_dir_all(fx.dir.path().join("repos").join("plain")).unwrap();

        let report = merge_descriptors(&baseline, &fx.repos(), &fx.target()).unwrap();
        assert_eq!(report.repos_scanned, 0);
    }
}
