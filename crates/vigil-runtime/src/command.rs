//! Subprocess invocation assembly.
//!
//! Builds the agent CLI argument list for one session: model, prompt,
//! tool allow/deny lists, stream-json output, and the runtime context
//! appended to the system prompt (tier, dry-run, paths, higher-tier models,
//! memory block, marker grammar).

use vigil_core::tier::Tier;
use vigil_settings::Settings;

/// A fully assembled invocation, ready for `tokio::process::Command`.
#[derive(Clone, Debug, PartialEq)]
pub struct Invocation {
    /// Binary to execute.
    pub program: String,
    /// Argument list, in order.
    pub args: Vec<String>,
    /// Extra environment variables.
    pub env: Vec<(String, String)>,
}

/// The default prompt for scheduled ticks.
#[must_use]
pub fn scheduled_prompt() -> String {
    "Run the infrastructure health checks. Inspect each monitored service, \
     compare against known-good behavior, and remediate what you safely can \
     within your tier's authority. Before any restart or redeployment, \
     re-read the cooldown state file and respect its limits. Record \
     noteworthy findings as [EVENT:…] markers, durable observations as \
     [MEMORY:…] markers, and every destructive action as a [COOLDOWN:…] \
     marker."
        .to_string()
}

/// Build the runtime context block appended to the agent's system prompt.
#[must_use]
pub fn runtime_context(settings: &Settings, tier: Tier, memory_block: &str) -> String {
    let mut context = String::new();
    context.push_str(&format!("## Runtime Context\n\n- Tier: {tier}\n"));
    if settings.dry_run {
        context.push_str("- DRY RUN: observe and report only, take no remediation action\n");
    }
    context.push_str(&format!(
        "- State dir: {}\n- Results dir: {}\n- Repos dir: {}\n- Cooldown file: {}\n",
        settings.state_dir.display(),
        settings.results_dir.display(),
        settings.repos_dir.display(),
        settings.cooldown_path().display(),
    ));

    let mut higher = tier;
    while let Some(next) = higher.next() {
        if next > settings.max_tier {
            break;
        }
        context.push_str(&format!(
            "- Tier {next} model (escalation): {}\n",
            settings.model_for_tier(next)
        ));
        higher = next;
    }
    if tier < settings.max_tier {
        context.push_str(&format!(
            "- To escalate, write {} with schema_version 1, your findings, and a next_prompt\n",
            settings.handoff_path().display()
        ));
    }
    if settings.pr_enabled {
        context.push_str("- PR tools are available for configuration fixes\n");
    } else {
        context.push_str("- PR tools are unavailable in this deployment\n");
    }

    if !memory_block.is_empty() {
        context.push('\n');
        context.push_str(memory_block);
    }
    context
}

/// Assemble the full invocation for one session.
#[must_use]
pub fn build_invocation(
    settings: &Settings,
    tier: Tier,
    prompt: &str,
    memory_block: &str,
) -> Invocation {
    let mut args = vec![
        "-p".to_string(),
        prompt.to_string(),
        "--output-format".to_string(),
        "stream-json".to_string(),
        "--verbose".to_string(),
        "--model".to_string(),
        settings.model_for_tier(tier).to_string(),
    ];

    let allowed = settings.allowed_tools_for_tier(tier);
    if !allowed.is_empty() {
        args.push("--allowedTools".to_string());
        args.push(allowed.join(","));
    }
    let disallowed = settings.disallowed_tools_for_tier(tier);
    if !disallowed.is_empty() {
        args.push("--disallowedTools".to_string());
        args.push(disallowed.join(","));
    }

    args.push("--append-system-prompt".to_string());
    args.push(runtime_context(settings, tier, memory_block));

    let mut env = Vec::new();
    if let Some(urls) = &settings.apprise_urls {
        env.push(("APPRISE_URLS".to_string(), urls.clone()));
    }

    Invocation {
        program: settings.agent_bin.clone(),
        args,
        env,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
