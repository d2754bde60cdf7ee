//! The session manager: one subprocess at a time, escalation chains, and
//! the periodic scheduler.

use std::path::PathBuf;
use std::sync::Arc;

use metrics::{counter, gauge};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use vigil_core::handoff::Handoff;
use vigil_core::session::{SessionStatus, TriggerKind};
use vigil_core::tier::Tier;
use vigil_cooldown::CooldownEngine;
use vigil_hub::{Channel, SessionHub, SubscriptionGuard};
use vigil_memory::MemoryEngine;
use vigil_settings::{Settings, SettingsHandle};
use vigil_store::Store;
use vigil_store::row_types::SessionRow;
use vigil_stream::StreamParser;

use crate::command::{build_invocation, scheduled_prompt};
use crate::control::SessionControl;
use crate::descriptor::merge_descriptors;
use crate::errors::RuntimeError;
use crate::handoff::{HandoffCheck, discard_stale, take_handoff};
use crate::latch::{LatchGuard, SessionLatch};
use crate::summary::summarize_session;

/// How one session ended, as seen by the chain runner.
enum SessionOutcome {
    Completed,
    Failed,
    TimedOut,
    Escalated(Handoff),
}

/// Everything a running chain needs, detached from the manager so the
/// spawned task owns plain clones instead of a self-reference.
#[derive(Clone)]
struct Inner {
    store: Arc<Store>,
    settings: SettingsHandle,
    memory: Arc<MemoryEngine>,
    cooldown: Arc<CooldownEngine>,
    hub: Arc<SessionHub>,
}

/// The session manager. One per process, shared via `Arc`.
pub struct SessionManager {
    inner: Inner,
    latch: SessionLatch,
}

impl SessionManager {
    /// Wire up the manager from the shared components.
    #[must_use]
    pub fn new(
        store: Arc<Store>,
        settings: SettingsHandle,
        memory: Arc<MemoryEngine>,
        cooldown: Arc<CooldownEngine>,
        hub: Arc<SessionHub>,
    ) -> Self {
        Self {
            inner: Inner {
                store,
                settings,
                memory,
                cooldown,
                hub,
            },
            latch: SessionLatch::new(),
        }
    }

    /// The session latch (shared with anything that needs a busy check).
    #[must_use]
    pub fn latch(&self) -> &SessionLatch {
        &self.latch
    }

    /// The fan-out hub.
    #[must_use]
    pub fn hub(&self) -> &Arc<SessionHub> {
        &self.inner.hub
    }

    /// Mark a session left `running` by a previous process as failed.
    /// Called once at startup, before the scheduler begins.
    pub fn recover_stale_sessions(&self) -> Result<(), RuntimeError> {
        if let Some(stale) = self.inner.store.running_session()? {
            warn!(
                session_id = stale.id,
                "found session still marked running from a previous process, failing it"
            );
            let _ = self.inner.store.finalize_session(
                stale.id,
                SessionStatus::Failed.as_str(),
                None,
            )?;
        }
        Ok(())
    }

    /// Start a session chain. Returns the first session's id as soon as its
    /// row exists — before the subprocess produces any output.
    #[instrument(skip(self, prompt), fields(start_tier = start_tier.as_u8(), trigger = %trigger))]
    pub fn trigger(
        &self,
        prompt: String,
        start_tier: Tier,
        trigger: TriggerKind,
    ) -> Result<i64, RuntimeError> {
        let guard = self.latch.try_acquire().ok_or(RuntimeError::AlreadyRunning)?;
        let settings = self.inner.settings.snapshot();
        let tier = start_tier.clamp_to(settings.max_tier);
        let model = settings.model_for_tier(tier).to_string();

        let session =
            self.inner
                .store
                .create_session(tier, &model, &prompt, trigger.as_str(), None)?;
        info!(session_id = session.id, tier = tier.as_u8(), "session triggered");

        let inner = self.inner.clone();
        let id = session.id;
        drop(tokio::spawn(async move {
            inner.run_chain(guard, session, prompt, tier, trigger).await;
        }));
        Ok(id)
    }

    /// The periodic scheduler. Ticks immediately, then every
    /// `interval_secs`; a tick that finds the latch held is skipped.
    pub async fn run_scheduler(&self, shutdown: CancellationToken) {
        info!("scheduler started");
        loop {
            match self.trigger(scheduled_prompt(), Tier::One, TriggerKind::Scheduled) {
                Ok(session_id) => debug!(session_id, "scheduled tick started"),
                Err(RuntimeError::AlreadyRunning) => {
                    debug!("scheduled tick skipped, session in flight");
                }
                Err(err) => error!(error = %err, "scheduled tick failed"),
            }

            let interval = self.inner.settings.snapshot().interval_secs;
            tokio::select! {
                () = shutdown.cancelled() => break,
                () = tokio::time::sleep(std::time::Duration::from_secs(interval)) => {}
            }
        }
        info!("scheduler stopped");
    }
}

impl SessionControl for SessionManager {
    fn trigger_ad_hoc(
        &self,
        prompt: &str,
        start_tier: Tier,
        trigger: TriggerKind,
    ) -> Result<i64, RuntimeError> {
        self.trigger(prompt.to_string(), start_tier, trigger)
    }

    fn subscribe(
        &self,
        session_id: i64,
        channel: Channel,
    ) -> (
        tokio::sync::mpsc::Receiver<Arc<String>>,
        SubscriptionGuard,
    ) {
        self.inner.hub.subscribe(session_id, channel)
    }

    fn is_busy(&self) -> bool {
        self.latch.is_held()
    }
}

impl Inner {
    /// Run a session and every escalation it hands off to, then release the
    /// latch (the guard drops with this frame).
    async fn run_chain(
        &self,
        guard: LatchGuard,
        first: SessionRow,
        prompt: String,
        tier: Tier,
        trigger: TriggerKind,
    ) {
        gauge!("session_running").set(1.0);
        let mut session = first;
        let mut prompt = prompt;
        let mut tier = tier;

        loop {
            let outcome = self.run_session(&session, &prompt, tier).await;
            let Some(handoff) = (match outcome {
                SessionOutcome::Escalated(handoff) => Some(handoff),
                _ => None,
            }) else {
                break;
            };

            let settings = self.settings.snapshot();
            let Some(next_tier) = tier.next().filter(|t| *t <= settings.max_tier) else {
                // run_session only reports Escalated below max tier.
                break;
            };

            let model = settings.model_for_tier(next_tier).to_string();
            match self.store.create_session(
                next_tier,
                &model,
                &handoff.next_prompt,
                trigger.as_str(),
                Some(session.id),
            ) {
                Ok(child) => {
                    info!(
                        parent_id = session.id,
                        session_id = child.id,
                        tier = next_tier.as_u8(),
                        "escalating"
                    );
                    prompt = handoff.next_prompt;
                    tier = next_tier;
                    session = child;
                }
                Err(err) => {
                    error!(parent_id = session.id, error = %err, "failed to create escalation session");
                    break;
                }
            }
        }

        gauge!("session_running").set(0.0);
        drop(guard);
    }

    fn pre_session_checks(&self, settings: &Settings) -> Result<(), RuntimeError> {
        std::fs::create_dir_all(&settings.state_dir)?;
        std::fs::create_dir_all(&settings.results_dir)?;
        if let Err(err) = self.cooldown.ensure_state_file() {
            warn!(error = %err, "cooldown state file check failed");
        }
        discard_stale(&settings.handoff_path());

        let baseline = settings.state_dir.join("tool-config.base.json");
        let target = settings.state_dir.join("tool-config.json");
        match merge_descriptors(&baseline, &settings.repos_dir, &target) {
            Ok(report) => debug!(?report, "tool descriptors merged"),
            Err(err) => warn!(error = %err, "tool descriptor merge failed"),
        }
        Ok(())
    }

    fn log_path_for(settings: &Settings, session_id: i64) -> PathBuf {
        let stamp = chrono::Utc::now().format("run-%Y%m%d-%H%M%S");
        let candidate = settings.results_dir.join(format!("{stamp}.log"));
        if candidate.exists() {
            // Escalation chains can start two sessions in one second.
            settings.results_dir.join(format!("{stamp}-{session_id}.log"))
        } else {
            candidate
        }
    }

    #[instrument(skip(self, prompt), fields(session_id = session.id, tier = tier.as_u8()))]
    async fn run_session(
        &self,
        session: &SessionRow,
        prompt: &str,
        tier: Tier,
    ) -> SessionOutcome {
        let settings = self.settings.snapshot();

        if let Err(err) = self.memory.decay() {
            warn!(error = %err, "memory decay failed, continuing");
        }
        if let Err(err) = self.pre_session_checks(&settings) {
            error!(error = %err, "pre-session checks failed");
            return self.finish(session.id, SessionStatus::Failed, Some(-1), None);
        }

        let memory_block = self
            .memory
            .context(settings.memory_budget)
            .unwrap_or_else(|err| {
                warn!(error = %err, "memory context assembly failed, injecting none");
                String::new()
            });
        let invocation = build_invocation(&settings, tier, prompt, &memory_block);

        let log_path = Self::log_path_for(&settings, session.id);
        let mut parser = match StreamParser::new(
            session.id,
            tier.as_u8(),
            Arc::clone(&self.store),
            Arc::clone(&self.memory),
            Arc::clone(&self.cooldown),
            Arc::clone(&self.hub),
            &log_path,
        ) {
            Ok(parser) => parser,
            Err(err) => {
                error!(error = %err, "failed to set up stream parser");
                return self.finish(session.id, SessionStatus::Failed, Some(-1), None);
            }
        };

        let mut child = match Command::new(&invocation.program)
            .args(&invocation.args)
            .envs(invocation.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => child,
            Err(err) => {
                error!(program = %invocation.program, error = %err, "failed to launch agent subprocess");
                parser.finish();
                return self.finish(session.id, SessionStatus::Failed, Some(-1), None);
            }
        };

        if let Some(stderr) = child.stderr.take() {
            let session_id = session.id;
            drop(tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(session_id, line = %line, "agent stderr");
                }
            }));
        }

        let stdout = child.stdout.take();
        let timeout = std::time::Duration::from_secs(settings.session_timeout_secs);
        let run = async {
            if let Some(stdout) = stdout {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    parser.handle_line(&line);
                }
            }
            child.wait().await
        };

        let status = match tokio::time::timeout(timeout, run).await {
            Ok(Ok(status)) => status,
            Ok(Err(err)) => {
                error!(error = %err, "failed to reap agent subprocess");
                parser.finish();
                return self.finish(session.id, SessionStatus::Failed, Some(-1), None);
            }
            Err(_elapsed) => {
                warn!(
                    timeout_secs = settings.session_timeout_secs,
                    "session exceeded wall-clock timeout, terminating"
                );
                let _ = child.start_kill();
                let _ = child.wait().await;
                parser.finish();
                return self.finish(session.id, SessionStatus::TimedOut, None, None);
            }
        };
        parser.finish();

        let exit_code = status.code().unwrap_or(-1);
        let response = parser.result().and_then(|r| r.result.clone());

        if !status.success() {
            // No escalation on failure, even with a handoff on disk.
            discard_stale(&settings.handoff_path());
            return self.finish(
                session.id,
                SessionStatus::Failed,
                Some(exit_code),
                response.as_deref(),
            );
        }

        match take_handoff(&settings.handoff_path()) {
            HandoffCheck::Valid(handoff) if tier < settings.max_tier => {
                let _ = self.finish(
                    session.id,
                    SessionStatus::Escalated,
                    Some(exit_code),
                    response.as_deref(),
                );
                SessionOutcome::Escalated(handoff)
            }
            HandoffCheck::Valid(_) => {
                warn!("handoff written at max tier, escalation not permitted");
                self.finish(
                    session.id,
                    SessionStatus::Completed,
                    Some(exit_code),
                    response.as_deref(),
                )
            }
            HandoffCheck::Rejected => {
                // Session stays completed; the warning already fired.
                self.finish(
                    session.id,
                    SessionStatus::Completed,
                    Some(exit_code),
                    response.as_deref(),
                )
            }
            HandoffCheck::Absent => self.finish(
                session.id,
                SessionStatus::Completed,
                Some(exit_code),
                response.as_deref(),
            ),
        }
    }

    /// Finalize the session row, record metrics, and fire the summary call.
    /// Returns the outcome matching `status` for plain (non-escalated) ends.
    fn finish(
        &self,
        session_id: i64,
        status: SessionStatus,
        exit_code: Option<i32>,
        response: Option<&str>,
    ) -> SessionOutcome {
        if let Err(err) = self
            .store
            .finalize_session(session_id, status.as_str(), exit_code)
        {
            error!(session_id, error = %err, "failed to finalize session row");
        }
        counter!("sessions_total", "status" => status.as_str()).increment(1);
        info!(session_id, status = %status, ?exit_code, "session finished");

        if let Some(response) = response {
            let settings = self.settings.snapshot();
            let store = Arc::clone(&self.store);
            let response = response.to_string();
            drop(tokio::spawn(async move {
                if let Some(summary) = summarize_session(&settings, &response).await {
                    if let Err(err) = store.set_session_summary(session_id, &summary) {
                        warn!(session_id, error = %err, "failed to store session summary");
                    }
                }
            }));
        }

        match status {
            SessionStatus::TimedOut => SessionOutcome::TimedOut,
            SessionStatus::Failed => SessionOutcome::Failed,
            _ => SessionOutcome::Completed,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
