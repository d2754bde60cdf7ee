//! vigil — supervisor daemon for agent-driven infrastructure health checks.
//!
//! Exit codes: 0 clean shutdown on SIGINT/SIGTERM, 1 startup failure
//! (config, store open, port bind), 2 unrecoverable store corruption.

use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use vigil_cooldown::CooldownEngine;
use vigil_hub::SessionHub;
use vigil_memory::MemoryEngine;
use vigil_runtime::{SessionControl, SessionManager};
use vigil_server::{AppState, router};
use vigil_settings::{Settings, SettingsHandle};
use vigil_store::{ConnectionConfig, Store, StoreError};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

const EXIT_STARTUP: i32 = 1;
const EXIT_CORRUPT: i32 = 2;

#[derive(Parser)]
#[command(name = "vigil", version, about = "Agent-driven infrastructure supervisor")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the supervisor: scheduler plus dashboard/API server (default).
    Serve,
}

fn main() {
    let cli = Cli::parse();
    vigil_core::logging::init(vigil_core::logging::DEFAULT_DIRECTIVE);

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            let runtime = match tokio::runtime::Runtime::new() {
                Ok(runtime) => runtime,
                Err(err) => {
                    eprintln!("vigil: failed to start runtime: {err}");
                    std::process::exit(EXIT_STARTUP);
                }
            };
            if let Err(err) = runtime.block_on(serve()) {
                let code = if err
                    .downcast_ref::<StoreError>()
                    .is_some_and(|e| matches!(e, StoreError::Corrupt(_)))
                {
                    EXIT_CORRUPT
                } else {
                    EXIT_STARTUP
                };
                error!(error = %err, "startup failed");
                eprintln!("vigil: {err:#}");
                std::process::exit(code);
            }
        }
    }
}

async fn serve() -> anyhow::Result<()> {
    let mut settings = Settings::from_env().context("resolving settings from environment")?;

    std::fs::create_dir_all(&settings.state_dir).context("creating state dir")?;
    std::fs::create_dir_all(&settings.results_dir).context("creating results dir")?;

    // Open the store first so persisted config can overlay the env layer.
    let store =
        Store::open(&settings.db_path(), &ConnectionConfig::default()).context("opening store")?;
    let persisted: Vec<(String, String)> = store
        .all_config()
        .context("loading persisted config")?
        .into_iter()
        .map(|row| (row.key, row.value))
        .collect();
    settings.overlay(&persisted);

    let port = settings.dashboard_port;
    let cooldown_path = settings.cooldown_path();
    let settings = SettingsHandle::new(settings);
    let store = Arc::new(store);

    let hub = Arc::new(SessionHub::new());
    let memory = Arc::new(MemoryEngine::new(Arc::clone(&store)));
    let cooldown = Arc::new(CooldownEngine::new(Arc::clone(&store), cooldown_path));
    cooldown
        .ensure_state_file()
        .context("initialising cooldown state file")?;

    let prometheus = vigil_server::metrics::install_recorder();

    let manager = Arc::new(SessionManager::new(
        Arc::clone(&store),
        settings.clone(),
        Arc::clone(&memory),
        Arc::clone(&cooldown),
        Arc::clone(&hub),
    ));
    manager
        .recover_stale_sessions()
        .context("recovering stale sessions")?;

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        let _ = tokio::spawn(async move {
            let ctrl_c = tokio::signal::ctrl_c();
            let mut sigterm =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                    .expect("installing SIGTERM handler");
            tokio::select! {
                _ = ctrl_c => info!("SIGINT received"),
                _ = sigterm.recv() => info!("SIGTERM received"),
            }
            shutdown.cancel();
        });
    }

    {
        let manager = Arc::clone(&manager);
        let shutdown = shutdown.clone();
        let _ = tokio::spawn(async move {
            manager.run_scheduler(shutdown).await;
        });
    }

    let state = AppState {
        store,
        settings,
        hub,
        cooldown,
        memory,
        control: manager as Arc<dyn SessionControl>,
        prometheus: Some(prometheus),
    };

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("binding dashboard port {port}"))?;
    info!(port, "vigil listening");

    let server_shutdown = shutdown.clone();
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { server_shutdown.cancelled().await })
        .await
        .context("serving http")?;

    info!("shutdown complete");
    Ok(())
}
