mod cli;

use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use overlay_core::identity::{NodeId, NodeKind};
use overlay_core::logfile::EventLog;
use overlay_core::peer::BootstrapError;
use overlay_core::{config_file, logging};

use cli::Cli;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.log_format);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let code = match e.downcast_ref::<BootstrapError>() {
                Some(BootstrapError::Rejected) => 2,
                _ => 1,
            };
            tracing::error!(error = ?e, "peer exited with a fatal error");
            ExitCode::from(code)
        }
    }
}

/// Startup sequence:
/// 1. Read the seed list from the configuration file.
/// 2. Open the event log.
/// 3. Install the shutdown signal watcher.
/// 4. Hand off to `overlay_core::peer::run`, which registers with the
///    seeds, builds the initial overlay, and serves until shutdown.
async fn run(cli: Cli) -> anyhow::Result<()> {
    let self_id = NodeId::new(cli.host.clone(), cli.port);

    let all_seeds = config_file::read_seed_list(&cli.config)
        .with_context(|| format!("reading seed list from {}", cli.config.display()))?;

    let event_log = EventLog::open(&cli.log_dir, NodeKind::Peer, cli.port)
        .with_context(|| format!("opening event log under {}", cli.log_dir.display()))?;

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    let status_notify = std::sync::Arc::new(tokio::sync::Notify::new());
    tokio::spawn(status_signal(status_notify.clone()));

    tracing::info!(%self_id, seeds = all_seeds.len(), "starting peer node");

    overlay_core::peer::run(self_id, all_seeds, event_log, shutdown_rx, status_notify)
        .await
        .map_err(anyhow::Error::from)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    tracing::info!("shutdown signal received");
}

/// Forces an out-of-cycle status snapshot on `SIGUSR1`. A no-op on
/// non-Unix targets, where the snapshot falls back to the periodic timer.
async fn status_signal(notify: std::sync::Arc<tokio::sync::Notify>) {
    #[cfg(unix)]
    {
        let mut usr1 = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::user_defined1())
            .expect("failed to install SIGUSR1 handler");
        loop {
            usr1.recv().await;
            notify.notify_one();
        }
    }

    #[cfg(not(unix))]
    {
        let _ = notify;
        std::future::pending::<()>().await
    }
}
