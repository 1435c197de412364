use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use srv6_mesh::config::{Cli, Commands};
use srv6_mesh::manager::allocator::SidManager;
use srv6_mesh::manager::signaler::Signaler;
use srv6_mesh::{Result, agent};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[tokio::main]
async fn main() -> ExitCode {
    setup_logging();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Agent(args) => run_agent(args).await,
        Commands::Crds => srv6_mesh_crds::crd_gen_all().map_err(Into::into),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(%e, "exiting with error");
            ExitCode::FAILURE
        }
    }
}

async fn run_agent(args: srv6_mesh::config::AgentArgs) -> Result<()> {
    let cancel = CancellationToken::new();
    let signals = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signals.cancel();
    });

    // The SID manager is provided by an external control-plane component
    // that resolves this channel; a standalone agent runs without one.
    let (sid_manager_tx, sid_manager_rx) = oneshot::channel::<Arc<dyn SidManager>>();
    drop(sid_manager_tx);

    let signaler = Arc::new(Signaler::new());

    agent::start(args, sid_manager_rx, signaler, cancel).await
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(e) => {
                error!(%e, "failed to install SIGTERM handler");
                let _ = ctrl_c.await;
                return;
            }
        };
        tokio::select! {
            _ = ctrl_c => {}
            _ = sigterm.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
    }
}

fn setup_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "srv6_mesh=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
