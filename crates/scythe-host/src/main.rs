use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use scythe_host::{telemetry, Dispatcher, FilePoller, SocketLink};
use scytheconf::ScytheConfig;
use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;
use tokio::sync::broadcast;
use tokio::task::LocalSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Transport {
    Socket,
    File,
    Both,
}

/// Scythe host - runs bridge commands against the session
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Config file (replaces ./scythe.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Which transports to serve
    #[arg(short, long, value_enum, default_value_t = Transport::Both)]
    transport: Transport,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let (config, sources) = ScytheConfig::load_with_sources_from(cli.config.as_deref())
        .context("Failed to load configuration")?;

    telemetry::init(&config.telemetry.log_level).context("Failed to initialize tracing")?;
    for file in &sources.files {
        tracing::debug!(file = %file.display(), "config file loaded");
    }
    for var in &sources.env_overrides {
        tracing::debug!(%var, "config overridden from environment");
    }

    // One thread: handlers never overlap, just like inside the host
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build runtime")?;
    let local = LocalSet::new();
    local.block_on(&runtime, run(config, cli.transport))
}

async fn run(config: ScytheConfig, transport: Transport) -> Result<()> {
    let dispatcher = Rc::new(RefCell::new(Dispatcher::with_builtin_commands()));
    tracing::info!(
        commands = dispatcher.borrow().registry().len(),
        ?transport,
        "scythe host starting"
    );

    let (shutdown_tx, _) = broadcast::channel(1);
    let mut tasks = Vec::new();

    if matches!(transport, Transport::Socket | Transport::Both) {
        tracing::info!(address = %config.socket.address(), "socket transport enabled");
        let link = SocketLink::new(&config.socket);
        tasks.push(tokio::task::spawn_local(
            link.run(dispatcher.clone(), shutdown_tx.subscribe()),
        ));
    }

    if matches!(transport, Transport::File | Transport::Both) {
        tracing::info!(dir = %config.polling.dir.display(), "file transport enabled");
        let poller = FilePoller::new(&config.polling);
        tasks.push(tokio::task::spawn_local(
            poller.run(dispatcher.clone(), shutdown_tx.subscribe()),
        ));
    }

    wait_for_signal().await;
    let _ = shutdown_tx.send(());

    for task in tasks {
        if let Err(e) = task.await {
            tracing::error!(error = %e, "transport task failed");
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

async fn wait_for_signal() {
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received SIGINT, shutting down...");
        }
        _ = sigterm() => {
            tracing::info!("Received SIGTERM, shutting down...");
        }
    }
}

#[cfg(unix)]
async fn sigterm() {
    use tokio::signal::unix::{signal, SignalKind};
    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            tracing::warn!(error = %e, "SIGTERM handler unavailable");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn sigterm() {
    std::future::pending::<()>().await;
}
