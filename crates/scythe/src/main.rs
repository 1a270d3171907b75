//! scythe - send commands to a running Scythe host
//!
//! Subcommands:
//! - `scythe info` - Show tempo, tracks and transport state
//! - `scythe call <command> [params]` - Send one command with JSON params
//! - `scythe lua <code>` - Run Lua code inside the host
//! - `scythe config` - Print the effective configuration

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use scytheconf::ScytheConfig;
use std::path::PathBuf;
use std::time::Duration;

mod commands;

use commands::Transport;

#[derive(Parser)]
#[command(name = "scythe")]
#[command(about = "Send commands to a Scythe host")]
#[command(version)]
struct Cli {
    /// Config file (replaces ./scythe.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// How to reach the host
    #[arg(short, long, value_enum, default_value_t = Transport::Socket, global = true)]
    transport: Transport,

    /// How long to wait for the host to connect, in milliseconds
    #[arg(long, default_value = "10000", global = true)]
    connect_wait: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show tempo, tracks and transport state
    Info,

    /// Send one command with JSON params
    Call {
        /// Registered command name (e.g. set_tempo)
        command: String,

        /// JSON object of params
        #[arg(default_value = "{}")]
        params: String,
    },

    /// Run Lua code inside the host
    Lua {
        /// Lua source
        code: String,
    },

    /// Print the effective configuration as TOML
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config =
        ScytheConfig::load_from(cli.config.as_deref()).context("Failed to load configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_new(&config.telemetry.log_level)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Commands::Config = cli.command {
        print!("{}", config.to_toml());
        return Ok(());
    }

    let client = commands::connect(
        &config,
        cli.transport,
        Duration::from_millis(cli.connect_wait),
    )
    .await?;

    match cli.command {
        Commands::Info => commands::info(&client).await?,
        Commands::Call { command, params } => commands::call(&client, &command, &params).await?,
        Commands::Lua { code } => commands::lua(&client, &code).await?,
        Commands::Config => {}
    }

    Ok(())
}
