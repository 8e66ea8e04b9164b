use anyhow::{anyhow, Result};
use bridge_traits::time::LogLevel;
use clap::Parser;
use core_runtime::config::AgentConfig;
use core_runtime::logging::{init_logging, LogFormat, LoggingConfig};
use std::path::PathBuf;
use tracing::info;

mod agent;

use agent::Agent;

#[derive(Parser, Debug)]
#[command(
    name = "sync-agent",
    version,
    about = "Keep a local folder in sync with a remote metadata service and object store"
)]
struct Cli {
    /// Folder to watch; must contain `.ignore/config.yaml`
    folder: PathBuf,

    /// Override the configured log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<LogLevel>,

    /// Override the configured log format (pretty, json, compact)
    #[arg(long)]
    log_format: Option<LogFormat>,

    /// Log file names instead of relative paths
    #[arg(long)]
    redact_paths: bool,

    /// Compute the startup diff, print it, and exit without syncing
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = AgentConfig::load(&cli.folder)?;

    let logging = LoggingConfig::default()
        .with_level(cli.log_level.unwrap_or(config.logging.level))
        .with_format(cli.log_format.unwrap_or(config.logging.format))
        .with_pii_redaction(cli.redact_paths);
    init_logging(logging).map_err(|e| anyhow!("failed to initialise logging: {e}"))?;

    if cli.dry_run {
        let diff = Agent::plan(&config).await?;
        for event in &diff.events {
            println!("{event}");
        }
        println!("{} record repairs", diff.repairs.len());
        return Ok(());
    }

    let agent = Agent::start(config).await?;
    info!("Sync agent running, press Ctrl+C to stop");

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");
    agent.shutdown().await?;
    Ok(())
}
