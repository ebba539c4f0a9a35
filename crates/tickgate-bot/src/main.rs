//! tickgate entry point.
//!
//! Streams market data, runs the bundled strategy through the risk gate and
//! tracks positions with paper execution until Ctrl-C.

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tickgate_bot::config::{CONFIG_ENV, DEFAULT_CONFIG_PATH};
use tickgate_bot::{AppConfig, ControlLoop, PaperExecutor};
use tracing::info;

/// Market stream control loop with risk-gated paper trading.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, env = CONFIG_ENV)]
    config: Option<String>,

    /// Print the effective configuration and exit
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Must run before any TLS connection is made.
    tickgate_ws::init_crypto();

    let args = Args::parse();

    tickgate_telemetry::init_logging()?;

    info!("Starting tickgate v{}", env!("CARGO_PKG_VERSION"));

    let config = match args.config {
        Some(path) => {
            info!(config_path = %path, "Loading configuration");
            AppConfig::from_file(&path)?
        }
        None => {
            info!(config_path = DEFAULT_CONFIG_PATH, "Loading configuration");
            AppConfig::load()?
        }
    };
    info!(
        subscriptions = config.subscriptions.len(),
        base_url = %config.stream.base_url,
        "Configuration loaded"
    );

    if args.dry_run {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    let engine = ControlLoop::new(config, Arc::new(PaperExecutor::new()))?;
    engine.start().await?;

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    engine.stop().await;
    print!("{}", tickgate_telemetry::Metrics::render());

    Ok(())
}
