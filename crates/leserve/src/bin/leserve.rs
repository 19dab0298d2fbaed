//! leserve binary entry point

use anyhow::Context;
use clap::Parser;
use leserve::{init_logging, LeServeServer, ServerConfig};
use std::path::PathBuf;
use tracing::info;

/// LeAvatar pipeline orchestration server
#[derive(Parser, Debug)]
#[command(name = "leserve")]
#[command(about = "HTTP trigger endpoint for the LeAvatar interaction pipeline", long_about = None)]
#[command(version)]
struct Cli {
    /// TOML configuration file; environment variables override its values
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => ServerConfig::load(path)
            .with_context(|| format!("Failed to load configuration from {:?}", path))?,
        None => ServerConfig::default(),
    };
    config.apply_env();
    if cli.verbose {
        config.log_level = "debug".to_string();
    }

    init_logging(&config.log_level).context("Failed to install log subscriber")?;

    info!(
        host = %config.host,
        port = config.port,
        db_path = %config.db_path,
        poll_interval_secs = config.polling.interval_secs,
        poll_timeout_secs = config.polling.timeout_secs,
        "Starting leserve"
    );

    let server = LeServeServer::new(config).context("Failed to initialize server")?;
    server.start().await.context("Server terminated with an error")?;

    info!("Server stopped");
    Ok(())
}
