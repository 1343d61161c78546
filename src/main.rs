use anyhow::{Context, Result};
use clap::Parser;
use starter_api::config::{self, Config};
use starter_api::server::Server;
use starter_api::telemetry;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "starter-api", version, about)]
struct Cli {
    /// Load environment variables from this file instead of searching for .env
    #[arg(long)]
    env_file: Option<PathBuf>,

    /// Validate configuration and exit
    #[arg(long)]
    check_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load environment variables from .env file
    let env_file = config::load_env_file(cli.env_file.as_deref())?;

    // Load configuration from environment
    let config = Config::from_env().context("Failed to load configuration")?;
    config
        .validate_all()
        .context("Invalid configuration")?;

    if cli.check_config {
        println!("Configuration is valid");
        return Ok(());
    }

    telemetry::init_tracing(&config.logging())?;

    if let Some(path) = env_file {
        tracing::info!("Loaded environment from {}", path.display());
    }
    tracing::info!(
        environment = %config.environment,
        version = env!("CARGO_PKG_VERSION"),
        "Starting starter-api service"
    );
    tracing::info!(
        "Configuration: bind_address={}, rate_limit_enabled={}, requests_per_minute={}",
        config.bind_address(),
        config.rate_limit_enabled,
        config.rate_limit_requests_per_minute
    );

    let server = Server::new(config).context("Failed to create server")?;
    server.run().await.context("Server error")?;

    tracing::info!("Server stopped");
    Ok(())
}
