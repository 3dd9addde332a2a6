//! # Chatter
//!
//! Authenticated realtime chat server.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings (the secret is mandatory)
//! JWT_SECRET=change-me chatter
//!
//! # Run with custom config
//! chatter --config /path/to/chatter.toml
//!
//! # Run with environment variables
//! CHATTER_PORT=8080 CHATTER_HOST=0.0.0.0 CHATTER_AUTH__JWT_SECRET=change-me chatter
//! ```

use anyhow::{bail, Result};
use chatter_server::{config::Config, handlers, metrics};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chatter=debug,chatter_server=debug,chatter_core=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = match config_path()? {
        Some(path) => Config::from_file(path)?,
        None => Config::load()?,
    };

    tracing::info!("Starting Chatter server on {}:{}", config.host, config.port);

    // Initialize metrics
    metrics::init_metrics();

    handlers::run_server(config).await?;

    Ok(())
}

/// Read `--config <path>` from the command line.
fn config_path() -> Result<Option<String>> {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" | "-c" => match args.next() {
                Some(path) => return Ok(Some(path)),
                None => bail!("--config requires a path"),
            },
            other => bail!("Unknown argument: {}", other),
        }
    }
    Ok(None)
}
