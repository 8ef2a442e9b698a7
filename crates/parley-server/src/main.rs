//! # Parley Server
//!
//! Realtime chat presence and message routing server.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings
//! parley
//!
//! # Run with custom config
//! parley --config /path/to/parley.toml
//!
//! # Run with environment variables
//! PARLEY_PORT=3000 PARLEY_HOST=0.0.0.0 parley
//! ```

use anyhow::Result;
use parley_server::{config, handlers, metrics};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "parley=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = config::Config::load(std::env::args().skip(1))?;

    tracing::info!("Starting Parley server on {}:{}", config.host, config.port);

    metrics::init_metrics();

    handlers::run_server(config).await?;

    Ok(())
}
