//! # Lobby Server
//!
//! Ephemeral broadcast lobbies over HTTP and WebSocket.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings
//! lobby
//!
//! # Run with environment variables
//! LOBBY_PORT=8080 LOBBY_HOST=0.0.0.0 lobby
//!
//! # Override any config key
//! LOBBY__LOBBY__CLIENT_BUFFER=512 lobby
//! ```

mod api;
mod config;
mod handlers;
mod metrics;
mod session;

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "lobby_server=debug,lobby_core=debug,lobby_transport=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = config::Config::load()?;

    tracing::info!("Starting lobby server on {}:{}", config.host, config.port);

    // Initialize metrics
    metrics::init_metrics();

    // Start the server
    handlers::run_server(config).await?;

    Ok(())
}
