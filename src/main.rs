//! broadside - Battleship server
//!
//! Accepts TCP connections, seats two players per match and lets everyone
//! else watch from the queue.

use broadside_server::{Config, Server, ServerConfig};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration (from file if BROADSIDE_CONFIG is set, then env overrides)
    let config = match Config::load() {
        Ok(c) => {
            if let Ok(path) = std::env::var("BROADSIDE_CONFIG") {
                tracing::info!("Loaded config from {}", path);
            }
            c
        }
        Err(e) => {
            tracing::error!("Failed to load config: {}", e);
            return Err(e.into());
        }
    };

    tracing::info!("Starting broadside server");
    tracing::info!("  Bind address: {}", config.network.bind_addr);
    tracing::info!("  Max connections: {}", config.network.max_connections);
    tracing::info!(
        "  Timeouts: turn {}s, placement {}s, reconnect grace {}s",
        config.game.turn_timeout_secs,
        config.game.placement_timeout_secs,
        config.game.reconnect_grace_secs
    );
    tracing::info!(
        "  Rate limit: {}/s, checksum: {:?}",
        config.limits.rate_limit_per_sec,
        config.protocol.checksum
    );
    tracing::info!("  Promotion policy: {:?}", config.game.promotion_policy);

    let server = Arc::new(Server::new(ServerConfig::from_config(&config)));

    let shutdown_server = server.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("Received shutdown signal, stopping server...");
        shutdown_server.shutdown();
    });

    // Blocks until shutdown; failing to bind is the only fatal error.
    server.run().await?;

    tracing::info!("Server stopped");
    Ok(())
}
