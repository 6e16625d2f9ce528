//! Skirmish Game Server
//!
//! Accepts WebSocket players on the configured port and relays their
//! state to everyone else in the session.

use std::future::Future;
use std::io;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use skirmish::{GameServer, ServerConfig, VERSION};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ServerConfig::from_env().context("invalid server configuration")?;

    info!("Skirmish Server v{}", VERSION);
    info!("Bind address: {}", config.bind_addr);
    info!("Worker pool: {} ({:?} on overflow)", config.max_connections, config.overflow);
    info!("Spawn points: {}", config.spawn_points.len());

    let server = GameServer::new(config);
    let run = server.run();
    tokio::pin!(run);

    tokio::select! {
        result = &mut run => {
            result.context("server stopped")?;
        }
        _ = shutdown_requested(tokio::signal::ctrl_c()) => {
            info!("Shutting down");
            server.shutdown();
            run.await.context("server stopped")?;
        }
    }

    Ok(())
}

/// Resolve when `signal` fires. If the listener itself fails, never resolve,
/// so the server keeps running.
async fn shutdown_requested<F>(signal: F)
where
    F: Future<Output = io::Result<()>>,
{
    if let Err(e) = signal.await {
        warn!("Failed to listen for ctrl-c, shutdown signal disabled: {}", e);
        std::future::pending::<()>().await;
    }
}
