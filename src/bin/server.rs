//! Metrics collector server.
//!
//! Serves the HTTP API or the binary RPC protocol, selected with
//! `SERVER_TYPE` / `--server-type`.
//!
//! # Usage
//! ```sh
//! ADDRESS=0.0.0.0:8080 STORE_INTERVAL=10s cargo run --bin server
//! ```

use anyhow::{Context, Result};
use metricsync::application::bootstrap::CollectorBootstrap;
use metricsync::application::system::ShutdownSignal;
use metricsync::config::ServerConfig;
use metricsync::infrastructure::transport::TransportKind;
use metricsync::interfaces::RpcServer;
use metricsync::interfaces::http::{self, AppState};
use tokio::net::TcpListener;
use tracing::{Level, info, warn};
use tracing_subscriber::prelude::*;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    info!("metricsync server {} starting...", env!("CARGO_PKG_VERSION"));

    let config = ServerConfig::load().context("Invalid server configuration")?;
    info!(
        "Configuration loaded: address={}, transport={}, store_interval={:?}, store_file={:?}, restore={}, database={}",
        config.address,
        config.transport,
        config.store_interval,
        config.store_file,
        config.restore,
        config.database_dsn.is_some()
    );

    let collector = CollectorBootstrap::init(&config).await?;

    let shutdown = ShutdownSignal::new();
    tokio::spawn(shutdown.clone().listen_for_os_signals());
    let checkpoints = collector.spawn_checkpoints(shutdown.subscribe());

    let listener = TcpListener::bind(&config.address)
        .await
        .with_context(|| format!("Failed to bind {}", config.address))?;

    match config.transport {
        TransportKind::Http => {
            let state = AppState {
                service: collector.service.clone(),
                envelope: collector.envelope.clone(),
                trusted_subnet: config.trusted_subnet,
            };
            http::serve(listener, state, shutdown.subscribe())
                .await
                .context("HTTP server failed")?;
        }
        TransportKind::Rpc => {
            RpcServer::new(collector.service.clone(), config.trusted_subnet)
                .serve(listener, shutdown.subscribe())
                .await
                .context("RPC server failed")?;
        }
    }

    // The server can also stop on its own; make sure checkpoints see it.
    shutdown.trigger();
    if let Some(checkpoints) = checkpoints
        && let Err(e) = checkpoints.await
    {
        warn!("Checkpoint task ended abnormally: {}", e);
    }
    collector.storage.close().await;

    info!("Server stopped");
    Ok(())
}
