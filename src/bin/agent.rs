//! Metrics agent.
//!
//! Samples runtime and host metrics every `POLL_INTERVAL` and reports them
//! to the collector every `REPORT_INTERVAL`.
//!
//! # Usage
//! ```sh
//! ADDRESS=localhost:8080 KEY=secret cargo run --bin agent
//! ```

use anyhow::{Context, Result};
use metricsync::application::bootstrap::AgentBootstrap;
use metricsync::application::system::ShutdownSignal;
use metricsync::config::AgentConfig;
use metricsync::infrastructure::sampling::CountingAllocator;
use tracing::{Level, info};
use tracing_subscriber::prelude::*;

#[global_allocator]
static GLOBAL: CountingAllocator = CountingAllocator;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    info!("metricsync agent {} starting...", env!("CARGO_PKG_VERSION"));

    let config = AgentConfig::load().context("Invalid agent configuration")?;
    info!(
        "Configuration loaded: address={}, transport={}, poll={:?}, report={:?}, signed={}",
        config.address,
        config.transport,
        config.poll_interval,
        config.report_interval,
        config.key.is_some()
    );

    let agent = AgentBootstrap::init(&config).await?;

    let shutdown = ShutdownSignal::new();
    tokio::spawn(shutdown.clone().listen_for_os_signals());

    agent
        .run(
            config.poll_interval,
            config.report_interval,
            shutdown.subscribe(),
        )
        .await;

    Ok(())
}
