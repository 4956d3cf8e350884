//! Collector HTTP API.
//!
//! Layers, outermost first: trusted-subnet filter, request tracing, response
//! compression. `/update` and `/updates` additionally decode gzip and RSA
//! bodies before the handler runs.

pub mod error;
pub mod handlers;
pub mod middleware;

use crate::application::collector::MetricService;
use crate::application::system::wait_for_shutdown;
use crate::infrastructure::security::{Envelope, TrustedSubnet};
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::compression::CompressionLayer;
use tower_http::trace::{DefaultMakeSpan, TraceLayer};
use tracing::info;

pub use error::ErrorBody;

#[derive(Clone)]
pub struct AppState {
    pub service: MetricService,
    pub envelope: Envelope,
    pub trusted_subnet: Option<TrustedSubnet>,
}

pub fn create_router(state: AppState) -> Router {
    let trusted_subnet = state.trusted_subnet;
    let state = Arc::new(state);

    let encoded = Router::new()
        .route("/update", post(handlers::update_json))
        .route("/updates", post(handlers::batch_update_json))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::decode_body,
        ));

    Router::new()
        .route("/", get(handlers::list_metrics))
        .route("/ping", get(handlers::ping))
        .route("/value", post(handlers::get_value_json))
        .route("/value/{kind}/{id}", get(handlers::get_value))
        .route("/update/{kind}/{id}/{value}", post(handlers::update_from_path))
        .merge(encoded)
        .layer(DefaultBodyLimit::max(middleware::MAX_BODY_BYTES))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http().make_span_with(DefaultMakeSpan::default().include_headers(true)))
        .layer(axum::middleware::from_fn_with_state(
            trusted_subnet,
            middleware::trusted_subnet,
        ))
        .with_state(state)
}

/// Serve until `shutdown` fires, letting in-flight requests finish.
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    mut shutdown: watch::Receiver<bool>,
) -> std::io::Result<()> {
    let addr = listener.local_addr()?;
    info!("HTTP server listening on {}", addr);
    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(async move { wait_for_shutdown(&mut shutdown).await })
        .await?;
    info!("HTTP server stopped");
    Ok(())
}
