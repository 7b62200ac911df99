//! # Sync Web API
//!
//! Axum server for the change feed:
//!
//! - `GET /sync/all` pages through every change after a sequence
//! - `POST /sync/schools` pages per school, optionally filtered to terms
//! - `GET /health` reports database reachability
//!
//! Bodies are gzip-compressed for clients that accept it.

pub mod errors;
pub mod handlers;
pub mod routes;
pub mod state;

pub use errors::{ApiError, ApiResult};
pub use state::AppState;

use axum::Router;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::compression::CompressionLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Build the router with its middleware stack
pub fn create_app(state: AppState) -> Router {
    Router::new()
        .merge(routes::sync_routes())
        .merge(routes::health_routes())
        .layer(CompressionLayer::new().gzip(true))
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until `shutdown` is cancelled.
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    info!(address = ?listener.local_addr().ok(), "Sync API listening");
    axum::serve(listener, create_app(state))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
}
