//! # Web API Routes

use axum::routing::{get, post};
use axum::Router;

use crate::web::handlers;
use crate::web::state::AppState;

pub fn sync_routes() -> Router<AppState> {
    Router::new()
        .route("/sync/all", get(handlers::sync::sync_all))
        .route("/sync/schools", post(handlers::sync::sync_schools))
}

pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(handlers::health::health))
}
