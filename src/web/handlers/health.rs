//! # Health Check Handlers

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use tracing::warn;

use crate::database::connection::health_check;
use crate::web::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub database: bool,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub running_collections: Option<usize>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub flagged_for_review: Vec<(String, String)>,
}

/// GET /health. 503 when the database is unreachable.
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let database = match health_check(&state.pool).await {
        Ok(healthy) => healthy,
        Err(e) => {
            warn!(error = %e, "Database health check failed");
            false
        }
    };

    let (running_collections, flagged_for_review) = match &state.orchestrator {
        Some(orchestrator) => (
            Some(orchestrator.list_running_collections().len()),
            orchestrator.flagged_for_review(),
        ),
        None => (None, Vec::new()),
    };

    let status = if database {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(HealthResponse {
            status: if database { "ok" } else { "unavailable" },
            database,
            timestamp: chrono::Utc::now().to_rfc3339(),
            running_collections,
            flagged_for_review,
        }),
    )
}
