//! Health check endpoints

use axum::{extract::State, http::StatusCode, response::Json, routing::get, Router};
use folio_services::{BroadcasterStats, RegistryStats};
use serde::Serialize;

use crate::AppState;

/// Health check response
#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    connections: RegistryStats,
    broadcaster: BroadcasterStats,
}

/// Health check handler
async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let broadcaster = state.broadcaster.stats();

    let (code, status) = if broadcaster.healthy {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };

    let response = HealthResponse {
        status,
        connections: state.registry().stats(),
        broadcaster,
    };

    (code, Json(response))
}

/// Simple liveness check (always returns OK if server is running)
async fn liveness() -> &'static str {
    "OK"
}

/// Create health routes
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/health/live", get(liveness))
}
