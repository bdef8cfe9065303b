//! Market snapshot endpoint

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use folio_core::MarketSnapshot;
use serde::Serialize;

use super::ErrorResponse;
use crate::AppState;

/// Latest broadcast snapshot
#[derive(Debug, Serialize)]
struct SnapshotResponse {
    data: MarketSnapshot,
    timestamp: DateTime<Utc>,
}

/// Return the snapshot from the most recent successful tick
async fn latest_snapshot(State(state): State<AppState>) -> Response {
    match state.broadcaster.latest() {
        Some(latest) => (
            StatusCode::OK,
            Json(SnapshotResponse {
                data: (*latest.data).clone(),
                timestamp: latest.timestamp,
            }),
        )
            .into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: "No market snapshot yet".to_string(),
            }),
        )
            .into_response(),
    }
}

/// Create market routes
pub fn routes() -> Router<AppState> {
    Router::new().route("/market/snapshot", get(latest_snapshot))
}
