//! API route definitions

mod health;
mod market;
mod notifications;
pub mod ws;

use axum::Router;
use serde::Serialize;

use crate::AppState;

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Create all API routes
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .merge(health::routes())
        .merge(market::routes())
        .merge(notifications::routes())
}

/// Create WebSocket routes (separate from API)
pub fn ws_routes() -> Router<AppState> {
    ws::routes()
}

/// Full application router, before state is attached
pub fn router() -> Router<AppState> {
    Router::new()
        .nest("/api", api_routes())
        .merge(ws_routes())
}
