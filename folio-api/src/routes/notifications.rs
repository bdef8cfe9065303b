//! Notification push endpoints
//!
//! Called by the portfolio layer after a mutation to push a
//! `portfolio_update` or `alert` through the WebSocket channel.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use folio_core::{AlertVariant, UserId};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::ErrorResponse;
use crate::AppState;

/// Body for a portfolio update push
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioUpdateRequest {
    /// Target user; everyone when omitted
    pub user_id: Option<UserId>,
    pub message: String,
}

/// Body for an alert push
///
/// `variant` must be `default` or `destructive`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertRequest {
    /// Target user; everyone when omitted
    pub user_id: Option<UserId>,
    #[serde(default = "default_alert_title")]
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub variant: AlertVariant,
}

fn default_alert_title() -> String {
    "Market Alert".to_string()
}

/// Number of connections the message was queued for
#[derive(Debug, Serialize)]
pub struct NotifyResponse {
    pub delivered: usize,
}

async fn push_portfolio_update(
    State(state): State<AppState>,
    payload: Result<Json<PortfolioUpdateRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return bad_request(&rejection.body_text()),
    };
    if request.message.trim().is_empty() {
        return bad_request("message must not be empty");
    }

    let outcome = state
        .ws_state
        .notify_portfolio_update(request.user_id, request.message);
    info!(
        "Portfolio update pushed (user: {:?}, delivered: {})",
        request.user_id.map(|u| u.0),
        outcome.delivered
    );

    (
        StatusCode::OK,
        Json(NotifyResponse {
            delivered: outcome.delivered,
        }),
    )
        .into_response()
}

async fn push_alert(
    State(state): State<AppState>,
    payload: Result<Json<AlertRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return bad_request(&rejection.body_text()),
    };
    if request.message.trim().is_empty() {
        return bad_request("message must not be empty");
    }

    let outcome = state.ws_state.notify_alert(
        request.user_id,
        request.title,
        request.message,
        request.variant,
    );
    info!(
        "Alert pushed (user: {:?}, delivered: {})",
        request.user_id.map(|u| u.0),
        outcome.delivered
    );

    (
        StatusCode::OK,
        Json(NotifyResponse {
            delivered: outcome.delivered,
        }),
    )
        .into_response()
}

fn bad_request(error: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: error.to_string(),
        }),
    )
        .into_response()
}

/// Create notification routes
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/notifications/portfolio-update", post(push_portfolio_update))
        .route("/notifications/alert", post(push_alert))
}
