use axum::extract::State;
use hyper::StatusCode;

use crate::app_state::AppState;

#[tracing::instrument(name = "Serving test resource", skip(app_state))]
pub async fn service_get(State(app_state): State<AppState>) -> String {
    format!("{} is up", app_state.service_name)
}

/// Echoes the request body back to the caller.
#[tracing::instrument(name = "Accepting test payload", skip(body), fields(body_length = body.len()))]
pub async fn service_post(body: String) -> String {
    tracing::info!("Received test payload");
    body
}

pub async fn service_forbidden() -> StatusCode {
    tracing::warn!("Rejecting access to the forbidden resource");
    StatusCode::FORBIDDEN
}
