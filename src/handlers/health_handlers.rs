//! Health handler.
//!
//! - /health -> object store reachability as `{"status": ...}`

use crate::state::AppState;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use tracing::debug;

/// `/health`
///
/// Checks that the configured bucket exists. The HTTP status is always 200;
/// a failed check only changes the payload to `critical: <detail>`.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let status = match state.storage.health_check().await {
        Ok(()) => "ok".to_string(),
        Err(err) => {
            debug!("health check failed: {}", err);
            format!("critical: {}", err)
        }
    };

    (StatusCode::OK, Json(HealthResponse { status }))
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
}
