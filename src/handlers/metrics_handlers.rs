//! `/metrics` — request counters plus bucket usage as JSON.

use crate::{models::bucket::BucketUsage, state::AppState};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use tracing::warn;

/// Store usage comes from a full bucket listing on every call. When that
/// listing fails the usage fields read zero instead of failing the request.
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let usage = match state.storage.aggregate_metrics().await {
        Ok(usage) => usage,
        Err(err) => {
            warn!("could not aggregate bucket usage: {}", err);
            BucketUsage::default()
        }
    };
    let counts = state.metrics.snapshot();

    (
        StatusCode::OK,
        Json(MetricsResponse {
            requests_total: counts.total,
            requests_invalid: counts.invalid,
            requests_failed: counts.failed,
            requests_success: counts.success,
            s3_objects: usage.objects,
            s3_usage: usage.bytes,
        }),
    )
}

#[derive(Serialize)]
struct MetricsResponse {
    requests_total: u64,
    requests_invalid: u64,
    requests_failed: u64,
    requests_success: u64,
    s3_objects: u64,
    s3_usage: u64,
}
