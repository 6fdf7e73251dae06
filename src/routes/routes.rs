//! Defines the HTTP surface of the gateway.
//!
//! ## Structure
//! - `/health`  — object store reachability (JSON)
//! - `/metrics` — request counters and bucket usage (JSON)
//! - everything else
//!   - `GET`        — static files or the embedded index page
//!   - `POST`/`PUT` — store the body, answer with the object URL
//!   - other        — 405 with `Allow: GET, POST, PUT`

use crate::{
    handlers::{
        health_handlers::health, metrics_handlers::metrics, upload_handlers::handle_upload,
    },
    state::AppState,
};
use axum::{Router, routing::any};

/// Build and return the router carrying `AppState` to all handlers.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", any(health))
        .route("/metrics", any(metrics))
        .fallback(handle_upload)
}
