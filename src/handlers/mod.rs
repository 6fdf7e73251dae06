//! HTTP handlers.

pub mod health_handlers;
pub mod metrics_handlers;
pub mod static_files;
pub mod upload_handlers;
