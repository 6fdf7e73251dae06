//! Shared state handed to every handler.

use crate::{
    handlers::static_files::StaticFiles, models::metrics::RequestMetrics,
    services::storage_service::StorageService,
};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub storage: StorageService,
    pub metrics: Arc<RequestMetrics>,
    pub static_files: StaticFiles,
}

impl AppState {
    pub fn new(storage: StorageService, static_files: StaticFiles) -> Self {
        Self {
            storage,
            metrics: Arc::new(RequestMetrics::new()),
            static_files,
        }
    }
}
