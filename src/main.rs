use anyhow::{Context, Result};
use axum::Router;
use std::path::Path;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

mod config;
mod errors;
mod handlers;
mod models;
mod routes;
mod services;
mod state;

use config::{AppConfig, ListenAddr};
use handlers::static_files::StaticFiles;
use services::storage_service::StorageService;
use state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // --- Parse config ---
    let cfg = AppConfig::from_env_and_args()?;
    tracing::info!("Starting upload-gateway with config: {:?}", cfg);

    // --- Initialize core service ---
    // The store connection itself is opened lazily by the first request.
    let storage = StorageService::new(cfg.store.clone());
    let static_files = StaticFiles::new(cfg.root_dir.as_deref());
    match &cfg.root_dir {
        Some(root) => tracing::info!("Serving GET requests from {}", root.display()),
        None => tracing::info!("Serving embedded index page for GET requests"),
    }

    // --- Build router ---
    let app: Router = routes::routes::routes()
        .layer(TraceLayer::new_for_http())
        .with_state(AppState::new(storage, static_files));

    // --- Start server ---
    match &cfg.listen {
        ListenAddr::Tcp(addr) => {
            let listener = TcpListener::bind(addr)
                .await
                .with_context(|| format!("binding {}", addr))?;
            tracing::info!("Server listening on http://{}", listener.local_addr()?);
            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await?;
        }
        ListenAddr::Unix(path) => serve_unix(path, app).await?,
    }

    tracing::info!("Server stopped");
    Ok(())
}

#[cfg(unix)]
async fn serve_unix(path: &Path, app: Router) -> Result<()> {
    use std::{io::ErrorKind, os::unix::fs::FileTypeExt};
    use tokio::net::UnixListener;

    // A socket left behind by a previous run would make bind fail.
    match std::fs::symlink_metadata(path) {
        Ok(meta) if meta.file_type().is_socket() => {
            std::fs::remove_file(path)
                .with_context(|| format!("removing stale socket {}", path.display()))?;
            tracing::debug!("Removed stale socket {}", path.display());
        }
        Ok(_) => anyhow::bail!("{} exists and is not a socket", path.display()),
        Err(err) if err.kind() == ErrorKind::NotFound => {}
        Err(err) => {
            return Err(err).with_context(|| format!("inspecting {}", path.display()));
        }
    }

    let listener =
        UnixListener::bind(path).with_context(|| format!("binding {}", path.display()))?;
    tracing::info!("Server listening on unix:{}", path.display());
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

#[cfg(not(unix))]
async fn serve_unix(path: &Path, _app: Router) -> Result<()> {
    anyhow::bail!(
        "unix socket {} requested but not supported on this platform",
        path.display()
    )
}

/// Wait for SIGTERM or SIGINT, then let in-flight requests finish.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl+C: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!("failed to listen for SIGTERM: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received SIGINT, draining connections"),
        _ = terminate => tracing::info!("Received SIGTERM, draining connections"),
    }
}
