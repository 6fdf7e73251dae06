//! GET responder: a directory on disk, or the embedded index page.

use axum::{
    extract::Request,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use std::path::Path;
use tower::ServiceExt;
use tower_http::services::ServeDir;

const INDEX_HTML: &str = include_str!("../../assets/index.html");

#[derive(Clone, Debug)]
pub enum StaticFiles {
    /// Serve files (and directory indexes) below a root directory.
    Dir(ServeDir),
    /// Serve only the built-in upload page at `/`.
    Index,
}

impl StaticFiles {
    pub fn new(root: Option<&Path>) -> Self {
        match root {
            Some(root) => StaticFiles::Dir(ServeDir::new(root)),
            None => StaticFiles::Index,
        }
    }

    pub async fn respond(&self, request: Request) -> Response {
        match self {
            StaticFiles::Dir(dir) => match dir.clone().oneshot(request).await {
                Ok(response) => response.into_response(),
                Err(never) => match never {},
            },
            StaticFiles::Index => match request.uri().path() {
                "/" | "/index.html" => Html(INDEX_HTML).into_response(),
                _ => (StatusCode::NOT_FOUND, "404 page not found\n").into_response(),
            },
        }
    }
}
