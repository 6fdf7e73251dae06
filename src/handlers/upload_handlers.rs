//! Upload handler mounted on every path not claimed by another route.
//!
//! GET falls through to the static responder. POST and PUT stream the request
//! body into the store under a fresh UUID and answer with the object's public
//! URL. Anything else is rejected with 405.

use crate::{errors::AppError, models::metrics::RequestMetrics, state::AppState};
use axum::{
    body::Body,
    extract::{Request, State},
    http::{HeaderMap, HeaderValue, Method, header},
    response::Response,
};
use bytes::Bytes;
use futures::{StreamExt, stream};
use std::{convert::Infallible, io, sync::Arc};
use tracing::{debug, error, warn};
use url::Url;
use uuid::Uuid;

/// Value of the `Allow` header on 405 responses.
pub const ALLOWED_METHODS: &str = "GET, POST, PUT";

pub async fn handle_upload(
    State(state): State<AppState>,
    request: Request,
) -> Result<Response, AppError> {
    if request.method() == Method::GET {
        return Ok(state.static_files.respond(request).await);
    }
    state.metrics.inc_total();

    if request.method() != Method::POST && request.method() != Method::PUT {
        state.metrics.inc_invalid();
        debug!("rejecting {} {}", request.method(), request.uri());
        return Err(AppError::method_not_allowed(ALLOWED_METHODS));
    }

    let content_type = content_type(request.headers());
    let name = Uuid::new_v4().to_string();

    let body = request
        .into_body()
        .into_data_stream()
        .map(|chunk| chunk.map_err(|err| io::Error::new(io::ErrorKind::Other, err)))
        .boxed();

    match state.storage.put(&name, content_type.as_deref(), body).await {
        Ok(url) => {
            debug!("stored object {} at {}", name, url);
            Ok(url_response(url, Arc::clone(&state.metrics)))
        }
        Err(err) => {
            state.metrics.inc_failed();
            error!("could not store object {}: {}", name, err);
            Err(AppError::internal())
        }
    }
}

/// The request's `Content-Type`, with invalid UTF-8 replaced rather than
/// dropping the header.
fn content_type(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::CONTENT_TYPE)?;
    match value.to_str() {
        Ok(value) => Some(value.to_string()),
        Err(_) => {
            let lossy = String::from_utf8_lossy(value.as_bytes()).into_owned();
            debug!("content type is not valid UTF-8, forwarding {:?}", lossy);
            Some(lossy)
        }
    }
}

/// Counts the upload as a success once the body has been handed off to the
/// transport, or as a failure if the body is dropped first.
struct DeliveryGuard {
    metrics: Arc<RequestMetrics>,
    delivered: bool,
}

impl Drop for DeliveryGuard {
    fn drop(&mut self) {
        if self.delivered {
            self.metrics.inc_success();
        } else {
            self.metrics.inc_failed();
            warn!("could not respond with object url: response body was dropped");
        }
    }
}

/// `200` with the URL as a single newline-terminated line.
fn url_response(url: Url, metrics: Arc<RequestMetrics>) -> Response {
    let line = Bytes::from(format!("{}\n", url));
    let guard = DeliveryGuard {
        metrics,
        delivered: false,
    };

    let body = stream::unfold((Some(line), Some(guard)), |(line, guard)| async move {
        match line {
            Some(line) => Some((Ok::<_, Infallible>(line), (None, guard))),
            None => {
                if let Some(mut guard) = guard {
                    guard.delivered = true;
                }
                None
            }
        }
    });

    let mut response = Response::new(Body::from_stream(body));
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}
