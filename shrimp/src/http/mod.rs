//! HTTP adapter: routes, request validation, and response rendering.
//!
//! The adapter owns everything that can be decided without the core:
//! path hygiene, format detection, parameter validation, and direct file
//! serving. Only well-formed transform admissions and token-bearing purge
//! requests ever reach the manager. Replies travel back over per-request
//! oneshot channels; a client that disconnected simply drops its
//! receiving half.

mod responses;

pub use responses::ImageSource;

use crate::manager::{ImageReply, ManagerMessage, PurgeReply};
use crate::transform::{ImageFormat, ResizeParams};
use axum::extract::{Path, Query, State};
use axum::response::Response;
use axum::routing::{delete, get};
use axum::Router;
use bytes::Bytes;
use http::{StatusCode, Uri};
use responses::{ImageResponseParts, ImageTiming};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::SystemTime;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

/// Shared state for the HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    manager: mpsc::UnboundedSender<ManagerMessage>,
    root_dir: PathBuf,
}

impl AppState {
    pub fn new(manager: mpsc::UnboundedSender<ManagerMessage>, root_dir: PathBuf) -> Self {
        Self { manager, root_dir }
    }
}

/// Build the service router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/cache", delete(delete_cache))
        .route("/*path", get(get_image))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct ResizeQuery {
    op: Option<String>,
    width: Option<String>,
    height: Option<String>,
    max: Option<String>,
    #[serde(rename = "target-format")]
    target_format: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PurgeQuery {
    token: Option<String>,
}

async fn get_image(
    State(state): State<AppState>,
    Path(path): Path<String>,
    uri: Uri,
    Query(query): Query<ResizeQuery>,
) -> Response {
    let request_path = format!("/{path}");

    if has_illegal_path_components(&request_path) {
        debug!(path = %request_path, "rejecting illegal path");
        return responses::status_response(StatusCode::BAD_REQUEST);
    }

    let Some(extension) = file_extension(&request_path) else {
        return responses::status_response(StatusCode::BAD_REQUEST);
    };
    let format_name = query.target_format.as_deref().unwrap_or(extension);
    let Some(format) = ImageFormat::from_extension(format_name) else {
        return responses::status_response(StatusCode::BAD_REQUEST);
    };

    let has_query = uri.query().map(|q| !q.is_empty()).unwrap_or(false);
    if !has_query {
        return serve_original_file(&state.root_dir, &request_path, format).await;
    }

    if let Some(op) = query.op.as_deref() {
        // Resizing is the only supported operation.
        if op != "resize" {
            return responses::status_response(StatusCode::BAD_REQUEST);
        }
    } else if query.target_format.is_none() {
        return responses::status_response(StatusCode::BAD_REQUEST);
    }

    let Some(params) = resize_params_from_query(&query) else {
        return responses::status_response(StatusCode::BAD_REQUEST);
    };

    let (responder, reply) = oneshot::channel();
    let message = ManagerMessage::ResizeRequest {
        responder,
        path: request_path,
        format,
        params,
    };
    if state.manager.send(message).is_err() {
        return responses::closing_response(StatusCode::SERVICE_UNAVAILABLE);
    }

    match reply.await {
        Ok(reply) => render_image_reply(reply),
        Err(_) => responses::closing_response(StatusCode::SERVICE_UNAVAILABLE),
    }
}

async fn delete_cache(
    State(state): State<AppState>,
    Query(query): Query<PurgeQuery>,
) -> Response {
    let Some(token) = query.token else {
        return responses::text_response(StatusCode::FORBIDDEN, "No token provided\r\n");
    };

    let (responder, reply) = oneshot::channel();
    let message = ManagerMessage::DeleteCacheRequest { responder, token };
    if state.manager.send(message).is_err() {
        return responses::closing_response(StatusCode::SERVICE_UNAVAILABLE);
    }

    match reply.await {
        Ok(PurgeReply::Deleted) => responses::text_response(StatusCode::OK, "Cache deleted\r\n"),
        Ok(PurgeReply::Forbidden(text)) => responses::text_response(StatusCode::FORBIDDEN, &text),
        Err(_) => responses::closing_response(StatusCode::SERVICE_UNAVAILABLE),
    }
}

fn render_image_reply(reply: ImageReply) -> Response {
    match reply {
        ImageReply::Image {
            blob,
            format,
            source,
            timing,
        } => responses::image_response(ImageResponseParts {
            format,
            source,
            last_modified: blob.created_at(),
            timing: timing.map_or(ImageTiming::Zero, ImageTiming::Measured),
            body: blob.data().clone(),
        }),
        ImageReply::NotFound => responses::status_response(StatusCode::NOT_FOUND),
        ImageReply::Overloaded => responses::closing_response(StatusCode::SERVICE_UNAVAILABLE),
        ImageReply::TimedOut => responses::closing_response(StatusCode::GATEWAY_TIMEOUT),
    }
}

/// Serve the source file exactly as stored on disk.
async fn serve_original_file(
    root_dir: &std::path::Path,
    request_path: &str,
    format: ImageFormat,
) -> Response {
    let full_path = root_dir.join(request_path.trim_start_matches('/'));

    let metadata = match tokio::fs::metadata(&full_path).await {
        Ok(metadata) if metadata.is_file() => metadata,
        _ => return responses::status_response(StatusCode::NOT_FOUND),
    };
    let last_modified = metadata.modified().unwrap_or_else(|_| SystemTime::now());

    let body = match tokio::fs::read(&full_path).await {
        Ok(body) => body,
        Err(_) => return responses::status_response(StatusCode::NOT_FOUND),
    };

    responses::image_response(ImageResponseParts {
        format,
        source: ImageSource::Sendfile,
        last_modified,
        timing: ImageTiming::None,
        body: Bytes::from(body),
    })
}

fn has_illegal_path_components(path: &str) -> bool {
    path.contains("..") || path.contains("//")
}

/// Extension after the last dot, if it looks like one.
fn file_extension(path: &str) -> Option<&str> {
    let (_, ext) = path.rsplit_once('.')?;
    if ext.is_empty() || ext.contains('/') {
        return None;
    }
    Some(ext)
}

fn resize_params_from_query(query: &ResizeQuery) -> Option<ResizeParams> {
    let width = parse_dimension(query.width.as_deref())?;
    let height = parse_dimension(query.height.as_deref())?;
    let max_side = parse_dimension(query.max.as_deref())?;

    ResizeParams::from_options(width, height, max_side).ok()
}

/// `None` on a parse failure, `Some(None)` when absent.
fn parse_dimension(value: Option<&str>) -> Option<Option<u32>> {
    match value {
        None => Some(None),
        Some(text) => text.parse().ok().map(Some),
    }
}
