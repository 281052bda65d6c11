//! File downloads streamed from the backend

use crate::path::RequestPath;
use crate::{ApiError, AppState};
use axum::{
    body::Body,
    http::{StatusCode, header},
    response::Response,
};
use ftpgate_ftp::BackendError;
use futures::TryStreamExt;

/// GET /file - Stream a file as it arrives from the backend
///
/// Each download logs in on a session of its own, and the backend confirms
/// the transfer before any header is written, so a missing file is a clean
/// 404. Once the 200 is out, a backend failure can only cut the body short.
pub async fn download_file(state: &AppState, path: &RequestPath) -> Result<Response, ApiError> {
    let stream = match state.backend.retrieve_file(&path.decoded).await {
        Ok(stream) => stream,
        Err(BackendError::NotFound(p)) => return Err(ApiError::NotFound(p)),
        Err(e) => return Err(ApiError::from_connect(e)),
    };

    let logged_path = path.decoded.clone();
    let body = Body::from_stream(stream.inspect_err(move |e| {
        tracing::warn!(path = %logged_path, error = %e, "download aborted mid-stream");
    }));

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .body(body)
        .map_err(|e| ApiError::Internal(e.to_string()))
}
