//! Request handlers
//!
//! Every request lands in [`gateway`], which checks the method and the path,
//! makes sure the backend session is live and then dispatches on the path
//! shape.

pub mod download;
pub mod listing;

pub use download::download_file;
pub use listing::{list_directory, render_listing};

use crate::path::{PathKind, RequestPath};
use crate::{ApiError, AppState};
use axum::{
    extract::State,
    http::{Method, Uri},
    response::Response,
};
use std::sync::Arc;
use tracing::debug;

/// Fallback handler for all paths
pub async fn gateway(
    State(state): State<Arc<AppState>>,
    method: Method,
    uri: Uri,
) -> Result<Response, ApiError> {
    if method != Method::GET {
        return Err(ApiError::NotImplemented(method));
    }

    let path = RequestPath::parse(uri.path())?;

    state
        .backend
        .ensure_connected()
        .await
        .map_err(ApiError::from_connect)?;

    debug!(raw = %path.raw, decoded = %path.decoded, kind = ?path.kind(), "dispatching");

    match path.kind() {
        PathKind::Directory => list_directory(&state, &path).await,
        PathKind::File => download_file(&state, &path).await,
    }
}
