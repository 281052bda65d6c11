//! HTTP route definitions

use crate::{AppState, handlers, middleware};
use axum::{Router, middleware as axum_middleware};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Create the main router
///
/// There are no fixed routes: the request path is a backend path, so
/// everything goes through the fallback.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .fallback(handlers::gateway)
        // Apply middleware (outermost last)
        .layer(axum_middleware::from_fn(middleware::logging_middleware))
        .layer(axum_middleware::from_fn(middleware::request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
