//! Error types and their HTTP responses

use axum::{
    http::{Method, StatusCode, header},
    response::{IntoResponse, Response},
};
use ftpgate_ftp::BackendError;
use thiserror::Error;

/// API error type
#[derive(Error, Debug)]
pub enum ApiError {
    /// The single reconnect attempt ran out of time
    #[error("FTP connection timeout")]
    ConnectTimeout,

    /// Any other backend fault; the message is sent to the client
    #[error("{0}")]
    Backend(#[from] BackendError),

    /// A file request for a path the backend does not have
    #[error("File not found: {0}")]
    NotFound(String),

    /// A path the backend must never see, e.g. one with an encoded CR/LF
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unsupported method ('{0}')")]
    NotImplemented(Method),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// Map a failed connect/reconnect, singling out timeouts
    pub fn from_connect(err: BackendError) -> Self {
        if err.is_connect_timeout() {
            Self::ConnectTimeout
        } else {
            Self::Backend(err)
        }
    }

    /// Get the HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::NotImplemented(_) => StatusCode::NOT_IMPLEMENTED,
            Self::ConnectTimeout | Self::Backend(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(status = %status.as_u16(), error = %self, "request failed");
        } else {
            tracing::debug!(status = %status.as_u16(), error = %self, "request rejected");
        }

        (
            status,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            self.to_string(),
        )
            .into_response()
    }
}
