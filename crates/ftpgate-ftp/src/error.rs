//! Error types for the ftpgate-ftp crate

use thiserror::Error;

/// Result type alias using `BackendError`
pub type Result<T> = std::result::Result<T, BackendError>;

/// Errors that can occur while talking to the backend file server
#[derive(Error, Debug)]
pub enum BackendError {
    /// The backend did not answer the connect + login sequence in time
    #[error("connection to {addr} timed out after {millis}ms")]
    ConnectTimeout { addr: String, millis: u64 },

    /// TCP connect or name resolution failed
    #[error("connection error: {0}")]
    Connection(String),

    /// USER/PASS rejected
    #[error("login failed: {0}")]
    Login(String),

    /// An operation was attempted without a live session
    #[error("not connected to backend")]
    NotConnected,

    /// The server closed the control connection
    #[error("backend closed the connection: {0}")]
    Disconnected(String),

    /// A command or data read exceeded the I/O timeout
    #[error("operation timed out after {millis}ms")]
    Timeout { millis: u64 },

    /// The server answered with an unexpected reply code
    #[error("{code} {message}")]
    Rejected { code: u16, message: String },

    /// The requested path does not exist on the backend
    #[error("no such file or directory: {0}")]
    NotFound(String),

    /// The server sent something we could not parse
    #[error("protocol error: {0}")]
    Protocol(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl BackendError {
    /// Build an error from a negative FTP reply.
    ///
    /// 550 is "requested action not taken: file unavailable", which servers
    /// use for missing paths.
    pub fn from_reply(code: u16, message: &str, path: Option<&str>) -> Self {
        match (code, path) {
            (550, Some(path)) => BackendError::NotFound(path.to_string()),
            _ => BackendError::Rejected {
                code,
                message: message.to_string(),
            },
        }
    }

    /// Whether the control connection is unusable after this error
    pub fn breaks_session(&self) -> bool {
        matches!(
            self,
            BackendError::Disconnected(_)
                | BackendError::Timeout { .. }
                | BackendError::Io(_)
                | BackendError::Protocol(_)
                | BackendError::NotConnected
        )
    }

    /// Whether this error came from a connect attempt timing out
    pub fn is_connect_timeout(&self) -> bool {
        matches!(self, BackendError::ConnectTimeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_reply_not_found() {
        let err = BackendError::from_reply(550, "550 No such file", Some("/a.txt"));
        assert!(matches!(err, BackendError::NotFound(p) if p == "/a.txt"));
    }

    #[test]
    fn test_from_reply_without_path_is_rejected() {
        let err = BackendError::from_reply(550, "550 Permission denied", None);
        assert!(matches!(err, BackendError::Rejected { code: 550, .. }));
    }

    #[test]
    fn test_breaks_session() {
        assert!(BackendError::Disconnected("eof".into()).breaks_session());
        assert!(BackendError::Timeout { millis: 10 }.breaks_session());
        assert!(!BackendError::NotFound("/x".into()).breaks_session());
        assert!(!BackendError::Rejected { code: 501, message: "bad".into() }.breaks_session());
    }
}
