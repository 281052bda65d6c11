//! Request path classification and decoding

use crate::ApiError;
use std::borrow::Cow;

/// What a request path asks the backend for
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PathKind {
    /// Ends in `/`: render a listing
    Directory,
    /// Anything else: stream the file
    File,
}

/// A request path as received and as handed to the backend
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestPath {
    /// Path exactly as it appeared on the request line, query excluded
    pub raw: String,
    /// Percent-decoded path, or `raw` when decoding is not valid UTF-8
    pub decoded: String,
}

impl RequestPath {
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let decoded = decode_lenient(&raw).into_owned();
        Self { raw, decoded }
    }

    /// Decode `raw`, rejecting paths whose decoded form carries CR, LF or NUL.
    ///
    /// Those would end the FTP command early and let the rest run as a
    /// command of its own.
    pub fn parse(raw: impl Into<String>) -> Result<Self, ApiError> {
        let path = Self::new(raw);
        if path.decoded.contains(['\r', '\n', '\0']) {
            return Err(ApiError::BadRequest(format!(
                "path contains control characters: {}",
                path.raw
            )));
        }
        Ok(path)
    }

    /// Classification is made on the raw path, so an encoded `%2F` at the
    /// end does not turn a file into a directory.
    pub fn kind(&self) -> PathKind {
        if self.raw.ends_with('/') {
            PathKind::Directory
        } else {
            PathKind::File
        }
    }
}

/// Percent-decode, falling back to the input when the result is not UTF-8
pub fn decode_lenient(raw: &str) -> Cow<'_, str> {
    match urlencoding::decode(raw) {
        Ok(decoded) => decoded,
        Err(e) => {
            tracing::debug!(path = raw, error = %e, "path is not valid UTF-8 once decoded, using raw form");
            Cow::Borrowed(raw)
        }
    }
}
