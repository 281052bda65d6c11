//! # ftpgate-ftp
//!
//! Backend layer for the ftpgate HTTP gateway.
//!
//! This crate provides:
//! - **FTP client**: a suppaftp session plus MLSD fact parsing
//! - **Backend connection**: a single, mutex-guarded session for listings
//!   that reconnects when its NOOP check fails
//! - **Streaming retrieval**: each download runs on its own session and its
//!   bytes arrive as a stream of chunks, never fully buffered
//! - **Test utilities** (`test-util` feature): an in-process memory backend
//!   and a mock FTP server
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │             HTTP gateway                │
//! ├─────────────────────────────────────────┤
//! │           FileBackend trait             │
//! ├────────────────────┬────────────────────┤
//! │     FtpBackend     │   MemoryBackend    │
//! ├────────────────────┤                    │
//! │ FtpClient/suppaftp │                    │
//! ├────────────────────┴────────────────────┤
//! │          FTP server (control+data)      │
//! └─────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use ftpgate_ftp::{FileBackend, FtpBackend, FtpConfig};
//!
//! let backend = FtpBackend::new(FtpConfig::new("ftp.example.com", 21));
//! backend.ensure_connected().await?;
//! let entries = backend.list_directory("/pub/").await?;
//! ```

pub mod client;
pub mod connection;
pub mod error;
pub mod listing;
#[cfg(any(test, feature = "test-util"))]
pub mod memory;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;

pub use client::{FtpClient, FtpConfig};
pub use connection::FtpBackend;
pub use error::{BackendError, Result};
pub use listing::{DirEntry, EntryKind};
#[cfg(any(test, feature = "test-util"))]
pub use memory::{MemoryBackend, MemoryTree};
#[cfg(any(test, feature = "test-util"))]
pub use mock::MockFtpServer;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::pin::Pin;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Largest chunk handed out by a retrieval stream (64 KiB)
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// File contents as they arrive from the backend
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Trait for the file server the gateway translates requests to
#[async_trait]
pub trait FileBackend: Send + Sync {
    /// Human-readable backend identity for logs
    fn backend_name(&self) -> String;

    /// Check the current session; false when there is none
    async fn is_alive(&self) -> bool;

    /// Make sure a live session exists, connecting at most once
    async fn ensure_connected(&self) -> Result<()>;

    /// List `path` in backend order, including any self/parent markers
    async fn list_directory(&self, path: &str) -> Result<Vec<DirEntry>>;

    /// Start retrieving `path`.
    ///
    /// Returns only after the backend has accepted the transfer, so a
    /// missing file surfaces here as `NotFound` rather than mid-stream.
    async fn retrieve_file(&self, path: &str) -> Result<ByteStream>;

    /// Close the session, if any. Called once at shutdown.
    async fn disconnect(&self) {}
}

/// Copy a retrieval into `sink`, returning the number of bytes written
pub async fn retrieve_into<W>(backend: &dyn FileBackend, path: &str, sink: &mut W) -> Result<u64>
where
    W: AsyncWrite + Unpin + Send,
{
    let mut stream = backend.retrieve_file(path).await?;
    let mut total = 0u64;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        sink.write_all(&chunk).await?;
        total += chunk.len() as u64;
    }
    sink.flush().await?;
    Ok(total)
}
