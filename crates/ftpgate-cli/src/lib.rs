//! # ftpgate
//!
//! HTTP gateway that serves one FTP server to plain HTTP clients.
//!
//! This crate provides:
//! - **Directory listings**: `GET /some/dir/` renders the backend's MLSD
//!   listing as an HTML page
//! - **Downloads**: `GET /some/file` streams the file in binary mode
//! - **Reconnects**: the shared backend session is checked with NOOP before each request
//!   and re-established once if it has gone away
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                   HTTP Clients                      │
//! │              (browsers, curl, wget)                 │
//! └─────────────────────────┬───────────────────────────┘
//!                           │
//! ┌─────────────────────────▼───────────────────────────┐
//! │                      ftpgate                        │
//! ├─────────────────────────────────────────────────────┤
//! │      Request ID │ Access Log │ Trace                │
//! ├─────────────────────────────────────────────────────┤
//! │   Gateway handler (method check, path dispatch)     │
//! │      Listing renderer   │   File streamer           │
//! ├─────────────────────────────────────────────────────┤
//! │                   ftpgate-ftp                       │
//! │      (FileBackend, FtpBackend over suppaftp)        │
//! └─────────────────────────┬───────────────────────────┘
//!                           │
//!                      FTP server
//! ```

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod path;
pub mod routes;
pub mod server;
pub mod state;

pub use config::GatewayConfig;
pub use error::ApiError;
pub use routes::create_router;
pub use server::{run_server, run_server_with_shutdown};
pub use state::AppState;
