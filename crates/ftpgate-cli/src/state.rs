//! Application state

use crate::config::GatewayConfig;
use ftpgate_ftp::{FileBackend, FtpBackend};
use std::sync::Arc;
use tracing::info;

/// Application state shared across handlers
pub struct AppState {
    /// Gateway configuration
    pub config: GatewayConfig,
    /// The one backend connection, shared by every request for the server's lifetime
    pub backend: Arc<dyn FileBackend>,
}

impl AppState {
    /// Create state with an FTP backend; nothing connects until the first request
    pub fn new(config: GatewayConfig) -> Self {
        let backend = FtpBackend::new(config.ftp_config());
        info!("Backend: {}", backend.backend_name());
        Self::with_backend(config, Arc::new(backend))
    }

    /// Create state around an existing backend, e.g. a `MemoryBackend` in tests
    pub fn with_backend(config: GatewayConfig, backend: Arc<dyn FileBackend>) -> Self {
        Self { config, backend }
    }
}
