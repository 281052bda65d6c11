//! Gateway configuration

use ftpgate_ftp::FtpConfig;
use std::time::Duration;

/// Gateway server configuration
#[derive(Clone, Debug)]
pub struct GatewayConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Backend FTP host
    pub ftp_host: String,
    /// Backend FTP control port
    pub ftp_port: u16,
    /// Backend login user (anonymous when unset)
    pub ftp_user: Option<String>,
    /// Backend login password
    pub ftp_password: Option<String>,
    /// Deadline for connecting and logging in to the backend (milliseconds)
    pub connect_timeout_ms: u64,
    /// Deadline for each backend reply or data read (milliseconds, 0 = none)
    pub io_timeout_ms: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            ftp_host: "127.0.0.1".to_string(),
            ftp_port: 21,
            ftp_user: None,
            ftp_password: None,
            connect_timeout_ms: 5_000,
            io_timeout_ms: 30_000,
        }
    }
}

impl GatewayConfig {
    /// Get the bind address
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Backend connection settings derived from this config
    pub fn ftp_config(&self) -> FtpConfig {
        let mut ftp = FtpConfig::new(self.ftp_host.clone(), self.ftp_port);
        ftp.username = self.ftp_user.clone();
        ftp.password = self.ftp_password.clone();
        ftp.connect_timeout = Duration::from_millis(self.connect_timeout_ms);
        ftp.io_timeout = (self.io_timeout_ms > 0).then(|| Duration::from_millis(self.io_timeout_ms));
        ftp
    }
}
