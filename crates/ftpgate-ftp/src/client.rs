//! FTP client session: owns one control connection
//!
//! Wraps a blocking `suppaftp::FtpStream`. `connect()` runs the TCP connect,
//! greeting, USER/PASS and TYPE I on the blocking pool under one deadline;
//! every other method blocks and must be called from `spawn_blocking`.

use crate::listing::{DirEntry, parse_mlsd_lines};
use crate::{BackendError, Result};
use std::io;
use std::time::Duration;
use suppaftp::types::FileType;
use suppaftp::{FtpError, FtpStream};
use tracing::{debug, instrument};

/// Default FTP control port
pub const DEFAULT_FTP_PORT: u16 = 21;

/// Default connect + login deadline
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Connection settings for one backend FTP server
#[derive(Clone, Debug)]
pub struct FtpConfig {
    /// Backend host name or IP
    pub host: String,
    /// Backend control port
    pub port: u16,
    /// Login user; anonymous when unset
    pub username: Option<String>,
    /// Login password
    pub password: Option<String>,
    /// Deadline for TCP connect, greeting and login together
    pub connect_timeout: Duration,
    /// Deadline for each control reply and data read (None = wait forever)
    pub io_timeout: Option<Duration>,
}

impl Default for FtpConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_FTP_PORT,
            username: None,
            password: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            io_timeout: Some(Duration::from_secs(30)),
        }
    }
}

impl FtpConfig {
    /// Config for `host:port` with anonymous login
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    /// Log in with explicit credentials instead of anonymously
    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// `host:port` string for the control connection
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    fn login_user(&self) -> &str {
        self.username.as_deref().unwrap_or("anonymous")
    }

    fn login_password(&self) -> &str {
        match (&self.username, &self.password) {
            (_, Some(password)) => password,
            (None, None) => "anonymous@",
            (Some(_), None) => "",
        }
    }
}

/// Reject paths that would split into extra commands on the control channel
pub fn validate_path(path: &str) -> Result<()> {
    if path.contains(['\r', '\n', '\0']) {
        return Err(BackendError::Protocol(format!(
            "refusing path with control characters: {:?}",
            path
        )));
    }
    Ok(())
}

/// Translate a suppaftp failure. `path` turns a 550 into `NotFound`.
pub(crate) fn map_ftp_error(err: FtpError, path: Option<&str>, limit: Option<Duration>) -> BackendError {
    match err {
        FtpError::ConnectionError(e) => map_io_error(e, limit),
        FtpError::UnexpectedResponse(ref response) => {
            let code = response.status.code() as u16;
            BackendError::from_reply(code, &err.to_string(), path)
        }
        other => BackendError::Protocol(other.to_string()),
    }
}

/// Socket timeouts surface as `WouldBlock` or `TimedOut` depending on platform
pub(crate) fn map_io_error(err: io::Error, limit: Option<Duration>) -> BackendError {
    match err.kind() {
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => BackendError::Timeout {
            millis: limit.map_or(0, |d| d.as_millis() as u64),
        },
        io::ErrorKind::UnexpectedEof | io::ErrorKind::ConnectionReset | io::ErrorKind::BrokenPipe => {
            BackendError::Disconnected(err.to_string())
        }
        _ => BackendError::Io(err),
    }
}

/// A logged-in FTP session
pub struct FtpClient {
    stream: FtpStream,
    io_timeout: Option<Duration>,
}

impl FtpClient {
    /// Connect and log in, failing with `ConnectTimeout` past the deadline.
    ///
    /// A handshake that outlives the deadline finishes on the blocking pool
    /// and its session is dropped.
    #[instrument(skip(config), fields(addr = %config.addr()))]
    pub async fn connect(config: FtpConfig) -> Result<Self> {
        let deadline = config.connect_timeout;
        let addr = config.addr();
        let handshake = tokio::task::spawn_blocking(move || Self::handshake(&config));
        match tokio::time::timeout(deadline, handshake).await {
            Ok(Ok(result)) => result,
            Ok(Err(join)) => Err(BackendError::Connection(format!("handshake task failed: {}", join))),
            Err(_) => Err(BackendError::ConnectTimeout {
                addr,
                millis: deadline.as_millis() as u64,
            }),
        }
    }

    fn handshake(config: &FtpConfig) -> Result<Self> {
        let addr = config.addr();
        let mut stream = FtpStream::connect(addr.as_str()).map_err(|e| match e {
            FtpError::ConnectionError(io) => BackendError::Connection(format!("connect to {}: {}", addr, io)),
            other => BackendError::Connection(format!("server not ready: {}", other)),
        })?;

        let control = stream.get_ref();
        control.set_nodelay(true).ok();
        control.set_read_timeout(config.io_timeout)?;
        control.set_write_timeout(config.io_timeout)?;

        stream
            .login(config.login_user(), config.login_password())
            .map_err(|e| BackendError::Login(e.to_string()))?;
        stream
            .transfer_type(FileType::Binary)
            .map_err(|e| map_ftp_error(e, None, config.io_timeout))?;
        debug!(user = config.login_user(), "logged in");

        Ok(Self {
            stream,
            io_timeout: config.io_timeout,
        })
    }

    /// Liveness check
    pub fn noop(&mut self) -> Result<()> {
        self.stream.noop().map_err(|e| map_ftp_error(e, None, self.io_timeout))
    }

    /// Machine-readable listing of `path`, in server order
    #[instrument(skip(self))]
    pub fn mlsd(&mut self, path: &str) -> Result<Vec<DirEntry>> {
        validate_path(path)?;
        let lines = self
            .stream
            .mlsd(Some(path))
            .map_err(|e| map_ftp_error(e, Some(path), self.io_timeout))?;

        Ok(parse_mlsd_lines(lines.iter().map(String::as_str)))
    }

    /// Start a binary download; the returned socket carries the file bytes.
    ///
    /// Hand the socket back to `finish_transfer()` once it reaches EOF.
    #[instrument(skip(self))]
    pub fn retr(&mut self, path: &str) -> Result<impl io::Read> {
        validate_path(path)?;
        let data = self
            .stream
            .retr_as_stream(path)
            .map_err(|e| map_ftp_error(e, Some(path), self.io_timeout))?;
        data.get_ref().set_read_timeout(self.io_timeout)?;
        Ok(data)
    }

    /// Close the data socket and read the completion reply (226/250)
    pub fn finish_transfer(&mut self, data: impl io::Read) -> Result<()> {
        self.stream
            .finalize_retr_stream(data)
            .map_err(|e| map_ftp_error(e, None, self.io_timeout))
    }

    /// Close the session politely; errors are ignored
    pub fn quit(mut self) {
        let _ = self.stream.quit();
    }
}
