//! Reconnecting backend connection
//!
//! One FTP session is shared by liveness checks and listings. It is guarded
//! by an async mutex, so at most one such command runs at a time, and every
//! command is bounded by the I/O timeout. Each download opens a session of
//! its own, so a slow HTTP client never holds the shared one.
//!
//! suppaftp is blocking: commands run on tokio's blocking pool, and a
//! download's reader thread hands chunks to the response body through a
//! bounded channel.

use crate::client::{FtpClient, FtpConfig, map_io_error, validate_path};
use crate::{BackendError, ByteStream, DEFAULT_CHUNK_SIZE, DirEntry, FileBackend, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::io::Read;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{Mutex, mpsc, oneshot};
use tracing::{debug, info, warn};

/// Chunks buffered between a download's reader thread and the HTTP body
pub const TRANSFER_QUEUE_DEPTH: usize = 4;

/// A listing is PASV, MLSD, the data read and a completion reply
const REPLIES_PER_COMMAND: u32 = 4;

type Session = Option<FtpClient>;

/// What a download's reader thread sends; `Ok(None)` marks completion
type TransferItem = Result<Option<Bytes>>;

/// The gateway's handle on the backend FTP server
pub struct FtpBackend {
    config: FtpConfig,
    session: Mutex<Session>,
    connects: AtomicU64,
}

impl FtpBackend {
    /// Create a disconnected backend; the session is opened lazily
    pub fn new(config: FtpConfig) -> Self {
        Self {
            config,
            session: Mutex::new(None),
            connects: AtomicU64::new(0),
        }
    }

    /// Backend connection settings
    pub fn config(&self) -> &FtpConfig {
        &self.config
    }

    /// Number of successful connects of the shared session so far
    pub fn connect_count(&self) -> u64 {
        self.connects.load(Ordering::Relaxed)
    }

    fn command_deadline(&self) -> Option<Duration> {
        self.config.io_timeout.map(|limit| limit * REPLIES_PER_COMMAND)
    }

    /// Run a blocking command on `client`, handing the client back with its result.
    ///
    /// Past the deadline the client is abandoned to the blocking pool and
    /// closes once the command returns.
    async fn run_blocking<T, F>(&self, mut client: FtpClient, op: F) -> Result<(FtpClient, Result<T>)>
    where
        T: Send + 'static,
        F: FnOnce(&mut FtpClient) -> Result<T> + Send + 'static,
    {
        let task = tokio::task::spawn_blocking(move || {
            let result = op(&mut client);
            (client, result)
        });
        let joined = match self.command_deadline() {
            Some(limit) => tokio::time::timeout(limit, task).await.map_err(|_| BackendError::Timeout {
                millis: limit.as_millis() as u64,
            })?,
            None => task.await,
        };
        joined.map_err(|e| BackendError::Protocol(format!("backend task failed: {}", e)))
    }

    /// Run a command on the shared session, dropping it if the command broke it
    async fn with_session<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut FtpClient) -> Result<T> + Send + 'static,
    {
        let mut session = self.session.lock().await;
        let client = session.take().ok_or(BackendError::NotConnected)?;
        let (client, result) = match self.run_blocking(client, op).await {
            Ok(done) => done,
            Err(e) => {
                warn!(error = %e, "discarding broken backend session");
                return Err(e);
            }
        };
        match &result {
            Err(e) if e.breaks_session() => warn!(error = %e, "discarding broken backend session"),
            _ => *session = Some(client),
        }
        result
    }

    /// NOOP the shared session, dropping it on failure
    async fn check_session(&self, session: &mut Session) -> bool {
        let Some(client) = session.take() else {
            return false;
        };
        match self.run_blocking(client, FtpClient::noop).await {
            Ok((client, Ok(()))) => {
                *session = Some(client);
                true
            }
            // Dropping the client closes its control socket
            Ok((_, Err(e))) | Err(e) => {
                warn!(error = %e, "backend liveness check failed");
                false
            }
        }
    }
}

#[async_trait]
impl FileBackend for FtpBackend {
    fn backend_name(&self) -> String {
        format!("ftp://{}", self.config.addr())
    }

    async fn is_alive(&self) -> bool {
        let mut session = self.session.lock().await;
        self.check_session(&mut session).await
    }

    async fn ensure_connected(&self) -> Result<()> {
        let mut session = self.session.lock().await;
        if self.check_session(&mut session).await {
            return Ok(());
        }

        let client = FtpClient::connect(self.config.clone()).await?;
        let n = self.connects.fetch_add(1, Ordering::Relaxed) + 1;
        info!(backend = %self.config.addr(), connects = n, "connected to backend");
        *session = Some(client);
        Ok(())
    }

    async fn list_directory(&self, path: &str) -> Result<Vec<DirEntry>> {
        validate_path(path)?;
        let path = path.to_string();
        self.with_session(move |client| client.mlsd(&path)).await
    }

    async fn retrieve_file(&self, path: &str) -> Result<ByteStream> {
        validate_path(path)?;
        let client = FtpClient::connect(self.config.clone()).await?;
        debug!(path, "opened download session");

        let (ready_tx, ready_rx) = oneshot::channel();
        let (chunks_tx, chunks_rx) = mpsc::channel(TRANSFER_QUEUE_DEPTH);
        let transfer = Transfer {
            path: path.to_string(),
            io_timeout: self.config.io_timeout,
            runtime: Handle::current(),
            chunks: chunks_tx,
        };
        tokio::task::spawn_blocking(move || transfer.run(client, ready_tx));

        // Dropping `ready_rx` on timeout makes the reader thread give up
        let started = match self.command_deadline() {
            Some(limit) => tokio::time::timeout(limit, ready_rx).await.map_err(|_| BackendError::Timeout {
                millis: limit.as_millis() as u64,
            })?,
            None => ready_rx.await,
        };
        started.map_err(|_| BackendError::Disconnected("download ended before it started".to_string()))??;

        Ok(Box::pin(receive_chunks(chunks_rx)))
    }

    async fn disconnect(&self) {
        let Some(client) = self.session.lock().await.take() else {
            return;
        };
        if let Err(e) = tokio::task::spawn_blocking(move || client.quit()).await {
            warn!(error = %e, "backend QUIT failed");
        }
        info!(backend = %self.config.addr(), "disconnected from backend");
    }
}

/// Turn the reader thread's channel into the download stream
fn receive_chunks(chunks: mpsc::Receiver<TransferItem>) -> impl futures::Stream<Item = Result<Bytes>> + Send {
    futures::stream::unfold(Some(chunks), |chunks| async move {
        let mut chunks = chunks?;
        match chunks.recv().await {
            Some(Ok(Some(chunk))) => Some((Ok(chunk), Some(chunks))),
            Some(Ok(None)) => None,
            Some(Err(e)) => Some((Err(e), None)),
            None => Some((
                Err(BackendError::Disconnected("download stopped before completion".to_string())),
                None,
            )),
        }
    })
}

/// One RETR on its own session, run on the blocking pool
struct Transfer {
    path: String,
    io_timeout: Option<Duration>,
    runtime: Handle,
    chunks: mpsc::Sender<TransferItem>,
}

impl Transfer {
    fn run(self, mut client: FtpClient, ready: oneshot::Sender<Result<()>>) {
        let data = match client.retr(&self.path) {
            Ok(data) => data,
            Err(e) => {
                let _ = ready.send(Err(e));
                client.quit();
                return;
            }
        };
        if ready.send(Ok(())).is_err() {
            return;
        }

        let data = match self.pump(data) {
            Some(data) => data,
            // Dropping the client and data socket hard-stops the transfer
            None => return,
        };
        match client.finish_transfer(data) {
            Ok(()) => {
                if self.deliver(Ok(None)) {
                    debug!(path = %self.path, "download complete");
                }
                client.quit();
            }
            Err(e) => {
                self.deliver(Err(e));
            }
        }
    }

    /// Copy the data socket into the channel; `None` when the transfer ended early
    fn pump<R: Read>(&self, mut data: R) -> Option<R> {
        let mut buf = vec![0u8; DEFAULT_CHUNK_SIZE];
        loop {
            match data.read(&mut buf) {
                Ok(0) => return Some(data),
                Ok(n) => {
                    if !self.deliver(Ok(Some(Bytes::copy_from_slice(&buf[..n])))) {
                        warn!(path = %self.path, "download not consumed, closing its backend session");
                        return None;
                    }
                }
                Err(e) => {
                    self.deliver(Err(map_io_error(e, self.io_timeout)));
                    return None;
                }
            }
        }
    }

    /// Hand one item to the body; false once it is gone or stalled past the I/O timeout
    fn deliver(&self, item: TransferItem) -> bool {
        let send = self.chunks.send(item);
        match self.io_timeout {
            Some(limit) => matches!(self.runtime.block_on(tokio::time::timeout(limit, send)), Ok(Ok(()))),
            None => self.runtime.block_on(send).is_ok(),
        }
    }
}
