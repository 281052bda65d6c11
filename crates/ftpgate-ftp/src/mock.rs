//! Scriptable FTP server for tests
//!
//! Serves a `MemoryTree` over real control and data sockets, speaking the
//! subset of RFC 959/3659 the client uses. Knobs let tests delay the
//! greeting, kill live sessions, and make downloads abort mid-transfer.

use crate::listing::{DirEntry, EntryKind};
use crate::memory::{MemoryTree, normalize_path};
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

#[derive(Default)]
struct MockState {
    tree: RwLock<MemoryTree>,
    broken_files: RwLock<HashSet<String>>,
    credentials: RwLock<Option<(String, String)>>,
    greeting_delay_ms: AtomicU64,
    sessions: AtomicUsize,
    commands: Mutex<Vec<String>>,
}

/// A running mock FTP server bound to 127.0.0.1
pub struct MockFtpServer {
    addr: SocketAddr,
    state: Arc<MockState>,
    kill: watch::Sender<u64>,
    task: JoinHandle<()>,
}

impl MockFtpServer {
    /// Start serving `tree` on an ephemeral port
    pub async fn start(tree: MemoryTree) -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let state = Arc::new(MockState {
            tree: RwLock::new(tree),
            ..Default::default()
        });
        let (kill, _) = watch::channel(0u64);

        let task = {
            let state = Arc::clone(&state);
            let kill = kill.clone();
            tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    state.sessions.fetch_add(1, Ordering::SeqCst);
                    let state = Arc::clone(&state);
                    let kill_rx = kill.subscribe();
                    tokio::spawn(async move {
                        if let Err(e) = serve_session(stream, state, kill_rx).await {
                            debug!(error = %e, "mock session ended with error");
                        }
                    });
                }
            })
        };

        Ok(Self {
            addr,
            state,
            kill,
            task,
        })
    }

    /// Control address
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Control port
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Mutable access to the served tree
    pub fn tree(&self) -> parking_lot::RwLockWriteGuard<'_, MemoryTree> {
        self.state.tree.write()
    }

    /// Require these credentials instead of accepting any login
    pub fn require_login(&self, user: &str, password: &str) {
        *self.state.credentials.write() = Some((user.to_string(), password.to_string()));
    }

    /// Wait this long before greeting new connections
    pub fn set_greeting_delay(&self, delay: Duration) {
        self.state
            .greeting_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Send half of this file, then fail the transfer with 426
    pub fn break_file(&self, path: &str) {
        self.state.broken_files.write().insert(normalize_path(path));
    }

    /// Close every open control connection
    pub fn kill_sessions(&self) {
        self.kill.send_modify(|generation| *generation += 1);
    }

    /// Number of control connections accepted so far
    pub fn session_count(&self) -> usize {
        self.state.sessions.load(Ordering::SeqCst)
    }

    /// Every command received, in order, across all sessions
    pub fn commands(&self) -> Vec<String> {
        self.state.commands.lock().clone()
    }
}

impl Drop for MockFtpServer {
    fn drop(&mut self) {
        self.kill_sessions();
        self.task.abort();
    }
}

fn mlsd_line(entry: &DirEntry) -> String {
    let kind = match &entry.kind {
        EntryKind::File => "file",
        EntryKind::Directory => "dir",
        EntryKind::CurrentDirectory => "cdir",
        EntryKind::ParentDirectory => "pdir",
        EntryKind::Other(other) => other.as_str(),
    };
    match entry.size {
        Some(size) => format!("type={};size={}; {}\r\n", kind, size, entry.name),
        None => format!("type={}; {}\r\n", kind, entry.name),
    }
}

async fn reply(wr: &mut OwnedWriteHalf, line: &str) -> std::io::Result<()> {
    wr.write_all(format!("{}\r\n", line).as_bytes()).await
}

async fn accept_data(listener: Option<TcpListener>) -> Option<TcpStream> {
    let listener = listener?;
    match tokio::time::timeout(Duration::from_secs(5), listener.accept()).await {
        Ok(Ok((stream, _))) => Some(stream),
        _ => None,
    }
}

async fn serve_session(
    stream: TcpStream,
    state: Arc<MockState>,
    mut kill_rx: watch::Receiver<u64>,
) -> std::io::Result<()> {
    let delay = state.greeting_delay_ms.load(Ordering::SeqCst);
    if delay > 0 {
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }

    let (rd, mut wr) = stream.into_split();
    let mut lines = BufReader::new(rd).lines();
    reply(&mut wr, "220 mock ftp ready").await?;

    let mut user: Option<String> = None;
    let mut logged_in = false;
    let mut passive: Option<TcpListener> = None;

    loop {
        let line = tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) => line,
                None => return Ok(()),
            },
            _ = kill_rx.changed() => return Ok(()),
        };
        state.commands.lock().push(line.clone());

        let (verb, arg) = match line.split_once(' ') {
            Some((verb, arg)) => (verb.to_ascii_uppercase(), arg.to_string()),
            None => (line.to_ascii_uppercase(), String::new()),
        };

        match verb.as_str() {
            "USER" => {
                user = Some(arg);
                reply(&mut wr, "331 Password required").await?;
            }
            "PASS" => {
                let accepted = match &*state.credentials.read() {
                    Some((u, p)) => user.as_deref() == Some(u.as_str()) && arg == *p,
                    None => true,
                };
                logged_in = accepted;
                if accepted {
                    reply(&mut wr, "230 Logged in").await?;
                } else {
                    reply(&mut wr, "530 Login incorrect").await?;
                }
            }
            "QUIT" => {
                reply(&mut wr, "221 Bye").await?;
                return Ok(());
            }
            _ if !logged_in => reply(&mut wr, "530 Please login with USER and PASS").await?,
            "TYPE" | "NOOP" => reply(&mut wr, "200 OK").await?,
            "PASV" => {
                let listener = TcpListener::bind("127.0.0.1:0").await?;
                let port = listener.local_addr()?.port();
                passive = Some(listener);
                let msg = format!(
                    "227 Entering Passive Mode (127,0,0,1,{},{})",
                    port / 256,
                    port % 256
                );
                reply(&mut wr, &msg).await?;
            }
            "MLSD" => {
                let listing = state.tree.read().list(&arg);
                // The passive listener stays open: clients may connect before reading this
                let Some(entries) = listing else {
                    reply(&mut wr, "550 No such directory").await?;
                    continue;
                };
                let Some(mut data) = accept_data(passive.take()).await else {
                    reply(&mut wr, "425 Can't open data connection").await?;
                    continue;
                };
                reply(&mut wr, "150 Opening data connection for MLSD").await?;
                for entry in &entries {
                    data.write_all(mlsd_line(entry).as_bytes()).await?;
                }
                data.shutdown().await?;
                drop(data);
                reply(&mut wr, "226 Transfer complete").await?;
            }
            "RETR" => {
                let contents = state.tree.read().file(&arg);
                let Some(contents) = contents else {
                    reply(&mut wr, "550 No such file").await?;
                    continue;
                };
                let Some(mut data) = accept_data(passive.take()).await else {
                    reply(&mut wr, "425 Can't open data connection").await?;
                    continue;
                };
                reply(&mut wr, "150 Opening BINARY data connection").await?;

                let broken = state.broken_files.read().contains(&normalize_path(&arg));
                let payload: Bytes = if broken {
                    contents.slice(..contents.len() / 2)
                } else {
                    contents
                };
                // A client that hangs up mid-transfer is not a session error
                let sent = data.write_all(&payload).await;
                let _ = data.shutdown().await;
                drop(data);

                if broken || sent.is_err() {
                    reply(&mut wr, "426 Connection closed; transfer aborted").await?;
                } else {
                    reply(&mut wr, "226 Transfer complete").await?;
                }
            }
            _ => reply(&mut wr, "502 Command not implemented").await?,
        }
    }
}
