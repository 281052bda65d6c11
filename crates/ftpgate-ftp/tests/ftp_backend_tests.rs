use bytes::Bytes;
use ftpgate_ftp::{
    BackendError, DEFAULT_CHUNK_SIZE, DirEntry, EntryKind, FileBackend, FtpBackend, FtpClient,
    FtpConfig, MemoryTree, MockFtpServer, retrieve_into,
};
use futures::{StreamExt, TryStreamExt};
use std::time::Duration;

fn sample_tree() -> MemoryTree {
    let mut tree = MemoryTree::new();
    tree.add_file("/x/a.txt", "alpha");
    tree.add_dir("/x/sub");
    tree.add_file("/x/my file; v2.txt", "spaces");
    tree.add_file("/files/empty.bin", Bytes::new());
    tree.add_file("/files/one.bin", vec![0x42u8]);
    tree.add_file("/files/big.bin", patterned(DEFAULT_CHUNK_SIZE * 3 + 17));
    tree
}

fn patterned(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

fn config_for(server: &MockFtpServer) -> FtpConfig {
    let mut config = FtpConfig::new("127.0.0.1", server.port());
    config.connect_timeout = Duration::from_millis(500);
    config.io_timeout = Some(Duration::from_secs(5));
    config
}

async fn connected_backend(server: &MockFtpServer) -> FtpBackend {
    let backend = FtpBackend::new(config_for(server));
    backend.ensure_connected().await.unwrap();
    backend
}

async fn download(backend: &FtpBackend, path: &str) -> Vec<u8> {
    let chunks: Vec<Bytes> = backend
        .retrieve_file(path)
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    chunks.concat()
}

#[test_log::test(tokio::test)]
async fn test_anonymous_login_sequence() {
    let server = MockFtpServer::start(sample_tree()).await.unwrap();
    let client = FtpClient::connect(config_for(&server)).await.unwrap();
    tokio::task::spawn_blocking(move || client.quit()).await.unwrap();

    assert_eq!(
        server.commands(),
        vec!["USER anonymous", "PASS anonymous@", "TYPE I", "QUIT"]
    );
}

#[test_log::test(tokio::test)]
async fn test_credentials_login() {
    let server = MockFtpServer::start(sample_tree()).await.unwrap();
    server.require_login("alice", "s3cret");

    let good = config_for(&server).with_credentials("alice", "s3cret");
    assert!(FtpClient::connect(good).await.is_ok());

    let bad = config_for(&server).with_credentials("alice", "wrong");
    let err = FtpClient::connect(bad).await.err().unwrap();
    assert!(matches!(err, BackendError::Login(msg) if msg.contains("530")));
}

#[test_log::test(tokio::test)]
async fn test_listing_preserves_backend_order() {
    let server = MockFtpServer::start(sample_tree()).await.unwrap();
    let backend = connected_backend(&server).await;

    let entries = backend.list_directory("/x/").await.unwrap();
    let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["/x", "a.txt", "sub", "my file; v2.txt"]);
    assert_eq!(entries[0].kind, EntryKind::CurrentDirectory);
    assert_eq!(entries[1].size, Some(5));
    assert_eq!(entries[2].kind, EntryKind::Directory);
}

#[test_log::test(tokio::test)]
async fn test_listing_missing_directory_keeps_session() {
    let server = MockFtpServer::start(sample_tree()).await.unwrap();
    let backend = connected_backend(&server).await;

    let err = backend.list_directory("/nope/").await.unwrap_err();
    assert!(matches!(err, BackendError::NotFound(_)));

    assert!(backend.is_alive().await);
    assert_eq!(backend.list_directory("/").await.unwrap().len(), 3);
    assert_eq!(server.session_count(), 1);
}

#[test_log::test(tokio::test)]
async fn test_retrieve_is_byte_identical() {
    let server = MockFtpServer::start(sample_tree()).await.unwrap();
    let backend = connected_backend(&server).await;

    assert!(download(&backend, "/files/empty.bin").await.is_empty());
    assert_eq!(download(&backend, "/files/one.bin").await, vec![0x42]);
    assert_eq!(
        download(&backend, "/files/big.bin").await,
        patterned(DEFAULT_CHUNK_SIZE * 3 + 17)
    );
    // Each download logs in on its own; the shared session is untouched
    assert_eq!(server.session_count(), 4);
    assert_eq!(backend.connect_count(), 1);
    assert!(backend.is_alive().await);
}

#[test_log::test(tokio::test)]
async fn test_retrieve_chunks_are_bounded() {
    let server = MockFtpServer::start(sample_tree()).await.unwrap();
    let backend = connected_backend(&server).await;

    let mut stream = backend.retrieve_file("/files/big.bin").await.unwrap();
    while let Some(chunk) = stream.next().await {
        assert!(chunk.unwrap().len() <= DEFAULT_CHUNK_SIZE);
    }
}

#[test_log::test(tokio::test)]
async fn test_retrieve_missing_file_fails_before_streaming() {
    let server = MockFtpServer::start(sample_tree()).await.unwrap();
    let backend = connected_backend(&server).await;

    let err = backend.retrieve_file("/files/missing.bin").await.err().unwrap();
    assert!(matches!(err, BackendError::NotFound(p) if p == "/files/missing.bin"));
    assert!(backend.is_alive().await);
}

#[test_log::test(tokio::test)]
async fn test_aborted_transfer_surfaces_as_stream_error() {
    let server = MockFtpServer::start(sample_tree()).await.unwrap();
    server.break_file("/files/big.bin");
    let backend = connected_backend(&server).await;

    let mut stream = backend.retrieve_file("/files/big.bin").await.unwrap();
    let mut received = 0;
    let mut failure = None;
    while let Some(chunk) = stream.next().await {
        match chunk {
            Ok(bytes) => received += bytes.len(),
            Err(e) => {
                failure = Some(e);
                break;
            }
        }
    }
    drop(stream);

    assert_eq!(received, (DEFAULT_CHUNK_SIZE * 3 + 17) / 2);
    assert!(matches!(failure, Some(BackendError::Rejected { code: 426, .. })));

    assert!(backend.is_alive().await);
    assert_eq!(backend.connect_count(), 1);
}

#[test_log::test(tokio::test)]
async fn test_dropped_download_keeps_shared_session() {
    let mut tree = sample_tree();
    tree.add_file("/huge.bin", patterned(8 * 1024 * 1024));
    let server = MockFtpServer::start(tree).await.unwrap();
    let backend = connected_backend(&server).await;

    let mut stream = backend.retrieve_file("/huge.bin").await.unwrap();
    assert!(stream.next().await.unwrap().is_ok());
    drop(stream);

    assert!(backend.is_alive().await);
    assert_eq!(backend.connect_count(), 1);
    assert_eq!(download(&backend, "/files/one.bin").await, vec![0x42]);
}

#[test_log::test(tokio::test)]
async fn test_unread_download_does_not_block_listings() {
    let mut tree = sample_tree();
    tree.add_file("/huge.bin", patterned(8 * 1024 * 1024));
    let server = MockFtpServer::start(tree).await.unwrap();
    let backend = connected_backend(&server).await;

    // Started but never polled, like an HTTP client that stopped reading
    let stalled = backend.retrieve_file("/huge.bin").await.unwrap();

    let listing = tokio::time::timeout(Duration::from_secs(2), async {
        backend.ensure_connected().await?;
        backend.list_directory("/x/").await
    })
    .await
    .expect("listing blocked behind an unread download")
    .unwrap();
    assert_eq!(listing.len(), 4);
    drop(stalled);
}

#[test_log::test(tokio::test)]
async fn test_stalled_download_is_stopped() {
    let mut tree = sample_tree();
    tree.add_file("/huge.bin", patterned(8 * 1024 * 1024));
    let server = MockFtpServer::start(tree).await.unwrap();
    let mut config = config_for(&server);
    config.io_timeout = Some(Duration::from_millis(200));
    let backend = FtpBackend::new(config);

    let mut stream = backend.retrieve_file("/huge.bin").await.unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;

    let mut received = 0;
    let mut failure = None;
    while let Some(chunk) = stream.next().await {
        match chunk {
            Ok(bytes) => received += bytes.len(),
            Err(e) => {
                failure = Some(e);
                break;
            }
        }
    }
    assert!(received < 8 * 1024 * 1024);
    assert!(matches!(failure, Some(BackendError::Disconnected(_))));
}

#[test_log::test(tokio::test)]
async fn test_control_characters_never_reach_the_server() {
    let server = MockFtpServer::start(sample_tree()).await.unwrap();
    let backend = connected_backend(&server).await;

    let err = backend.retrieve_file("/x/a.txt\r\nDELE /x/a.txt").await.err().unwrap();
    assert!(matches!(err, BackendError::Protocol(_)));
    let err = backend.list_directory("/x/\nDELE /x/a.txt").await.unwrap_err();
    assert!(matches!(err, BackendError::Protocol(_)));
    let err = backend.list_directory("/x/\0").await.unwrap_err();
    assert!(matches!(err, BackendError::Protocol(_)));

    assert!(!server.commands().iter().any(|c| c.contains("DELE")));
    assert_eq!(server.session_count(), 1);
    assert!(backend.is_alive().await);
}

#[test_log::test(tokio::test)]
async fn test_reconnects_after_backend_drops_session() {
    let server = MockFtpServer::start(sample_tree()).await.unwrap();
    let backend = connected_backend(&server).await;
    assert!(backend.is_alive().await);

    server.kill_sessions();
    tokio::time::sleep(Duration::from_millis(50)).await;

    backend.ensure_connected().await.unwrap();
    assert_eq!(server.session_count(), 2);
    assert_eq!(backend.connect_count(), 2);
    assert!(!backend.list_directory("/x/").await.unwrap().is_empty());
}

#[test_log::test(tokio::test)]
async fn test_connect_timeout_then_recovery() {
    let server = MockFtpServer::start(sample_tree()).await.unwrap();
    server.set_greeting_delay(Duration::from_secs(10));
    let backend = FtpBackend::new(config_for(&server));

    let err = backend.ensure_connected().await.unwrap_err();
    assert!(err.is_connect_timeout(), "unexpected error: {err}");
    assert!(!backend.is_alive().await);
    assert!(matches!(
        backend.list_directory("/").await,
        Err(BackendError::NotConnected)
    ));

    server.set_greeting_delay(Duration::ZERO);
    backend.ensure_connected().await.unwrap();
    assert!(backend.is_alive().await);
}

#[test_log::test(tokio::test)]
async fn test_retrieve_into_sink() {
    let server = MockFtpServer::start(sample_tree()).await.unwrap();
    let backend = connected_backend(&server).await;

    let mut sink = Vec::new();
    let written = retrieve_into(&backend, "/files/big.bin", &mut sink).await.unwrap();
    assert_eq!(written as usize, DEFAULT_CHUNK_SIZE * 3 + 17);
    assert_eq!(sink, patterned(DEFAULT_CHUNK_SIZE * 3 + 17));
}

#[test_log::test(tokio::test)]
async fn test_raw_entries_pass_through() {
    let mut tree = sample_tree();
    tree.add_entry("/x", DirEntry::new("..", EntryKind::ParentDirectory));
    tree.add_entry("/x", DirEntry::new("link", EntryKind::Other("OS.unix=symlink".into())));
    let server = MockFtpServer::start(tree).await.unwrap();
    let backend = connected_backend(&server).await;

    let entries = backend.list_directory("/x").await.unwrap();
    let last_two: Vec<_> = entries.iter().rev().take(2).map(|e| e.kind.clone()).collect();
    assert_eq!(
        last_two,
        vec![
            EntryKind::Other("OS.unix=symlink".into()),
            EntryKind::ParentDirectory
        ]
    );
}

#[test_log::test(tokio::test)]
async fn test_disconnect_sends_quit() {
    let server = MockFtpServer::start(sample_tree()).await.unwrap();
    let backend = connected_backend(&server).await;

    backend.disconnect().await;
    assert!(!backend.is_alive().await);
    assert_eq!(server.commands().last().map(String::as_str), Some("QUIT"));

    // Disconnecting twice is harmless
    backend.disconnect().await;
}
