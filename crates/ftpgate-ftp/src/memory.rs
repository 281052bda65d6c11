//! In-memory backend for testing and development

use crate::{BackendError, ByteStream, DEFAULT_CHUNK_SIZE, DirEntry, EntryKind, FileBackend, Result};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Normalize a backend path: leading `/`, no trailing `/` except for root
pub fn normalize_path(path: &str) -> String {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", trimmed)
    }
}

fn split_parent(path: &str) -> (String, &str) {
    let path = path.trim_end_matches('/');
    match path.rfind('/') {
        Some(pos) => (normalize_path(&path[..pos]), &path[pos + 1..]),
        None => ("/".to_string(), path),
    }
}

/// An ordered directory tree with file contents
#[derive(Clone, Debug)]
pub struct MemoryTree {
    dirs: HashMap<String, Vec<DirEntry>>,
    files: HashMap<String, Bytes>,
}

impl Default for MemoryTree {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTree {
    /// Create a tree holding only the root directory
    pub fn new() -> Self {
        let mut dirs = HashMap::new();
        dirs.insert("/".to_string(), Vec::new());
        Self {
            dirs,
            files: HashMap::new(),
        }
    }

    /// Create a directory and any missing parents
    pub fn add_dir(&mut self, path: &str) {
        let path = normalize_path(path);
        if self.dirs.contains_key(&path) {
            return;
        }
        let (parent, name) = split_parent(&path);
        let name = name.to_string();
        self.add_dir(&parent);
        self.dirs.insert(path, Vec::new());
        self.add_entry(&parent, DirEntry::dir(name));
    }

    /// Create or replace a file, creating missing parent directories
    pub fn add_file(&mut self, path: &str, data: impl Into<Bytes>) {
        let path = normalize_path(path);
        let data = data.into();
        let (parent, name) = split_parent(&path);
        let mut entry = DirEntry::file(name);
        entry.size = Some(data.len() as u64);
        self.add_dir(&parent);
        self.add_entry(&parent, entry);
        self.files.insert(path, data);
    }

    /// Append a raw listing entry to a directory, replacing one of the same name.
    ///
    /// Useful for entries a real server would report but the tree cannot
    /// model, such as `pdir` markers or odd types.
    pub fn add_entry(&mut self, dir: &str, entry: DirEntry) {
        let entries = self.dirs.entry(normalize_path(dir)).or_default();
        match entries.iter_mut().find(|e| e.name == entry.name) {
            Some(existing) => *existing = entry,
            None => entries.push(entry),
        }
    }

    /// Listing of a directory, led by its `cdir` marker like MLSD output
    pub fn list(&self, path: &str) -> Option<Vec<DirEntry>> {
        let path = normalize_path(path);
        let children = self.dirs.get(&path)?;
        let mut entries = Vec::with_capacity(children.len() + 1);
        entries.push(DirEntry::new(path, EntryKind::CurrentDirectory));
        entries.extend(children.iter().cloned());
        Some(entries)
    }

    /// Contents of a file
    pub fn file(&self, path: &str) -> Option<Bytes> {
        self.files.get(&normalize_path(path)).cloned()
    }
}

/// A backend serving a `MemoryTree`, with a switch to simulate outages
#[derive(Clone)]
pub struct MemoryBackend {
    tree: Arc<RwLock<MemoryTree>>,
    online: Arc<AtomicBool>,
    connected: Arc<AtomicBool>,
    connects: Arc<AtomicU64>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    /// Create an online backend with an empty tree
    pub fn new() -> Self {
        Self::with_tree(MemoryTree::new())
    }

    /// Create an online backend serving `tree`
    pub fn with_tree(tree: MemoryTree) -> Self {
        Self {
            tree: Arc::new(RwLock::new(tree)),
            online: Arc::new(AtomicBool::new(true)),
            connected: Arc::new(AtomicBool::new(false)),
            connects: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Mutable access to the served tree
    pub fn tree(&self) -> parking_lot::RwLockWriteGuard<'_, MemoryTree> {
        self.tree.write()
    }

    /// Take the backend offline (dropping the session) or bring it back
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
        if !online {
            self.connected.store(false, Ordering::SeqCst);
        }
    }

    /// Number of successful connects so far
    pub fn connect_count(&self) -> u64 {
        self.connects.load(Ordering::SeqCst)
    }

    fn check_session(&self) -> Result<()> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(BackendError::NotConnected)
        }
    }
}

#[async_trait]
impl FileBackend for MemoryBackend {
    fn backend_name(&self) -> String {
        "memory".to_string()
    }

    async fn is_alive(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn ensure_connected(&self) -> Result<()> {
        if self.connected.load(Ordering::SeqCst) {
            return Ok(());
        }
        if !self.online.load(Ordering::SeqCst) {
            return Err(BackendError::ConnectTimeout {
                addr: self.backend_name(),
                millis: 0,
            });
        }
        self.connected.store(true, Ordering::SeqCst);
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn list_directory(&self, path: &str) -> Result<Vec<DirEntry>> {
        self.check_session()?;
        self.tree
            .read()
            .list(path)
            .ok_or_else(|| BackendError::NotFound(path.to_string()))
    }

    async fn retrieve_file(&self, path: &str) -> Result<ByteStream> {
        self.check_session()?;
        let data = self
            .tree
            .read()
            .file(path)
            .ok_or_else(|| BackendError::NotFound(path.to_string()))?;

        let chunks: Vec<Result<Bytes>> = (0..data.len())
            .step_by(DEFAULT_CHUNK_SIZE)
            .map(|start| Ok(data.slice(start..(start + DEFAULT_CHUNK_SIZE).min(data.len()))))
            .collect();
        Ok(Box::pin(futures::stream::iter(chunks)))
    }

    async fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;

    fn sample_tree() -> MemoryTree {
        let mut tree = MemoryTree::new();
        tree.add_file("/x/a.txt", "hello");
        tree.add_dir("/x/sub");
        tree
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path(""), "/");
        assert_eq!(normalize_path("/"), "/");
        assert_eq!(normalize_path("x/"), "/x");
        assert_eq!(normalize_path("/x/y/"), "/x/y");
    }

    #[test]
    fn test_tree_listing_order() {
        let tree = sample_tree();
        let root: Vec<_> = tree.list("/").unwrap().into_iter().map(|e| e.name).collect();
        assert_eq!(root, vec!["/", "x"]);

        let x = tree.list("/x/").unwrap();
        assert_eq!(x[0].kind, EntryKind::CurrentDirectory);
        assert_eq!(x[1].name, "a.txt");
        assert_eq!(x[1].size, Some(5));
        assert_eq!(x[2], DirEntry::dir("sub"));
        assert!(tree.list("/nope").is_none());
    }

    #[test]
    fn test_replacing_file_keeps_position() {
        let mut tree = sample_tree();
        tree.add_file("/x/a.txt", "longer contents");
        let x = tree.list("/x").unwrap();
        assert_eq!(x.len(), 3);
        assert_eq!(x[1].size, Some(15));
        assert_eq!(tree.file("/x/a.txt").unwrap(), Bytes::from("longer contents"));
    }

    #[tokio::test]
    async fn test_requires_connect() {
        let backend = MemoryBackend::with_tree(sample_tree());
        assert!(!backend.is_alive().await);
        assert!(matches!(
            backend.list_directory("/x").await,
            Err(BackendError::NotConnected)
        ));

        backend.ensure_connected().await.unwrap();
        backend.ensure_connected().await.unwrap();
        assert_eq!(backend.connect_count(), 1);
        assert_eq!(backend.list_directory("/x").await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_offline_connect_times_out() {
        let backend = MemoryBackend::new();
        backend.ensure_connected().await.unwrap();
        backend.set_online(false);

        assert!(!backend.is_alive().await);
        let err = backend.ensure_connected().await.unwrap_err();
        assert!(err.is_connect_timeout());

        backend.set_online(true);
        backend.ensure_connected().await.unwrap();
        assert_eq!(backend.connect_count(), 2);
    }

    #[tokio::test]
    async fn test_retrieve_chunks() {
        let backend = MemoryBackend::new();
        let big = vec![7u8; DEFAULT_CHUNK_SIZE * 2 + 1];
        backend.tree().add_file("/big.bin", big.clone());
        backend.tree().add_file("/empty", Bytes::new());
        backend.ensure_connected().await.unwrap();

        let chunks: Vec<Bytes> = backend.retrieve_file("/big.bin").await.unwrap().try_collect().await.unwrap();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks.concat(), big);

        let empty: Vec<Bytes> = backend.retrieve_file("/empty").await.unwrap().try_collect().await.unwrap();
        assert!(empty.is_empty());

        assert!(matches!(
            backend.retrieve_file("/missing").await,
            Err(BackendError::NotFound(_))
        ));
    }
}
