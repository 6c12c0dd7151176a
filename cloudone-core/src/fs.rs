//! Pluggable file system used by services implemented directly in CloudOne

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use std::io;
use std::path::{Path, PathBuf};

/// A directory listing entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub is_dir: bool,
}

/// Abstract file system backend
///
/// Writes are plain create-and-write operations; no backend promises atomic
/// replacement.
#[async_trait]
pub trait FileSystem: Send + Sync {
    /// Create a directory and all missing parents
    async fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    /// Read a whole file
    async fn read(&self, path: &Path) -> io::Result<Bytes>;

    /// Create or truncate a file and write `data` to it
    async fn write(&self, path: &Path, data: &[u8]) -> io::Result<()>;

    /// Check whether a file or directory exists
    async fn exists(&self, path: &Path) -> io::Result<bool>;

    /// List the direct children of a directory
    async fn read_dir(&self, path: &Path) -> io::Result<Vec<DirEntry>>;
}

/// Backend for the real operating system file system
#[derive(Debug, Default, Clone, Copy)]
pub struct OsFileSystem;

#[async_trait]
impl FileSystem for OsFileSystem {
    async fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        tokio::fs::create_dir_all(path).await
    }

    async fn read(&self, path: &Path) -> io::Result<Bytes> {
        tokio::fs::read(path).await.map(Bytes::from)
    }

    async fn write(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        tokio::fs::write(path, data).await
    }

    async fn exists(&self, path: &Path) -> io::Result<bool> {
        tokio::fs::try_exists(path).await
    }

    async fn read_dir(&self, path: &Path) -> io::Result<Vec<DirEntry>> {
        let mut entries = Vec::new();
        let mut dir = tokio::fs::read_dir(path).await?;
        while let Some(entry) = dir.next_entry().await? {
            entries.push(DirEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                is_dir: entry.file_type().await?.is_dir(),
            });
        }
        Ok(entries)
    }
}

#[derive(Debug, Clone)]
enum Node {
    Dir,
    File(Bytes),
}

/// In-memory file system, nothing is persisted across restarts
#[derive(Debug, Default)]
pub struct MemoryFileSystem {
    nodes: DashMap<PathBuf, Node>,
}

impl MemoryFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    fn parent_exists(&self, path: &Path) -> bool {
        match path.parent() {
            None => true,
            Some(parent) if parent.as_os_str().is_empty() => true,
            Some(parent) => matches!(self.nodes.get(parent).as_deref(), Some(Node::Dir)),
        }
    }
}

fn not_found(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotFound,
        format!("{}: no such file or directory", path.display()),
    )
}

#[async_trait]
impl FileSystem for MemoryFileSystem {
    async fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        for ancestor in path.ancestors() {
            if ancestor.as_os_str().is_empty() {
                continue;
            }
            if let Some(Node::File(_)) = self.nodes.get(ancestor).as_deref() {
                return Err(io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    format!("{} is a file", ancestor.display()),
                ));
            }
            self.nodes.entry(ancestor.to_path_buf()).or_insert(Node::Dir);
        }
        Ok(())
    }

    async fn read(&self, path: &Path) -> io::Result<Bytes> {
        match self.nodes.get(path).as_deref() {
            Some(Node::File(data)) => Ok(data.clone()),
            Some(Node::Dir) => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is a directory", path.display()),
            )),
            None => Err(not_found(path)),
        }
    }

    async fn write(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        if !self.parent_exists(path) {
            return Err(not_found(path));
        }
        if let Some(Node::Dir) = self.nodes.get(path).as_deref() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is a directory", path.display()),
            ));
        }
        self.nodes
            .insert(path.to_path_buf(), Node::File(Bytes::copy_from_slice(data)));
        Ok(())
    }

    async fn exists(&self, path: &Path) -> io::Result<bool> {
        Ok(self.nodes.contains_key(path))
    }

    async fn read_dir(&self, path: &Path) -> io::Result<Vec<DirEntry>> {
        if !matches!(self.nodes.get(path).as_deref(), Some(Node::Dir)) {
            return Err(not_found(path));
        }
        Ok(self
            .nodes
            .iter()
            .filter(|node| node.key().parent() == Some(path))
            .filter_map(|node| {
                let name = node.key().file_name()?.to_string_lossy().into_owned();
                Some(DirEntry {
                    name,
                    is_dir: matches!(node.value(), Node::Dir),
                })
            })
            .collect())
    }
}
