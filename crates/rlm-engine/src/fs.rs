//! Virtual filesystem abstraction for testability.
//!
//! This module provides a `FileSystem` trait that abstracts filesystem
//! operations, allowing `CodeSource` to be tested against an in-memory
//! filesystem instead of real files.

use async_trait::async_trait;
use std::collections::HashMap;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

/// Abstraction over filesystem operations for testability.
#[async_trait]
pub trait FileSystem: Send + Sync {
    /// Read file contents as a string.
    async fn read_file(&self, path: &Path) -> io::Result<String>;

    /// Write content to a file.
    async fn write_file(&self, path: &Path, content: &str) -> io::Result<()>;

    /// List directory contents.
    async fn list_dir(&self, path: &Path) -> io::Result<Vec<DirEntry>>;

    /// Check if path exists.
    async fn exists(&self, path: &Path) -> bool;

    /// Check if path is a directory.
    async fn is_dir(&self, path: &Path) -> bool;

    /// Check if path is a file.
    async fn is_file(&self, path: &Path) -> bool;

    /// Get file metadata.
    async fn metadata(&self, path: &Path) -> io::Result<FileMetadata>;

    /// Canonicalize a path.
    async fn canonicalize(&self, path: &Path) -> io::Result<PathBuf>;
}

/// Directory entry information.
#[derive(Debug, Clone)]
pub struct DirEntry {
    /// The full path to the entry.
    pub path: PathBuf,
    /// The file name.
    pub name: String,
    /// Whether this is a directory.
    pub is_dir: bool,
}

/// File metadata.
#[derive(Debug, Clone)]
pub struct FileMetadata {
    /// File size in bytes.
    pub len: u64,
    /// Whether this is a directory.
    pub is_dir: bool,
    /// Whether this is a file.
    pub is_file: bool,
}

/// Real filesystem implementation using tokio::fs.
#[derive(Debug, Clone, Default)]
pub struct RealFileSystem;

impl RealFileSystem {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl FileSystem for RealFileSystem {
    async fn read_file(&self, path: &Path) -> io::Result<String> {
        tokio::fs::read_to_string(path).await
    }

    async fn write_file(&self, path: &Path, content: &str) -> io::Result<()> {
        tokio::fs::write(path, content).await
    }

    async fn list_dir(&self, path: &Path) -> io::Result<Vec<DirEntry>> {
        let mut entries = Vec::new();
        let mut read_dir = tokio::fs::read_dir(path).await?;

        while let Some(entry) = read_dir.next_entry().await? {
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().to_string();
            let file_type = entry.file_type().await?;

            entries.push(DirEntry {
                path,
                name,
                is_dir: file_type.is_dir(),
            });
        }

        Ok(entries)
    }

    async fn exists(&self, path: &Path) -> bool {
        tokio::fs::try_exists(path).await.unwrap_or(false)
    }

    async fn is_dir(&self, path: &Path) -> bool {
        tokio::fs::metadata(path)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
    }

    async fn is_file(&self, path: &Path) -> bool {
        tokio::fs::metadata(path)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false)
    }

    async fn metadata(&self, path: &Path) -> io::Result<FileMetadata> {
        let meta = tokio::fs::metadata(path).await?;
        Ok(FileMetadata {
            len: meta.len(),
            is_dir: meta.is_dir(),
            is_file: meta.is_file(),
        })
    }

    async fn canonicalize(&self, path: &Path) -> io::Result<PathBuf> {
        tokio::fs::canonicalize(path).await
    }
}

/// Mock filesystem for testing.
///
/// Stores files in memory and tracks write operations for verification.
#[derive(Debug, Clone)]
pub struct MockFileSystem {
    files: Arc<RwLock<HashMap<PathBuf, Vec<u8>>>>,
    directories: Arc<RwLock<HashMap<PathBuf, ()>>>,
    written_files: Arc<RwLock<HashMap<PathBuf, Vec<u8>>>>,
}

impl Default for MockFileSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl MockFileSystem {
    pub fn new() -> Self {
        Self {
            files: Arc::new(RwLock::new(HashMap::new())),
            directories: Arc::new(RwLock::new(HashMap::new())),
            written_files: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Add a file with string content.
    pub fn with_file(self, path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        let path = path.into();
        let content = content.into();

        if let Some(parent) = path.parent() {
            self.ensure_parent_dirs(parent);
        }

        self.files
            .write()
            .unwrap()
            .insert(path, content.into_bytes());
        self
    }

    /// Add multiple files at once.
    pub fn with_files(
        mut self,
        files: impl IntoIterator<Item = (impl Into<PathBuf>, impl Into<String>)>,
    ) -> Self {
        for (path, content) in files {
            self = self.with_file(path, content);
        }
        self
    }

    /// Add a directory.
    pub fn with_directory(self, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        self.ensure_parent_dirs(&path);
        self.directories.write().unwrap().insert(path, ());
        self
    }

    /// Get all files that were written during the test.
    pub fn get_written_files(&self) -> HashMap<PathBuf, String> {
        self.written_files
            .read()
            .unwrap()
            .iter()
            .filter_map(|(k, v)| String::from_utf8(v.clone()).ok().map(|s| (k.clone(), s)))
            .collect()
    }

    /// Check if a file was written.
    pub fn was_file_written(&self, path: &Path) -> bool {
        self.written_files.read().unwrap().contains_key(path)
    }

    fn ensure_parent_dirs(&self, path: &Path) {
        let mut current = path.to_path_buf();
        let mut dirs_to_add = Vec::new();

        while current.parent().is_some() {
            dirs_to_add.push(current.clone());
            current = current.parent().unwrap().to_path_buf();
            if current.as_os_str().is_empty() {
                break;
            }
        }

        let mut directories = self.directories.write().unwrap();
        for dir in dirs_to_add {
            directories.insert(dir, ());
        }
    }

    fn normalize_path(&self, path: &Path) -> PathBuf {
        let mut components = Vec::new();
        for component in path.components() {
            match component {
                std::path::Component::CurDir => {}
                std::path::Component::ParentDir => {
                    components.pop();
                }
                _ => components.push(component),
            }
        }
        components.iter().collect()
    }
}

#[async_trait]
impl FileSystem for MockFileSystem {
    async fn read_file(&self, path: &Path) -> io::Result<String> {
        let normalized = self.normalize_path(path);
        self.files
            .read()
            .unwrap()
            .get(&normalized)
            .map(|bytes| String::from_utf8_lossy(bytes).to_string())
            .ok_or_else(|| {
                io::Error::new(ErrorKind::NotFound, format!("File not found: {:?}", path))
            })
    }

    async fn write_file(&self, path: &Path, content: &str) -> io::Result<()> {
        let normalized = self.normalize_path(path);
        let bytes = content.as_bytes().to_vec();

        self.files
            .write()
            .unwrap()
            .insert(normalized.clone(), bytes.clone());
        self.written_files
            .write()
            .unwrap()
            .insert(normalized, bytes);

        Ok(())
    }

    async fn list_dir(&self, path: &Path) -> io::Result<Vec<DirEntry>> {
        let normalized = self.normalize_path(path);

        if !self.is_dir(&normalized).await {
            return Err(io::Error::new(
                ErrorKind::NotFound,
                format!("Directory not found: {:?}", path),
            ));
        }

        let files = self.files.read().unwrap();
        let directories = self.directories.read().unwrap();

        let mut entries = Vec::new();
        let mut seen = std::collections::HashSet::new();

        for file_path in files.keys() {
            if let Some(parent) = file_path.parent() {
                if parent == normalized {
                    let name = file_path.file_name().unwrap().to_string_lossy().to_string();
                    if seen.insert(name.clone()) {
                        entries.push(DirEntry {
                            path: file_path.clone(),
                            name,
                            is_dir: false,
                        });
                    }
                }
            }
        }

        for dir_path in directories.keys() {
            if let Some(parent) = dir_path.parent() {
                if parent == normalized && dir_path != &normalized {
                    let name = dir_path.file_name().unwrap().to_string_lossy().to_string();
                    if seen.insert(name.clone()) {
                        entries.push(DirEntry {
                            path: dir_path.clone(),
                            name,
                            is_dir: true,
                        });
                    }
                }
            }
        }

        Ok(entries)
    }

    async fn exists(&self, path: &Path) -> bool {
        let normalized = self.normalize_path(path);
        self.files.read().unwrap().contains_key(&normalized)
            || self.directories.read().unwrap().contains_key(&normalized)
    }

    async fn is_dir(&self, path: &Path) -> bool {
        let normalized = self.normalize_path(path);
        self.directories.read().unwrap().contains_key(&normalized)
    }

    async fn is_file(&self, path: &Path) -> bool {
        let normalized = self.normalize_path(path);
        self.files.read().unwrap().contains_key(&normalized)
    }

    async fn metadata(&self, path: &Path) -> io::Result<FileMetadata> {
        let normalized = self.normalize_path(path);

        if let Some(bytes) = self.files.read().unwrap().get(&normalized) {
            return Ok(FileMetadata {
                len: bytes.len() as u64,
                is_dir: false,
                is_file: true,
            });
        }

        if self.directories.read().unwrap().contains_key(&normalized) {
            return Ok(FileMetadata {
                len: 0,
                is_dir: true,
                is_file: false,
            });
        }

        Err(io::Error::new(
            ErrorKind::NotFound,
            format!("Path not found: {:?}", path),
        ))
    }

    async fn canonicalize(&self, path: &Path) -> io::Result<PathBuf> {
        let normalized = self.normalize_path(path);

        if self.exists(&normalized).await {
            Ok(normalized)
        } else {
            Err(io::Error::new(
                ErrorKind::NotFound,
                format!("Path not found: {:?}", path),
            ))
        }
    }
}

/// Shared filesystem reference.
pub type SharedFileSystem = Arc<dyn FileSystem>;
