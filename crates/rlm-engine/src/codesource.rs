//! CodeSource — the corpus the sandbox and navigation tools may see.
//!
//! A path-confined, immutable-for-the-session view over a `FileSystem`.
//! Every path is validated against a configured `root` before admission:
//! it must resolve to a real location inside `root` (even through
//! symlinks), and file reads are bounded by `max_file_bytes` so the core
//! never reads past the cap before rejecting an oversize file.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{Result, RlmError};
use crate::fs::{FileSystem, RealFileSystem, SharedFileSystem};

/// Path-confined view over a code corpus.
pub struct CodeSource {
    fs: SharedFileSystem,
    root: PathBuf,
    max_file_bytes: u64,
}

impl CodeSource {
    /// Construct a `CodeSource` rooted at `root` using the real filesystem.
    pub fn new(root: impl Into<PathBuf>, max_file_bytes: u64) -> Self {
        Self {
            fs: Arc::new(RealFileSystem::new()),
            root: root.into(),
            max_file_bytes,
        }
    }

    /// Construct with a custom filesystem (for tests).
    pub fn with_fs(root: impl Into<PathBuf>, max_file_bytes: u64, fs: SharedFileSystem) -> Self {
        Self {
            fs,
            root: root.into(),
            max_file_bytes,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn max_file_bytes(&self) -> u64 {
        self.max_file_bytes
    }

    /// Resolve and confine a path argument to this source's `root`.
    ///
    /// Absolute paths, `..` traversal, and symlink escapes are all rejected
    /// with `PathDenied` rather than an exception, matching the path-policy
    /// contract every nav tool and the file-loading path of `rlm_run` must
    /// honor.
    pub async fn confine(&self, requested: &str) -> Result<PathBuf> {
        let requested_path = Path::new(requested);

        let full_path = if requested_path.is_absolute() {
            requested_path.to_path_buf()
        } else {
            self.root.join(requested_path)
        };

        let root_canonical = self
            .fs
            .canonicalize(&self.root)
            .await
            .map_err(|e| RlmError::Internal(format!("cannot resolve root: {}", e)))?;

        if let Ok(canonical) = self.fs.canonicalize(&full_path).await {
            if !canonical.starts_with(&root_canonical) {
                return Err(RlmError::PathDenied(format!(
                    "'{}' resolves outside the configured root",
                    requested
                )));
            }
            return Ok(canonical);
        }

        // Path doesn't exist yet (e.g. about to be read and fail not-found
        // downstream) — still confine via the parent directory.
        if let Some(parent) = full_path.parent() {
            if let Ok(parent_canonical) = self.fs.canonicalize(parent).await {
                if !parent_canonical.starts_with(&root_canonical) {
                    return Err(RlmError::PathDenied(format!(
                        "'{}' resolves outside the configured root",
                        requested
                    )));
                }
            }
        }

        if requested.contains("..") {
            let normalized = full_path.components().collect::<PathBuf>();
            if !normalized.starts_with(&self.root) {
                return Err(RlmError::PathDenied(format!(
                    "'{}' contains a traversal outside the configured root",
                    requested
                )));
            }
        }

        Ok(full_path)
    }

    /// Display path relative to `root`, for reporting to the model.
    pub fn display_path(&self, absolute: &Path) -> String {
        absolute
            .strip_prefix(&self.root)
            .unwrap_or(absolute)
            .display()
            .to_string()
    }

    pub async fn exists(&self, path: &Path) -> bool {
        self.fs.exists(path).await
    }

    pub async fn is_dir(&self, path: &Path) -> bool {
        self.fs.is_dir(path).await
    }

    pub async fn is_file(&self, path: &Path) -> bool {
        self.fs.is_file(path).await
    }

    pub async fn list_dir(&self, path: &Path) -> Result<Vec<crate::fs::DirEntry>> {
        self.fs
            .list_dir(path)
            .await
            .map_err(|e| RlmError::Internal(format!("cannot list directory: {}", e)))
    }

    /// Read a file's contents, rejecting (without reading past the cap)
    /// anything over `max_file_bytes`.
    pub async fn read_file(&self, path: &Path) -> Result<String> {
        let metadata = self
            .fs
            .metadata(path)
            .await
            .map_err(|e| RlmError::Internal(format!("cannot stat file: {}", e)))?;

        if metadata.len > self.max_file_bytes {
            return Err(RlmError::FileTooLarge(format!(
                "{} is {} bytes, exceeds max_file_bytes ({})",
                path.display(),
                metadata.len,
                self.max_file_bytes
            )));
        }

        self.fs
            .read_file(path)
            .await
            .map_err(|e| RlmError::Internal(format!("cannot read file: {}", e)))
    }
}
