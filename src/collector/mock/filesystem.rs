//! In-memory mock filesystem.

use crate::collector::traits::{FileSystem, FsUsage};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

#[derive(Debug, Default)]
struct Inner {
    files: HashMap<PathBuf, String>,
    mounts: HashMap<PathBuf, FsUsage>,
}

/// In-memory filesystem for testing.
///
/// Clones share the same contents, so a test can keep one handle and change
/// files while a collector owns another.
#[derive(Debug, Clone, Default)]
pub struct MockFs {
    inner: Arc<RwLock<Inner>>,
}

impl MockFs {
    /// Creates a new empty mock filesystem.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a file.
    pub fn add_file(&self, path: impl AsRef<Path>, content: impl Into<String>) {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        inner
            .files
            .insert(path.as_ref().to_path_buf(), content.into());
    }

    /// Removes a file; later reads fail with `NotFound`.
    pub fn remove_file(&self, path: impl AsRef<Path>) {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        inner.files.remove(path.as_ref());
    }

    /// Sets the space usage reported for the mount at `path`.
    pub fn set_fs_usage(&self, path: impl AsRef<Path>, usage: FsUsage) {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        inner.mounts.insert(path.as_ref().to_path_buf(), usage);
    }
}

impl FileSystem for MockFs {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.files.get(path).cloned().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("file not found: {:?}", path),
            )
        })
    }

    fn fs_usage(&self, path: &Path) -> io::Result<FsUsage> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.mounts.get(path).copied().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("no mount at {:?}", path),
            )
        })
    }
}
