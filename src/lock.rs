//! Cross-process advisory file lock.
//!
//! `FileLock` wraps `flock(2)` on a dedicated lock file. It serializes access
//! to the metrics database between the sampler daemon and any reader process:
//! every process opens its own `FileLock` on the same path, and the kernel
//! arbitrates between the open file descriptions.
//!
//! A `FileLock` is not reentrant. Acquiring twice through the same value
//! without a release is a programming error (`LockError::AlreadyLocked`),
//! while contention between different values (or processes) simply blocks.

use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::warn;

/// Errors returned by [`FileLock`].
#[derive(Debug, Error)]
pub enum LockError {
    /// `acquire` was called on a handle that already holds the lock.
    #[error("lock {} is already held by this handle", .0.display())]
    AlreadyLocked(PathBuf),
    /// `release` was called on a handle that does not hold the lock.
    #[error("lock {} is not held by this handle", .0.display())]
    NotLocked(PathBuf),
    /// Opening the lock file or the `flock` call itself failed.
    #[error("lock file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Exclusive advisory lock keyed by a lock-file path.
///
/// The file handle is opened once in [`FileLock::open`] and closed when the
/// value is dropped, which also drops any lock still held. The lock file is
/// never written to and never removed.
#[derive(Debug)]
pub struct FileLock {
    path: PathBuf,
    file: File,
    locked: bool,
}

impl FileLock {
    /// Opens (creating if needed) the lock file at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, LockError> {
        let path = path.into();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|source| LockError::Io {
                path: path.clone(),
                source,
            })?;

        Ok(Self {
            path,
            file,
            locked: false,
        })
    }

    /// Path of the lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns `true` while this handle holds the lock.
    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Blocks until the exclusive lock is obtained.
    pub fn acquire(&mut self) -> Result<(), LockError> {
        if self.locked {
            return Err(LockError::AlreadyLocked(self.path.clone()));
        }

        flock(&self.file, libc::LOCK_EX).map_err(|source| LockError::Io {
            path: self.path.clone(),
            source,
        })?;
        self.locked = true;
        Ok(())
    }

    /// Tries to obtain the lock without blocking.
    ///
    /// Returns `Ok(false)` if another handle currently holds it.
    pub fn try_acquire(&mut self) -> Result<bool, LockError> {
        if self.locked {
            return Err(LockError::AlreadyLocked(self.path.clone()));
        }

        match flock(&self.file, libc::LOCK_EX | libc::LOCK_NB) {
            Ok(()) => {
                self.locked = true;
                Ok(true)
            }
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => Ok(false),
            Err(source) => Err(LockError::Io {
                path: self.path.clone(),
                source,
            }),
        }
    }

    /// Releases the lock.
    pub fn release(&mut self) -> Result<(), LockError> {
        if !self.locked {
            return Err(LockError::NotLocked(self.path.clone()));
        }

        flock(&self.file, libc::LOCK_UN).map_err(|source| LockError::Io {
            path: self.path.clone(),
            source,
        })?;
        self.locked = false;
        Ok(())
    }

    /// Acquires the lock for the lifetime of the returned guard.
    pub fn lock(&mut self) -> Result<FileLockGuard<'_>, LockError> {
        self.acquire()?;
        Ok(FileLockGuard { lock: self })
    }
}

/// Scoped acquisition of a [`FileLock`]; releases on drop.
#[derive(Debug)]
pub struct FileLockGuard<'a> {
    lock: &'a mut FileLock,
}

impl Drop for FileLockGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.lock.release() {
            warn!("Failed to release {}: {}", self.lock.path.display(), e);
        }
    }
}

/// Calls `flock(2)` on `file`, retrying when interrupted by a signal.
fn flock(file: &File, operation: libc::c_int) -> io::Result<()> {
    let fd = file.as_raw_fd();
    loop {
        // SAFETY: `fd` is a valid descriptor owned by `file`, which outlives
        // this call. flock does not touch process memory.
        let rc = unsafe { libc::flock(fd, operation) };
        if rc == 0 {
            return Ok(());
        }
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::Interrupted {
            return Err(err);
        }
    }
}
