//! Abstractions for filesystem access to enable testing and mocking.
//!
//! The `FileSystem` trait lets the collector read `/proc` and query mount
//! usage on a real Linux host, or from an in-memory `MockFs` in tests.

use std::ffi::CString;
use std::io;
use std::mem::MaybeUninit;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

/// Space accounting for one mounted filesystem, in bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FsUsage {
    pub total_bytes: u64,
    /// Free blocks, including those reserved for root.
    pub free_bytes: u64,
    /// Free blocks available to unprivileged users.
    pub available_bytes: u64,
}

impl FsUsage {
    /// Bytes in use: total minus free (reserved blocks count as free).
    pub fn used_bytes(&self) -> u64 {
        self.total_bytes.saturating_sub(self.free_bytes)
    }
}

/// Abstraction for filesystem operations.
pub trait FileSystem: Send + Sync {
    /// Reads the entire contents of a file as a string.
    fn read_to_string(&self, path: &Path) -> io::Result<String>;

    /// Reports space usage of the filesystem mounted at `path`.
    fn fs_usage(&self, path: &Path) -> io::Result<FsUsage>;
}

/// Real filesystem implementation backed by `std::fs` and `statvfs(3)`.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealFs;

impl RealFs {
    pub fn new() -> Self {
        Self
    }
}

impl FileSystem for RealFs {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }

    #[allow(clippy::unnecessary_cast)]
    fn fs_usage(&self, path: &Path) -> io::Result<FsUsage> {
        let c_path = CString::new(path.as_os_str().as_bytes())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let mut stat = MaybeUninit::<libc::statvfs>::zeroed();

        // SAFETY: `c_path` is a valid NUL-terminated string and `stat` points
        // to writable memory of the right size for the duration of the call.
        let rc = unsafe { libc::statvfs(c_path.as_ptr(), stat.as_mut_ptr()) };
        if rc != 0 {
            return Err(io::Error::last_os_error());
        }
        // SAFETY: statvfs returned 0, so it filled the struct.
        let stat = unsafe { stat.assume_init() };

        let frsize = stat.f_frsize as u64;
        Ok(FsUsage {
            total_bytes: (stat.f_blocks as u64).saturating_mul(frsize),
            free_bytes: (stat.f_bfree as u64).saturating_mul(frsize),
            available_bytes: (stat.f_bavail as u64).saturating_mul(frsize),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn test_real_fs_read_to_string() {
        let fs = RealFs::new();
        let cargo_toml = env::current_dir().unwrap().join("Cargo.toml");
        let content = fs.read_to_string(&cargo_toml).unwrap();
        assert!(content.contains("[package]"));
    }

    #[test]
    fn test_real_fs_usage_of_current_dir() {
        let fs = RealFs::new();
        let usage = fs.fs_usage(&env::current_dir().unwrap()).unwrap();
        assert!(usage.total_bytes > 0);
        assert!(usage.free_bytes <= usage.total_bytes);
        assert!(usage.used_bytes() <= usage.total_bytes);
    }

    #[test]
    fn test_real_fs_usage_missing_path() {
        let fs = RealFs::new();
        assert!(fs.fs_usage(Path::new("/nonexistent/path/12345")).is_err());
    }

    #[test]
    fn test_used_bytes_counts_reserved_as_free() {
        let usage = FsUsage {
            total_bytes: 1000,
            free_bytes: 300,
            available_bytes: 250,
        };
        assert_eq!(usage.used_bytes(), 700);
    }
}
