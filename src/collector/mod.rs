//! Host metrics collection.
//!
//! The sampler depends only on the [`MetricsProvider`] trait. The production
//! implementation, [`ProcfsMetrics`], reads `/proc/stat` and `/proc/meminfo`
//! and asks `statvfs` for disk usage, all through the [`FileSystem`] trait so
//! tests can substitute [`MockFs`].
//!
//! ```
//! use std::path::Path;
//! use hoststat::collector::{MetricsProvider, MockFs, ProcfsMetrics};
//!
//! let fs = MockFs::typical_host();
//! let mut metrics = ProcfsMetrics::new(fs, "/proc");
//! assert!(metrics.memory_used_bytes().unwrap() > 0);
//! assert!(metrics.disk_used_bytes(Path::new("/")).unwrap() > 0);
//! ```

pub mod mock;
pub mod parser;
pub mod traits;

pub use mock::MockFs;
pub use parser::{CpuTimes, MemInfo, ParseError};
pub use traits::{FileSystem, FsUsage, RealFs};

use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::store::Sample;

/// Failure to obtain a metric value.
#[derive(Debug, Error)]
pub enum CollectError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// Source of instantaneous host metrics.
pub trait MetricsProvider: Send {
    /// CPU busy percentage since the previous call (or since creation).
    fn cpu_percent(&mut self) -> Result<f64, CollectError>;

    /// Memory in use, in bytes.
    fn memory_used_bytes(&mut self) -> Result<u64, CollectError>;

    /// Used bytes on the filesystem mounted at `path`.
    fn disk_used_bytes(&mut self, path: &Path) -> Result<u64, CollectError>;
}

/// Captures one sample from `provider`.
///
/// Fails as a whole if any of the three values cannot be read.
pub fn capture_sample<P: MetricsProvider + ?Sized>(
    provider: &mut P,
    disk_path: &Path,
    at: DateTime<Utc>,
) -> Result<Sample, CollectError> {
    let cpu_usage_percent = provider.cpu_percent()?;
    let mem_usage_bytes = provider.memory_used_bytes()?;
    let disk_usage_bytes = provider.disk_used_bytes(disk_path)?;

    Ok(Sample {
        taken_at: at,
        cpu_usage_percent,
        mem_usage_bytes,
        disk_usage_bytes,
    })
}

/// [`MetricsProvider`] backed by procfs and `statvfs`.
pub struct ProcfsMetrics<F: FileSystem> {
    fs: F,
    proc_path: PathBuf,
    /// Counters from the previous `cpu_percent` call.
    last_cpu: Option<CpuTimes>,
}

impl<F: FileSystem> ProcfsMetrics<F> {
    /// Creates a provider reading from `proc_path` (usually `/proc`).
    ///
    /// Takes a CPU counter baseline right away so the first
    /// `cpu_percent` covers the time since construction.
    pub fn new(fs: F, proc_path: impl Into<PathBuf>) -> Self {
        let mut metrics = Self {
            fs,
            proc_path: proc_path.into(),
            last_cpu: None,
        };
        metrics.last_cpu = metrics.read_cpu_times().ok();
        metrics
    }

    /// Total physical memory, in bytes.
    pub fn memory_total_bytes(&self) -> Result<u64, CollectError> {
        Ok(self.read_meminfo()?.total_bytes())
    }

    /// Size of the filesystem mounted at `path`, in bytes.
    pub fn disk_total_bytes(&self, path: &Path) -> Result<u64, CollectError> {
        Ok(self.read_fs_usage(path)?.total_bytes)
    }

    fn read(&self, name: &str) -> Result<String, CollectError> {
        let path = self.proc_path.join(name);
        self.fs
            .read_to_string(&path)
            .map_err(|source| CollectError::Io { path, source })
    }

    fn read_cpu_times(&self) -> Result<CpuTimes, CollectError> {
        Ok(parser::parse_cpu_times(&self.read("stat")?)?)
    }

    fn read_meminfo(&self) -> Result<MemInfo, CollectError> {
        Ok(parser::parse_meminfo(&self.read("meminfo")?)?)
    }

    fn read_fs_usage(&self, path: &Path) -> Result<FsUsage, CollectError> {
        self.fs.fs_usage(path).map_err(|source| CollectError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

impl<F: FileSystem> MetricsProvider for ProcfsMetrics<F> {
    fn cpu_percent(&mut self) -> Result<f64, CollectError> {
        let current = self.read_cpu_times()?;
        let baseline = self.last_cpu.unwrap_or_default();
        self.last_cpu = Some(current);
        Ok(current.busy_percent_since(&baseline))
    }

    fn memory_used_bytes(&mut self) -> Result<u64, CollectError> {
        Ok(self.read_meminfo()?.used_bytes())
    }

    fn disk_used_bytes(&mut self, path: &Path) -> Result<u64, CollectError> {
        Ok(self.read_fs_usage(path)?.used_bytes())
    }
}
