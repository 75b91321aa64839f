//! Pre-built mock host scenarios for testing.

use super::filesystem::MockFs;
use crate::collector::traits::FsUsage;

impl MockFs {
    /// A 16 GB host with a 100 GB root filesystem, 40 GB of it used.
    ///
    /// `/proc/stat` is the state at sampler start; use [`MockFs::advance_cpu`]
    /// to move the counters forward.
    pub fn typical_host() -> Self {
        let fs = Self::new();

        fs.add_file(
            "/proc/meminfo",
            "\
MemTotal:       16384000 kB
MemFree:         8192000 kB
MemAvailable:   12000000 kB
Buffers:          512000 kB
Cached:          2048000 kB
SwapCached:            0 kB
SwapTotal:       4096000 kB
SwapFree:        4096000 kB
",
        );
        fs.add_file(
            "/proc/stat",
            "\
cpu  10000 500 3000 80000 1000 200 100 0 0 0
cpu0 5000 250 1500 40000 500 100 50 0 0 0
cpu1 5000 250 1500 40000 500 100 50 0 0 0
ctxt 500000
btime 1700000000
",
        );
        fs.set_fs_usage(
            "/",
            FsUsage {
                total_bytes: 100 * GB,
                free_bytes: 60 * GB,
                available_bytes: 55 * GB,
            },
        );

        fs
    }

    /// Rewrites the aggregate cpu line with the given busy and idle ticks.
    pub fn advance_cpu(&self, busy: u64, idle: u64) {
        self.add_file("/proc/stat", format!("cpu  {busy} 0 0 {idle} 0 0 0 0 0 0\n"));
    }
}

const GB: u64 = 1024 * 1024 * 1024;

#[cfg(test)]
mod tests {
    use crate::collector::traits::FileSystem;
    use super::*;
    use std::path::Path;

    #[test]
    fn test_typical_host_has_required_files() {
        let fs = MockFs::typical_host();
        assert!(fs.read_to_string(Path::new("/proc/meminfo")).is_ok());
        assert!(fs.read_to_string(Path::new("/proc/stat")).is_ok());
        assert_eq!(fs.fs_usage(Path::new("/")).unwrap().used_bytes(), 40 * GB);
    }
}
