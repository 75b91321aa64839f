//! Parsers for `/proc` filesystem files.
//!
//! Pure functions over file contents, testable with string inputs.

use thiserror::Error;

/// Error type for parsing failures.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("parse error: {message}")]
pub struct ParseError {
    pub message: String,
}

impl ParseError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self {
            message: msg.into(),
        }
    }
}

/// Memory figures from `/proc/meminfo`, in kB.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemInfo {
    pub mem_total: u64,
    pub mem_free: u64,
    /// Absent on kernels older than 3.14.
    pub mem_available: Option<u64>,
    pub buffers: u64,
    pub cached: u64,
}

impl MemInfo {
    /// Memory in use, in bytes: total minus what is available to new work.
    pub fn used_bytes(&self) -> u64 {
        let available = self
            .mem_available
            .unwrap_or(self.mem_free + self.buffers + self.cached);
        self.mem_total.saturating_sub(available) * 1024
    }

    pub fn total_bytes(&self) -> u64 {
        self.mem_total * 1024
    }
}

/// Parses `/proc/meminfo` content.
pub fn parse_meminfo(content: &str) -> Result<MemInfo, ParseError> {
    let mut info = MemInfo::default();
    let mut seen_total = false;

    let parse_kb = |value: &str| -> Result<u64, ParseError> {
        value
            .split_whitespace()
            .next()
            .unwrap_or("")
            .parse()
            .map_err(|_| ParseError::new(format!("invalid meminfo value '{}'", value.trim())))
    };

    for line in content.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        match key {
            "MemTotal" => {
                info.mem_total = parse_kb(value)?;
                seen_total = true;
            }
            "MemFree" => info.mem_free = parse_kb(value)?,
            "MemAvailable" => info.mem_available = Some(parse_kb(value)?),
            "Buffers" => info.buffers = parse_kb(value)?,
            "Cached" => info.cached = parse_kb(value)?,
            _ => {}
        }
    }

    if !seen_total {
        return Err(ParseError::new("missing MemTotal in meminfo"));
    }

    Ok(info)
}

/// Aggregate CPU time counters from the `cpu` line of `/proc/stat`, in ticks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuTimes {
    pub user: u64,
    pub nice: u64,
    pub system: u64,
    pub idle: u64,
    pub iowait: u64,
    pub irq: u64,
    pub softirq: u64,
    pub steal: u64,
}

impl CpuTimes {
    /// All ticks. Guest time is already part of `user`/`nice`.
    pub fn total(&self) -> u64 {
        self.user
            + self.nice
            + self.system
            + self.idle
            + self.iowait
            + self.irq
            + self.softirq
            + self.steal
    }

    /// Ticks spent not running anything (iowait counts as idle).
    pub fn idle_total(&self) -> u64 {
        self.idle + self.iowait
    }

    /// Busy share of the ticks elapsed since `earlier`, 0–100.
    pub fn busy_percent_since(&self, earlier: &CpuTimes) -> f64 {
        let total = self.total().saturating_sub(earlier.total());
        if total == 0 {
            return 0.0;
        }
        let idle = self.idle_total().saturating_sub(earlier.idle_total());
        let busy = total.saturating_sub(idle);
        (busy as f64 * 100.0 / total as f64).clamp(0.0, 100.0)
    }
}

/// Parses the aggregate `cpu` line of `/proc/stat`.
pub fn parse_cpu_times(content: &str) -> Result<CpuTimes, ParseError> {
    let line = content
        .lines()
        .find(|line| line.split_whitespace().next() == Some("cpu"))
        .ok_or_else(|| ParseError::new("missing aggregate cpu line in stat"))?;

    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() < 5 {
        return Err(ParseError::new(format!(
            "not enough fields in cpu line: expected 4+, got {}",
            parts.len() - 1
        )));
    }

    let get_val = |idx: usize| -> Result<u64, ParseError> {
        match parts.get(idx) {
            Some(s) => s
                .parse()
                .map_err(|_| ParseError::new(format!("invalid cpu field {}", idx))),
            None => Ok(0),
        }
    };

    Ok(CpuTimes {
        user: get_val(1)?,
        nice: get_val(2)?,
        system: get_val(3)?,
        idle: get_val(4)?,
        iowait: get_val(5)?,
        irq: get_val(6)?,
        softirq: get_val(7)?,
        steal: get_val(8)?,
    })
}
