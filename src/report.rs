//! History series served to status queries.
//!
//! Turns stored [`Reading`]s into the per-resource series the status API
//! returns: CPU percent over time, and used/total bytes for memory and disk.
//! Series keep the store's order (newest first).

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::store::Reading;

/// Timestamp format used in every series.
pub const TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CpuPoint {
    pub time: String,
    pub percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsagePoint {
    pub time: String,
    pub total_byte: u64,
    pub used_byte: u64,
    pub used_percent: f64,
}

/// All three series for the same readings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusHistory {
    pub cpu: Vec<CpuPoint>,
    pub memory: Vec<UsagePoint>,
    pub disk: Vec<UsagePoint>,
}

pub fn format_time(time: &DateTime<Utc>) -> String {
    time.format(TIME_FORMAT).to_string()
}

pub fn cpu_history(readings: &[Reading]) -> Vec<CpuPoint> {
    readings
        .iter()
        .map(|r| CpuPoint {
            time: format_time(&r.timestamp),
            percent: r.cpu_usage_percent,
        })
        .collect()
}

pub fn memory_history(readings: &[Reading], total_bytes: u64) -> Vec<UsagePoint> {
    readings
        .iter()
        .map(|r| usage_point(&r.timestamp, r.mem_usage_bytes, total_bytes))
        .collect()
}

pub fn disk_history(readings: &[Reading], total_bytes: u64) -> Vec<UsagePoint> {
    readings
        .iter()
        .map(|r| usage_point(&r.timestamp, r.disk_usage_bytes, total_bytes))
        .collect()
}

pub fn status_history(
    readings: &[Reading],
    memory_total_bytes: u64,
    disk_total_bytes: u64,
) -> StatusHistory {
    StatusHistory {
        cpu: cpu_history(readings),
        memory: memory_history(readings, memory_total_bytes),
        disk: disk_history(readings, disk_total_bytes),
    }
}

fn usage_point(time: &DateTime<Utc>, used: u64, total: u64) -> UsagePoint {
    UsagePoint {
        time: format_time(time),
        total_byte: total,
        used_byte: used,
        used_percent: used_percent(used, total),
    }
}

/// `used * 100 / total`; 0 for an unknown (zero) total.
pub fn used_percent(used: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    used as f64 * 100.0 / total as f64
}
