//! Rows stored in and read back from the metrics database.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// One stored sample of system load.
///
/// `id` is the database surrogate key: strictly increasing with insertion
/// order, used to break timestamp ties and to pick eviction victims.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reading {
    pub id: i64,
    /// Sample time, whole seconds.
    pub timestamp: DateTime<Utc>,
    pub cpu_usage_percent: f64,
    pub mem_usage_bytes: u64,
    pub disk_usage_bytes: u64,
}

/// A measurement captured by the sampler, not yet persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub taken_at: DateTime<Utc>,
    pub cpu_usage_percent: f64,
    pub mem_usage_bytes: u64,
    pub disk_usage_bytes: u64,
}

/// Outcome of a single evict-then-insert write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Recorded {
    /// Surrogate id assigned to the new row.
    pub id: i64,
    /// Number of old rows removed to make room.
    pub evicted: usize,
}

/// Result of [`MetricsStore::ensure_schema`](super::MetricsStore::ensure_schema).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaStatus {
    /// The stored version matched; nothing was touched.
    Current,
    /// The database was deleted and created again.
    Recreated { previous: Option<String> },
}
