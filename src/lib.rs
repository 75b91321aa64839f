//! hoststat - host load history library.
//!
//! Shared between:
//! - `hoststatd` - daemon sampling CPU, memory and disk usage into the store
//! - `hoststat` - reader printing the stored history
//!
//! Modules:
//! - `lock` - cross-process advisory file lock
//! - `store` - bounded SQLite time-series of readings
//! - `sampler` - drift-free periodic sampling worker
//! - `collector` - procfs/statvfs metrics provider
//! - `report` - history series for status queries
//! - `config`, `logging` - daemon plumbing

pub mod collector;
pub mod config;
pub mod lock;
pub mod logging;
pub mod report;
pub mod sampler;
pub mod store;
