//! Mock filesystem for testing.
//!
//! `MockFs` and a few pre-built host scenarios let the collector and the
//! sampler run without a real `/proc` or real mounts.

mod filesystem;
mod scenarios;

pub use filesystem::MockFs;
