//! Periodic background sampling into the metrics store.
//!
//! A [`Sampler`] owns one worker thread. On every deadline the worker
//! captures a [`Sample`](crate::store::Sample) from its
//! [`MetricsProvider`] and hands it to
//! [`MetricsStore::record_sample`], which evicts the oldest rows and appends
//! the new one. Deadlines follow a drift-free [`Schedule`].
//!
//! Failures never end the worker: a tick that cannot collect or store is
//! logged and the next deadline proceeds as planned.

mod schedule;

pub use schedule::Schedule;

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::collector::{CollectError, MetricsProvider, capture_sample};
use crate::store::{MetricsStore, Recorded, StoreError};

/// Settings for one sampler.
#[derive(Debug, Clone)]
pub struct SamplerConfig {
    /// Time between samples.
    pub interval: Duration,
    /// Maximum number of stored readings; must be at least 1.
    pub retention_count: usize,
    /// Mount point whose usage is recorded.
    pub disk_path: PathBuf,
    /// `VACUUM` cadence; `None` disables compaction.
    pub compact_interval: Option<Duration>,
    /// Longest single sleep between deadline checks; bounds stop latency.
    pub poll_quantum: Duration,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            retention_count: 300,
            disk_path: PathBuf::from("/"),
            compact_interval: Some(Duration::from_secs(3600)),
            poll_quantum: Duration::from_millis(500),
        }
    }
}

/// Lifecycle of a [`Sampler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplerState {
    Idle,
    Running,
    Stopping,
    Stopped,
}

#[derive(Debug, Error)]
pub enum SamplerError {
    #[error("sampler cannot start from state {0:?}")]
    NotIdle(SamplerState),
    #[error("retention_count must be at least 1")]
    ZeroRetention,
    #[error("failed to spawn sampler thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Why a single tick did not produce a stored reading.
#[derive(Debug, Error)]
pub enum TickError {
    #[error("collect: {0}")]
    Collect(#[from] CollectError),
    #[error("store: {0}")]
    Store(#[from] StoreError),
}

/// Counters shared with the worker thread.
#[derive(Debug, Default)]
pub struct SamplerStats {
    samples_written: AtomicU64,
    ticks_failed: AtomicU64,
    compactions: AtomicU64,
}

impl SamplerStats {
    pub fn samples_written(&self) -> u64 {
        self.samples_written.load(Ordering::Relaxed)
    }

    pub fn ticks_failed(&self) -> u64 {
        self.ticks_failed.load(Ordering::Relaxed)
    }

    pub fn compactions(&self) -> u64 {
        self.compactions.load(Ordering::Relaxed)
    }
}

/// Periodic sampler driving a [`MetricsStore`].
pub struct Sampler<P: MetricsProvider + 'static> {
    config: SamplerConfig,
    state: SamplerState,
    stop: Arc<AtomicBool>,
    stats: Arc<SamplerStats>,
    /// Store and provider, until they move into the worker.
    parts: Option<(MetricsStore, P)>,
    handle: Option<JoinHandle<()>>,
}

impl<P: MetricsProvider + 'static> Sampler<P> {
    /// Creates an idle sampler. Nothing runs until [`Sampler::start`].
    pub fn new(store: MetricsStore, provider: P, config: SamplerConfig) -> Self {
        Self {
            config,
            state: SamplerState::Idle,
            stop: Arc::new(AtomicBool::new(false)),
            stats: Arc::new(SamplerStats::default()),
            parts: Some((store, provider)),
            handle: None,
        }
    }

    pub fn state(&self) -> SamplerState {
        self.state
    }

    pub fn stats(&self) -> &SamplerStats {
        &self.stats
    }

    /// Spawns the worker thread. The first sample is taken immediately.
    pub fn start(&mut self) -> Result<(), SamplerError> {
        if self.state != SamplerState::Idle {
            return Err(SamplerError::NotIdle(self.state));
        }
        if self.config.retention_count == 0 {
            return Err(SamplerError::ZeroRetention);
        }
        let Some((store, provider)) = self.parts.take() else {
            return Err(SamplerError::NotIdle(self.state));
        };

        let worker = Worker {
            store,
            provider,
            config: self.config.clone(),
            stop: Arc::clone(&self.stop),
            stats: Arc::clone(&self.stats),
        };

        let handle = thread::Builder::new()
            .name("hoststat-sampler".to_string())
            .spawn(move || worker.run())?;

        info!(
            "Sampler started: interval={:?}, retention={}, disk={}",
            self.config.interval,
            self.config.retention_count,
            self.config.disk_path.display()
        );

        self.handle = Some(handle);
        self.state = SamplerState::Running;
        Ok(())
    }

    /// Whether the worker thread is alive.
    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Asks the worker to finish and waits for it.
    ///
    /// A tick in progress completes first. Calling `stop` again, or on a
    /// sampler that never started, is a no-op apart from the state change.
    pub fn stop(&mut self) {
        match self.state {
            SamplerState::Stopped => return,
            SamplerState::Idle => {
                self.parts = None;
                self.state = SamplerState::Stopped;
                return;
            }
            SamplerState::Running | SamplerState::Stopping => {}
        }

        self.state = SamplerState::Stopping;
        self.stop.store(true, Ordering::Release);

        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            error!("Sampler worker panicked");
        }

        self.state = SamplerState::Stopped;
        info!(
            "Sampler stopped: {} samples written, {} ticks failed",
            self.stats.samples_written(),
            self.stats.ticks_failed()
        );
    }
}

impl<P: MetricsProvider + 'static> Drop for Sampler<P> {
    fn drop(&mut self) {
        self.stop();
    }
}

struct Worker<P: MetricsProvider> {
    store: MetricsStore,
    provider: P,
    config: SamplerConfig,
    stop: Arc<AtomicBool>,
    stats: Arc<SamplerStats>,
}

impl<P: MetricsProvider> Worker<P> {
    fn run(mut self) {
        let started = Instant::now();
        let mut schedule = Schedule::new(started, self.config.interval);
        let mut compaction = self
            .config
            .compact_interval
            .filter(|interval| !interval.is_zero())
            .map(|interval| Schedule::after(started, interval));

        while !self.stop.load(Ordering::Acquire) {
            let now = Instant::now();
            if !schedule.is_due(now) {
                thread::sleep(schedule.until_due(now).min(self.config.poll_quantum));
                continue;
            }

            match self.tick() {
                Ok(recorded) => {
                    self.stats.samples_written.fetch_add(1, Ordering::Relaxed);
                    debug!(
                        "Stored reading #{} (evicted {})",
                        recorded.id, recorded.evicted
                    );
                }
                Err(e) => {
                    self.stats.ticks_failed.fetch_add(1, Ordering::Relaxed);
                    warn!("Sampling tick failed: {}", e);
                }
            }

            let skipped = schedule.advance(Instant::now());
            if skipped > 0 {
                warn!("Sampler fell behind, skipped {} ticks", skipped);
            }

            if let Some(compaction) = compaction.as_mut() {
                let now = Instant::now();
                if compaction.is_due(now) {
                    match self.store.compact() {
                        Ok(()) => {
                            self.stats.compactions.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(e) => warn!("Compaction failed: {}", e),
                    }
                    compaction.advance(now);
                }
            }
        }

        debug!("Sampler worker exiting");
    }

    fn tick(&mut self) -> Result<Recorded, TickError> {
        let sample = capture_sample(&mut self.provider, &self.config.disk_path, Utc::now())?;
        let recorded = self
            .store
            .record_sample(&sample, self.config.retention_count)?;
        Ok(recorded)
    }
}
