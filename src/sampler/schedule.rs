//! Drift-free deadline tracking.

use std::time::{Duration, Instant};

/// Fixed-cadence deadline that advances from the previous deadline rather
/// than from the time a tick finished.
///
/// Slow ticks therefore do not push the cadence back. When the worker falls
/// more than one whole interval behind, the missed deadlines are dropped so
/// that a single catch-up tick fires right away and the phase is kept.
///
/// A deadline that cannot be represented as an `Instant` (an interval far
/// beyond any uptime) is never reached: the schedule stays idle.
#[derive(Debug, Clone, Copy)]
pub struct Schedule {
    next: Option<Instant>,
    interval: Duration,
}

impl Schedule {
    /// First deadline at `first`, then every `interval`.
    pub fn new(first: Instant, interval: Duration) -> Self {
        Self {
            next: Some(first),
            interval,
        }
    }

    /// First deadline one `interval` after `start`.
    pub fn after(start: Instant, interval: Duration) -> Self {
        Self {
            next: start.checked_add(interval),
            interval,
        }
    }

    /// Upcoming deadline, `None` once it is out of `Instant` range.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.next
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Whether the current deadline has passed at `now`.
    pub fn is_due(&self, now: Instant) -> bool {
        self.next.is_some_and(|next| now >= next)
    }

    /// Time left until the current deadline (zero when due).
    pub fn until_due(&self, now: Instant) -> Duration {
        match self.next {
            Some(next) => next.saturating_duration_since(now),
            None => Duration::MAX,
        }
    }

    /// Moves to the next deadline after a tick that finished at `now`.
    ///
    /// Returns how many deadlines were skipped to avoid a backlog.
    pub fn advance(&mut self, now: Instant) -> u64 {
        let Some(next) = self.next.and_then(|next| next.checked_add(self.interval)) else {
            self.next = None;
            return 0;
        };
        self.next = Some(next);

        if self.interval.is_zero()
            || next
                .checked_add(self.interval)
                .is_none_or(|following| now < following)
        {
            return 0;
        }

        // Jump to the latest deadline that is not after `now`.
        let behind = now.duration_since(next).as_nanos();
        let interval = self.interval.as_nanos();
        let phase = Duration::from_nanos(u64::try_from(behind % interval).unwrap_or(0));
        self.next = Some(now.checked_sub(phase).unwrap_or(now));
        u64::try_from(behind / interval).unwrap_or(u64::MAX)
    }
}
