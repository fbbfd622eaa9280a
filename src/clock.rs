//! Time sources for stamping spans and exemplars.
//!
//! The core never reads the wall clock directly. Anything that needs a
//! timestamp takes a [`TimeSource`], so production code runs on
//! [`WallClock`] and tests run on a [`ManualClock`] they advance by hand.

use crate::types::Time;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

#[inline]
fn duration_to_nanos_saturating(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

/// Time source abstraction for getting the current time.
pub trait TimeSource: Send + Sync {
    /// Returns the current time.
    fn now(&self) -> Time;
}

/// Wall clock time source for production use.
///
/// Uses `std::time::Instant` internally, converting to our `Time` type.
/// The epoch is the time when this source was created.
#[derive(Debug)]
pub struct WallClock {
    /// The instant when this clock was created.
    epoch: Instant,
}

impl WallClock {
    /// Creates a new wall clock time source.
    #[must_use]
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl Default for WallClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for WallClock {
    fn now(&self) -> Time {
        let elapsed = self.epoch.elapsed();
        Time::from_nanos(duration_to_nanos_saturating(elapsed))
    }
}

/// Manually advanced time source for deterministic tests.
///
/// Starts at [`Time::ZERO`] and only moves when told to. Shared freely
/// across threads; reads and writes are atomic.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    /// Creates a clock starting at [`Time::ZERO`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a clock starting at the given instant.
    #[must_use]
    pub fn starting_at(at: Time) -> Self {
        Self {
            now: AtomicU64::new(at.as_nanos()),
        }
    }

    /// Sets the current time.
    pub fn set(&self, at: Time) {
        self.now.store(at.as_nanos(), Ordering::Relaxed);
    }

    /// Advances the clock by the given duration, saturating at [`Time::MAX`].
    pub fn advance(&self, duration: Duration) {
        let nanos = duration_to_nanos_saturating(duration);
        let _ = self
            .now
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |cur| {
                Some(cur.saturating_add(nanos))
            });
    }
}

impl TimeSource for ManualClock {
    fn now(&self) -> Time {
        Time::from_nanos(self.now.load(Ordering::Relaxed))
    }
}
