//! ## maskvakt-core::clock
//! **Monotonic + wall-clock time source**
//!
//! Cooldown windows, cache TTLs and rate windows all read time through
//! [`Clock`] so tests can drive them with a [`ManualClock`] instead of
//! sleeping.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

pub trait Clock: Send + Sync {
    /// Monotonic now, for measuring elapsed time.
    fn now(&self) -> Instant;

    /// Wall-clock now, for timestamps and calendar windows.
    fn wall(&self) -> DateTime<Utc>;
}

/// Real time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[inline]
    fn now(&self) -> Instant {
        Instant::now()
    }

    #[inline]
    fn wall(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Clone)]
pub struct ManualClock {
    epoch: Instant,
    wall_epoch: DateTime<Utc>,
    offset: Arc<AtomicU64>, // Nanoseconds
}

impl ManualClock {
    /// Starts at the current instant and the given wall time.
    pub fn new(wall_epoch: DateTime<Utc>) -> Self {
        Self {
            epoch: Instant::now(),
            wall_epoch,
            offset: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.offset
            .fetch_add(by.as_nanos() as u64, Ordering::AcqRel);
    }

    pub fn elapsed(&self) -> Duration {
        Duration::from_nanos(self.offset.load(Ordering::Acquire))
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.epoch + self.elapsed()
    }

    fn wall(&self) -> DateTime<Utc> {
        // Offsets above ~292 years overflow chrono; tests never get near that.
        self.wall_epoch + chrono::Duration::nanoseconds(self.elapsed().as_nanos() as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn manual_clock_starts_at_epoch() {
        let wall = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
        let clock = ManualClock::new(wall);
        assert_eq!(clock.wall(), wall);
        assert_eq!(clock.elapsed(), Duration::ZERO);
    }

    #[test]
    fn manual_clock_advances_both_views() {
        let wall = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
        let clock = ManualClock::new(wall);
        let before = clock.now();
        clock.advance(Duration::from_secs(90));
        assert_eq!(clock.now() - before, Duration::from_secs(90));
        assert_eq!(clock.wall(), wall + chrono::Duration::seconds(90));
    }

    #[test]
    fn clones_share_time() {
        let clock = ManualClock::default();
        let other = clock.clone();
        clock.advance(Duration::from_millis(250));
        assert_eq!(other.elapsed(), Duration::from_millis(250));
    }
}
