//! Wall-clock segment scheduling.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Local, TimeDelta, Timelike};

const SECS_PER_DAY: u64 = 24 * 60 * 60;

/// Source of local wall-clock time.
pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> DateTime<Local>;
}

/// The system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// Wall-clock time derived from tokio's monotonic clock, starting at `anchor`.
///
/// Under a paused tokio runtime the wall clock advances exactly with
/// `tokio::time`, which makes boundary crossings reproducible.
#[derive(Debug, Clone)]
pub struct AnchoredClock {
    anchor: DateTime<Local>,
    started: tokio::time::Instant,
}

impl AnchoredClock {
    pub fn new(anchor: DateTime<Local>) -> Self {
        Self {
            anchor,
            started: tokio::time::Instant::now(),
        }
    }
}

impl Clock for AnchoredClock {
    fn now(&self) -> DateTime<Local> {
        let elapsed = TimeDelta::from_std(self.started.elapsed()).unwrap_or(TimeDelta::zero());
        self.anchor + elapsed
    }
}

/// Segment boundaries at local midnight plus multiples of `interval`.
///
/// Intervals that do not divide a day evenly get a short last segment, so
/// no segment ever spans midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    interval: Duration,
}

impl Schedule {
    pub const HOURLY: Self = Self {
        interval: Duration::from_secs(3600),
    };

    /// Create a schedule. Sub-second intervals are rounded up to one second.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval: Duration::from_secs(interval.as_secs().max(1)),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// The first boundary strictly after `now`.
    pub fn next_boundary(&self, now: DateTime<Local>) -> DateTime<Local> {
        let interval = self.interval.as_secs();
        let elapsed = u64::from(now.num_seconds_from_midnight());
        let next = ((elapsed / interval + 1) * interval).min(SECS_PER_DAY);
        let whole_second = now.with_nanosecond(0).unwrap_or(now);
        whole_second + TimeDelta::seconds((next - elapsed) as i64)
    }

    /// Time left until the next boundary.
    pub fn until_next_boundary(&self, now: DateTime<Local>) -> Duration {
        (self.next_boundary(now) - now)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }
}

impl Default for Schedule {
    fn default() -> Self {
        Self::HOURLY
    }
}
