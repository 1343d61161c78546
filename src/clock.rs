//! Time sources used by the rate limiter.
//!
//! The limiter reasons in monotonic [`Instant`]s and only converts to wall
//! clock time when it renders the `X-RateLimit-Reset` header, so a clock
//! exposes both readings.

use parking_lot::Mutex;
use std::fmt;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Source of the current time.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Monotonic reading used for window arithmetic.
    fn now(&self) -> Instant;

    /// Wall clock reading taken at the same moment as [`Clock::now`].
    fn system_now(&self) -> SystemTime;
}

/// The real clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn system_now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    base: Instant,
    base_system: SystemTime,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            base_system: SystemTime::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    /// Move both readings forward.
    pub fn advance(&self, by: Duration) {
        *self.offset.lock() += by;
    }

    /// Time elapsed since the clock was created.
    pub fn elapsed(&self) -> Duration {
        *self.offset.lock()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + *self.offset.lock()
    }

    fn system_now(&self) -> SystemTime {
        self.base_system + *self.offset.lock()
    }
}

/// Seconds since the unix epoch, saturating at zero for pre-epoch times.
pub fn unix_seconds(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
