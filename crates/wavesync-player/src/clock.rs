//! Local time sources for comparing against sender timestamps.

use std::time::{SystemTime, UNIX_EPOCH};

use tokio::time::Instant;

/// Local wall clock in fractional seconds since the Unix epoch (UTC).
pub trait Clock {
    fn now(&self) -> f64;
}

/// The system wall clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0)
    }
}

/// Wall clock anchored once and then advanced by tokio's monotonic clock.
///
/// Follows `tokio::time::pause`/`advance`, which makes timed behavior
/// reproducible when the runtime clock is paused.
#[derive(Clone, Copy, Debug)]
pub struct MonotonicClock {
    origin_secs: f64,
    start: Instant,
}

impl MonotonicClock {
    pub fn starting_at(origin_secs: f64) -> Self {
        Self {
            origin_secs,
            start: Instant::now(),
        }
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> f64 {
        self.origin_secs + self.start.elapsed().as_secs_f64()
    }
}
