//! Time and polling discipline
//!
//! Every wait in a run goes through [`Sleeper`] and every "now" through
//! [`Clock`], so tests drive the renewal gate and both polling loops with a
//! virtual clock.

use std::time::Duration;

use chrono::{DateTime, Utc};

/// Source of the current time
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Blocks the calling thread between polls
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// `std::thread::sleep`
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Fixed-interval polling with an optional attempt bound
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Delay between two attempts
    pub interval: Duration,
    /// `None` polls until a terminal answer arrives
    pub max_attempts: Option<u32>,
}

impl PollPolicy {
    /// Poll forever at `interval`
    pub fn unbounded(interval: Duration) -> Self {
        Self {
            interval,
            max_attempts: None,
        }
    }

    /// Give up after `attempts` tries (at least one)
    pub fn bounded(interval: Duration, attempts: u32) -> Self {
        Self {
            interval,
            max_attempts: Some(attempts.max(1)),
        }
    }

    /// True if another attempt is allowed after `attempt` (1-based) failed
    pub fn allows_retry_after(&self, attempt: u32) -> bool {
        self.max_attempts.map_or(true, |max| attempt < max)
    }
}
