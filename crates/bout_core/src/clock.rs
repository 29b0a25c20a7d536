//! Time sources.
//!
//! Engine code never reads the clock; every operation receives a [`Moment`]
//! captured once by its caller. Production uses [`SystemClock`]; tests drive a
//! [`ManualClock`] forward explicitly.

use chrono::{DateTime, Utc};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// A paired monotonic + wall-clock reading taken at the same point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Moment {
    /// Authoritative time base for all elapsed-time arithmetic
    pub mono: Instant,
    /// Only used to project timer starts for remote rendering
    pub wall: DateTime<Utc>,
}

impl Moment {
    pub fn now() -> Self {
        Self {
            mono: Instant::now(),
            wall: Utc::now(),
        }
    }

    /// This moment shifted forward by `d` on both time bases.
    pub fn after(&self, d: Duration) -> Self {
        Self {
            mono: self.mono + d,
            wall: self.wall + chrono::Duration::from_std(d).unwrap_or_else(|_| chrono::Duration::zero()),
        }
    }
}

pub trait Clock: Send + Sync {
    fn now(&self) -> Moment;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Moment {
        Moment::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    origin: Moment,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::starting_at(Moment::now())
    }

    pub fn starting_at(origin: Moment) -> Self {
        Self {
            origin,
            offset: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, d: Duration) {
        let mut offset = self.offset.lock().unwrap_or_else(|e| e.into_inner());
        *offset += d;
    }

    pub fn advance_ms(&self, ms: u64) {
        self.advance(Duration::from_millis(ms));
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Moment {
        let offset = *self.offset.lock().unwrap_or_else(|e| e.into_inner());
        self.origin.after(offset)
    }
}
