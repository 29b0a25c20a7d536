//! Authoritative countdown.
//!
//! A running timer stores the instant it was started and the remaining time
//! at that instant; the live remaining value is always derived from those two,
//! so late or skipped ticks never accumulate drift.

use crate::clock::Moment;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerState {
    Running {
        started_at: Instant,
        remaining_at_start: Duration,
    },
    Stopped {
        remaining: Duration,
    },
}

/// Read-only view sent to clients so they can render a smooth local countdown.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimerProjection {
    pub running: bool,
    /// Seconds left at the moment of projection
    pub remaining: f64,
    /// Wall-clock time at which a zero-elapsed countdown would have begun
    pub started_wall: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchTimer {
    state: TimerState,
}

impl MatchTimer {
    pub fn stopped(remaining: Duration) -> Self {
        Self {
            state: TimerState::Stopped { remaining },
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, TimerState::Running { .. })
    }

    /// No-op when already running.
    pub fn start(&mut self, now: Instant) {
        if let TimerState::Stopped { remaining } = self.state {
            self.state = TimerState::Running {
                started_at: now,
                remaining_at_start: remaining,
            };
        }
    }

    /// Freeze the derived remaining value. No-op when stopped.
    pub fn pause(&mut self, now: Instant) {
        if self.is_running() {
            self.state = TimerState::Stopped {
                remaining: self.remaining(now),
            };
        }
    }

    /// Force stopped with a fresh duration (entering a round or break).
    pub fn reset_to(&mut self, duration: Duration) {
        self.state = TimerState::Stopped { remaining: duration };
    }

    pub fn remaining(&self, now: Instant) -> Duration {
        match self.state {
            TimerState::Running {
                started_at,
                remaining_at_start,
            } => remaining_at_start.saturating_sub(now.saturating_duration_since(started_at)),
            TimerState::Stopped { remaining } => remaining,
        }
    }

    pub fn project(&self, now: Moment) -> TimerProjection {
        match self.state {
            TimerState::Running {
                started_at,
                remaining_at_start,
            } => {
                let elapsed = now.mono.saturating_duration_since(started_at);
                let elapsed_wall =
                    chrono::Duration::from_std(elapsed).unwrap_or_else(|_| chrono::Duration::zero());
                TimerProjection {
                    running: true,
                    remaining: remaining_at_start.saturating_sub(elapsed).as_secs_f64(),
                    started_wall: Some(now.wall - elapsed_wall),
                }
            }
            TimerState::Stopped { remaining } => TimerProjection {
                running: false,
                remaining: remaining.as_secs_f64(),
                started_wall: None,
            },
        }
    }

    /// Stop at zero if a running countdown has run out. Returns true exactly once per expiry.
    pub fn expire_if_due(&mut self, now: Instant) -> bool {
        if self.is_running() && self.remaining(now).is_zero() {
            self.state = TimerState::Stopped {
                remaining: Duration::ZERO,
            };
            return true;
        }
        false
    }
}
