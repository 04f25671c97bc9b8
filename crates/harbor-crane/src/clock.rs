//! Game clock.
//!
//! The game has no shared time base. It starts when the crane receives the
//! first radio message of any kind and lasts a fixed duration from then.

use std::time::Duration;

use tokio::time::Instant;

/// Wall-clock bounds of one game, measured at the crane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GameClock {
    duration: Duration,
    started_at: Option<Instant>,
}

impl GameClock {
    /// A clock that has not started yet.
    pub const fn new(duration: Duration) -> Self {
        Self {
            duration,
            started_at: None,
        }
    }

    /// Start the clock at `now`. Returns `false` if it was already running.
    pub const fn start(&mut self, now: Instant) -> bool {
        if self.started_at.is_some() {
            return false;
        }
        self.started_at = Some(now);
        true
    }

    /// Whether the clock has started.
    pub const fn is_started(&self) -> bool {
        self.started_at.is_some()
    }

    /// Time since the start, zero before the start.
    pub fn elapsed(&self, now: Instant) -> Duration {
        self.started_at
            .map_or(Duration::ZERO, |start| now.saturating_duration_since(start))
    }

    /// Whole seconds since the start, saturating at `u16::MAX`.
    pub fn elapsed_secs(&self, now: Instant) -> u16 {
        u16::try_from(self.elapsed(now).as_secs()).unwrap_or(u16::MAX)
    }

    /// Whole seconds until the end, the full duration before the start.
    pub fn seconds_left(&self, now: Instant) -> u16 {
        let left = self.duration.saturating_sub(self.elapsed(now));
        u16::try_from(left.as_secs()).unwrap_or(u16::MAX)
    }

    /// Game length in whole seconds.
    pub fn duration_secs(&self) -> u16 {
        u16::try_from(self.duration.as_secs()).unwrap_or(u16::MAX)
    }

    /// Whether the game has started and run its full duration.
    pub fn is_over(&self, now: Instant) -> bool {
        self.is_started() && self.elapsed(now) >= self.duration
    }
}
