// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HH:MM:SS countdown driven by the engine's 1 s tick.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// A validated countdown value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerValue {
    pub hours: u8,
    pub minutes: u8,
    pub seconds: u8,
}

impl TimerValue {
    pub const ZERO: Self = Self { hours: 0, minutes: 0, seconds: 0 };

    /// Build a timer value, rejecting out-of-range fields.
    pub fn new(hours: u8, minutes: u8, seconds: u8) -> anyhow::Result<Self> {
        if hours > 23 {
            anyhow::bail!("timer hours out of range: {hours}");
        }
        if minutes > 59 {
            anyhow::bail!("timer minutes out of range: {minutes}");
        }
        if seconds > 59 {
            anyhow::bail!("timer seconds out of range: {seconds}");
        }
        Ok(Self { hours, minutes, seconds })
    }

    /// Convert a duration, saturating at the 23:59:59 maximum.
    pub fn from_duration(d: Duration) -> Self {
        let total = d.as_secs().min(23 * 3600 + 59 * 60 + 59);
        Self {
            hours: (total / 3600) as u8,
            minutes: ((total % 3600) / 60) as u8,
            seconds: (total % 60) as u8,
        }
    }

    pub fn as_duration(&self) -> Duration {
        Duration::from_secs(
            u64::from(self.hours) * 3600 + u64::from(self.minutes) * 60 + u64::from(self.seconds),
        )
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }

    /// Decrement by one second, saturating at zero.
    fn decremented(self) -> Self {
        let total = self.as_duration().as_secs().saturating_sub(1);
        Self::from_duration(Duration::from_secs(total))
    }
}

impl fmt::Display for TimerValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}:{:02}", self.hours, self.minutes, self.seconds)
    }
}

/// Countdown lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerState {
    Stopped,
    Running,
    Paused,
    Expired,
}

impl TimerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Expired => "expired",
        }
    }
}

/// Outcome of one countdown tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// Timer is not running; nothing happened.
    None,
    /// Value decremented; only the display string needs refreshing.
    Display,
    /// The countdown reached 00:00:00 on this tick.
    Expired,
}

/// The engine's single countdown timer.
///
/// `saved` remembers the last explicitly set value so `stop` restores it.
/// `naturally_completed` distinguishes a countdown that ran to zero from
/// one that was stopped or re-edited.
#[derive(Debug)]
pub struct Countdown {
    remaining: TimerValue,
    saved: TimerValue,
    state: TimerState,
    naturally_completed: bool,
}

impl Default for Countdown {
    fn default() -> Self {
        Self::new()
    }
}

impl Countdown {
    pub fn new() -> Self {
        Self {
            remaining: TimerValue::ZERO,
            saved: TimerValue::ZERO,
            state: TimerState::Stopped,
            naturally_completed: false,
        }
    }

    pub fn state(&self) -> TimerState {
        self.state
    }

    pub fn remaining(&self) -> TimerValue {
        self.remaining
    }

    pub fn saved(&self) -> TimerValue {
        self.saved
    }

    pub fn naturally_completed(&self) -> bool {
        self.naturally_completed
    }

    pub fn display(&self) -> String {
        self.remaining.to_string()
    }

    /// Manually set the countdown. Stops the timer and clears the
    /// naturally-completed flag.
    pub fn edit(&mut self, value: TimerValue) {
        self.remaining = value;
        self.saved = value;
        self.state = TimerState::Stopped;
        self.naturally_completed = false;
    }

    /// Start from stopped or paused. Returns `false` for a zero value or an
    /// invalid state, leaving the timer unchanged.
    pub fn start(&mut self) -> bool {
        if self.remaining.is_zero() {
            return false;
        }
        match self.state {
            TimerState::Stopped | TimerState::Paused => {
                self.state = TimerState::Running;
                self.naturally_completed = false;
                true
            }
            TimerState::Running | TimerState::Expired => false,
        }
    }

    /// Pause a running countdown. Returns `false` if it was not running.
    pub fn pause(&mut self) -> bool {
        if self.state == TimerState::Running {
            self.state = TimerState::Paused;
            true
        } else {
            false
        }
    }

    /// Stop and restore the last saved value.
    pub fn stop(&mut self) {
        self.state = TimerState::Stopped;
        self.remaining = self.saved;
        self.naturally_completed = false;
    }

    /// Advance one second. Returns what changed.
    pub fn tick(&mut self) -> Tick {
        if self.state != TimerState::Running {
            return Tick::None;
        }
        self.remaining = self.remaining.decremented();
        if self.remaining.is_zero() {
            self.state = TimerState::Expired;
            self.naturally_completed = true;
            Tick::Expired
        } else {
            Tick::Display
        }
    }
}

#[cfg(test)]
#[path = "timer_tests.rs"]
mod tests;
