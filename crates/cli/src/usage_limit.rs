// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Synchronizes the countdown timer to the vendor's announced usage-limit
//! reset time.
//!
//! Announcements repeat in the byte stream while the notice stays on
//! screen, so the last processed reset string is persisted and duplicate
//! sightings are ignored. That same marker implements the manual-edit rule:
//! after a user edits the timer, the lingering announcement still matches
//! the marker and cannot rewrite the edit; only a fresh (different) reset
//! string re-synchronizes.

use std::time::Duration;

use chrono::{DateTime, TimeZone};

use crate::timer::TimerValue;

/// What the engine should do after a usage-limit announcement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncPlan {
    /// The normalized reset string to persist (e.g. `"3am"`).
    pub reset: String,
    /// Countdown until the reset moment.
    pub timer: TimerValue,
    /// The absolute reset moment as epoch seconds, persisted for display.
    pub resets_at_epoch: i64,
}

/// Dedup state for usage-limit synchronization.
#[derive(Debug)]
pub struct UsageLimitSync {
    last_reset: Option<String>,
}

impl UsageLimitSync {
    /// `last_reset` is the marker recovered from the settings store, so a
    /// restart does not re-process an announcement still on screen.
    pub fn new(last_reset: Option<String>) -> Self {
        Self { last_reset }
    }

    pub fn last_reset(&self) -> Option<&str> {
        self.last_reset.as_deref()
    }

    /// Process an announced reset string. Returns a plan when this is a
    /// fresh announcement, `None` for duplicates or unparsable strings.
    pub fn observe<Tz: TimeZone>(&mut self, reset: &str, now: DateTime<Tz>) -> Option<SyncPlan> {
        if self.last_reset.as_deref() == Some(reset) {
            return None;
        }
        let target = next_occurrence(reset, now.clone())?;
        let delta = (target.clone() - now).to_std().ok()?;

        self.last_reset = Some(reset.to_owned());
        Some(SyncPlan {
            reset: reset.to_owned(),
            timer: TimerValue::from_duration(round_up_to_minute(delta)),
            resets_at_epoch: target.timestamp(),
        })
    }

    /// Clear the marker after the countdown expires so the next limit cycle
    /// can trigger again.
    pub fn clear(&mut self) {
        self.last_reset = None;
    }
}

/// Parse a reset string like `"3am"` / `"12pm"` into a 24-hour value.
pub fn parse_reset_hour(reset: &str) -> Option<u32> {
    let lower = reset.to_lowercase();
    let (digits, meridiem) = lower.split_at(lower.len().checked_sub(2)?);
    let hour: u32 = digits.parse().ok()?;
    if !(1..=12).contains(&hour) {
        return None;
    }
    match meridiem {
        "am" => Some(hour % 12),
        "pm" => Some(hour % 12 + 12),
        _ => None,
    }
}

/// The next wall-clock occurrence of `reset`: today if still in the future,
/// otherwise tomorrow.
pub fn next_occurrence<Tz: TimeZone>(reset: &str, now: DateTime<Tz>) -> Option<DateTime<Tz>> {
    let hour = parse_reset_hour(reset)?;
    let tz = now.timezone();

    let today = now.date_naive().and_hms_opt(hour, 0, 0)?;
    let candidate = tz.from_local_datetime(&today).earliest()?;
    if candidate > now {
        return Some(candidate);
    }
    let tomorrow = now.date_naive().succ_opt()?.and_hms_opt(hour, 0, 0)?;
    tz.from_local_datetime(&tomorrow).earliest()
}

/// Round a sub-minute remainder up so the countdown lands on the announced
/// minute rather than expiring just before it.
fn round_up_to_minute(d: Duration) -> Duration {
    if d.subsec_nanos() > 0 {
        Duration::from_secs(d.as_secs() + 1)
    } else {
        d
    }
}

#[cfg(test)]
#[path = "usage_limit_tests.rs"]
mod tests;
