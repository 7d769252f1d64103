// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use tokio::time::Instant;

use super::StabilityTracker;
use crate::detect::Status;

const THRESHOLD: Duration = Duration::from_secs(5);

#[tokio::test(start_paused = true)]
async fn fresh_tracker_is_not_stable() {
    let tracker = StabilityTracker::new();
    let now = Instant::now();
    assert!(!tracker.is_stable(THRESHOLD, now));
    assert_eq!(tracker.idle_for(now), None);
}

#[tokio::test(start_paused = true)]
async fn idle_accumulates_to_stable() {
    let mut tracker = StabilityTracker::new();
    tracker.observe(Status::Idle, Instant::now());

    tokio::time::advance(Duration::from_secs(3)).await;
    assert!(!tracker.is_stable(THRESHOLD, Instant::now()));
    assert_eq!(tracker.remaining(THRESHOLD, Instant::now()), Some(Duration::from_secs(2)));

    tokio::time::advance(Duration::from_secs(3)).await;
    assert!(tracker.is_stable(THRESHOLD, Instant::now()));
    assert_eq!(tracker.remaining(THRESHOLD, Instant::now()), None);
}

#[tokio::test(start_paused = true)]
async fn non_idle_clears_the_clock() {
    let mut tracker = StabilityTracker::new();
    tracker.observe(Status::Idle, Instant::now());
    tokio::time::advance(Duration::from_secs(10)).await;

    tracker.observe(Status::Running, Instant::now());
    assert!(!tracker.is_stable(THRESHOLD, Instant::now()));

    // Becoming idle again starts from zero.
    tracker.observe(Status::Idle, Instant::now());
    tokio::time::advance(Duration::from_secs(4)).await;
    assert!(!tracker.is_stable(THRESHOLD, Instant::now()));
}

#[tokio::test(start_paused = true)]
async fn repeated_idle_observations_keep_original_start() {
    let mut tracker = StabilityTracker::new();
    tracker.observe(Status::Idle, Instant::now());
    tokio::time::advance(Duration::from_secs(3)).await;
    tracker.observe(Status::Idle, Instant::now());
    tokio::time::advance(Duration::from_secs(2)).await;
    assert!(tracker.is_stable(THRESHOLD, Instant::now()));
}

#[tokio::test(start_paused = true)]
async fn reset_forgets_idle_time() {
    let mut tracker = StabilityTracker::new();
    tracker.observe(Status::Idle, Instant::now());
    tokio::time::advance(Duration::from_secs(10)).await;
    tracker.reset();
    assert!(!tracker.is_stable(THRESHOLD, Instant::now()));
}
