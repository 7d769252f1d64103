// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dispatch planning: which queued messages start typing now.
//!
//! `plan` is a pure function over snapshots so every gating rule is
//! testable without time or I/O. The engine applies the returned start set
//! and arms a single wake-up timer from `wake_after`.

use std::time::Duration;

use crate::queue::MessageQueue;
use crate::terminal::TerminalId;

/// Per-terminal facts the planner needs, captured at pass time.
#[derive(Debug, Clone, Copy)]
pub struct TerminalView {
    pub id: TerminalId,
    /// An injection is already in flight here.
    pub busy: bool,
    /// Continuously idle for at least the stability threshold.
    pub stable: bool,
    /// Time until stable, when idle but not yet stable. `None` when the
    /// terminal is not idle (or already stable).
    pub time_to_stable: Option<Duration>,
}

/// Global gates that suppress automatic starts entirely.
#[derive(Debug, Clone, Copy, Default)]
pub struct Gates {
    pub paused: bool,
    pub waiting_for_usage_limit: bool,
}

impl Gates {
    fn suppressed(&self) -> bool {
        self.paused || self.waiting_for_usage_limit
    }
}

/// One chosen (message, terminal) start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Start {
    pub message_id: u64,
    pub terminal_id: TerminalId,
}

/// Result of one planning pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Plan {
    /// Starts to launch in parallel, one per terminal at most.
    pub starts: Vec<Start>,
    /// When to run the next pass if work remains but nothing can start.
    pub wake_after: Option<Duration>,
}

/// Compute the maximal start set for this instant.
///
/// For each non-busy, stable terminal the due message with the smallest
/// `(execute_at, sequence, id)` is chosen. Messages already in flight
/// (`in_flight`) are excluded. When undispatched messages remain, the
/// wake-up is the minimum over each blocked message of
/// `max(due_in, time_to_stable)` for its target terminal.
pub fn plan(
    queue: &MessageQueue,
    terminals: &[TerminalView],
    gates: Gates,
    in_flight: &[u64],
    now_ms: u64,
) -> Plan {
    if gates.suppressed() {
        return Plan::default();
    }

    let mut starts = Vec::new();
    let mut chosen: Vec<u64> = in_flight.to_vec();

    for view in terminals {
        if view.busy || !view.stable {
            continue;
        }
        if let Some(message) = queue.next_for(view.id, now_ms, &chosen) {
            chosen.push(message.id);
            starts.push(Start { message_id: message.id, terminal_id: view.id });
        }
    }

    let wake_after = compute_wake(queue, terminals, &chosen, now_ms);
    Plan { starts, wake_after }
}

/// Earliest moment any remaining message could become startable.
fn compute_wake(
    queue: &MessageQueue,
    terminals: &[TerminalView],
    chosen: &[u64],
    now_ms: u64,
) -> Option<Duration> {
    let mut earliest: Option<Duration> = None;

    for message in queue.items() {
        if chosen.contains(&message.id) {
            continue;
        }
        let Some(view) = terminals.iter().find(|t| t.id == message.terminal_id) else {
            // Target terminal is closed; reopening triggers a pass.
            continue;
        };
        if view.busy {
            // Completion events trigger a pass.
            continue;
        }

        let due_in = Duration::from_millis(message.execute_at.saturating_sub(now_ms));
        let candidate = if view.stable {
            if due_in.is_zero() {
                // Startable but not chosen: another message for the same
                // terminal won this pass; its completion re-plans.
                continue;
            }
            due_in
        } else {
            match view.time_to_stable {
                Some(ttl) => ttl.max(due_in),
                // Not idle: a verdict change triggers a pass, but a
                // deferred message still needs its due-time check.
                None if !due_in.is_zero() => due_in,
                None => continue,
            }
        };

        earliest = Some(match earliest {
            Some(current) => current.min(candidate),
            None => candidate,
        });
    }

    earliest
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
