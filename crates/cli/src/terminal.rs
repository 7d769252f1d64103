// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-terminal runtime state owned by the engine task.

use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::detect::{self, Observation, Status};
use crate::scheduler::TerminalView;
use crate::stability::StabilityTracker;
use crate::window::OutputWindow;

/// Terminal identity, assigned on open.
pub type TerminalId = u32;

/// Upper bound on simultaneously open terminals.
pub const MAX_TERMINALS: usize = 4;

/// Color tags cycled across terminals as they open.
const COLOR_TAGS: &[&str] = &["blue", "green", "amber", "violet"];

/// One open terminal: its output window, verdict, stability clock, and the
/// handles of any helper tasks currently attached to it.
pub struct Terminal {
    pub id: TerminalId,
    pub name: String,
    pub color: String,
    pub window: OutputWindow,
    pub observation: Observation,
    pub stability: StabilityTracker,
    /// An injection is in flight on this terminal.
    pub injecting: bool,
    /// Byte sink toward the PTY.
    pub input_tx: mpsc::Sender<Bytes>,
    /// Resize requests toward the backend.
    pub resize_tx: mpsc::Sender<(u16, u16)>,
    /// Level-triggered verdict feed for responder tasks.
    status_tx: watch::Sender<Observation>,
    /// Cancels the in-flight typing executor.
    pub executor_cancel: Option<CancellationToken>,
    /// Cancels an active auto-continue or trust responder.
    pub responder_cancel: Option<CancellationToken>,
    /// Cancels an active keyword-interrupt sequence.
    pub interrupt_cancel: Option<CancellationToken>,
    /// The interruptor fires at most once per prompt occurrence.
    pub interrupt_armed: bool,
    /// Auto-continue is suppressed until this instant (interrupt window).
    pub suppress_auto_continue_until: Option<Instant>,
}

impl Terminal {
    pub fn new(
        id: TerminalId,
        window_capacity: usize,
        input_tx: mpsc::Sender<Bytes>,
        resize_tx: mpsc::Sender<(u16, u16)>,
    ) -> Self {
        let color = COLOR_TAGS[(id as usize).saturating_sub(1) % COLOR_TAGS.len()].to_owned();
        let (status_tx, _) = watch::channel(Observation::default());
        Self {
            id,
            name: format!("Terminal {id}"),
            color,
            window: OutputWindow::new(window_capacity),
            observation: Observation::default(),
            stability: StabilityTracker::new(),
            injecting: false,
            input_tx,
            resize_tx,
            status_tx,
            executor_cancel: None,
            responder_cancel: None,
            interrupt_cancel: None,
            interrupt_armed: true,
            suppress_auto_continue_until: None,
        }
    }

    /// Feed freshly received output bytes and reclassify.
    ///
    /// Clear-screen sequences reset the window before classification. The
    /// stability clock and the status watch channel are updated, and the
    /// interruptor re-arms whenever the verdict leaves `prompting`.
    pub fn feed(&mut self, data: &[u8], now: Instant) -> Observation {
        match detect::clear_screen_tail(data) {
            Some(idx) => {
                self.window.clear();
                self.window.push(&data[idx..]);
            }
            None => self.window.push(data),
        }

        let observation = detect::classify(&self.window);
        self.stability.observe(observation.status, now);
        if observation.status != Status::Prompting {
            self.interrupt_armed = true;
        }
        if observation != self.observation {
            self.observation = observation.clone();
            let _ = self.status_tx.send(observation.clone());
        }
        observation
    }

    /// Subscribe to verdict changes (for responder tasks).
    pub fn status_rx(&self) -> watch::Receiver<Observation> {
        self.status_tx.subscribe()
    }

    /// Snapshot for the scheduler.
    pub fn view(&self, threshold: Duration, now: Instant) -> TerminalView {
        TerminalView {
            id: self.id,
            busy: self.injecting,
            stable: self.stability.is_stable(threshold, now),
            time_to_stable: self.stability.remaining(threshold, now),
        }
    }

    /// The keyword-matching region of the current window.
    pub fn prompt_region(&self) -> String {
        let text = self.window.text();
        detect::prompt_region(&text).to_owned()
    }

    /// Whether auto-continue is currently suppressed by the interruptor.
    pub fn auto_continue_suppressed(&self, now: Instant) -> bool {
        self.suppress_auto_continue_until.is_some_and(|until| now < until)
    }

    /// Cancel and detach every helper task bound to this terminal.
    pub fn cancel_tasks(&mut self) {
        for token in [
            self.executor_cancel.take(),
            self.responder_cancel.take(),
            self.interrupt_cancel.take(),
        ]
        .into_iter()
        .flatten()
        {
            token.cancel();
        }
        self.injecting = false;
    }
}

impl std::fmt::Debug for Terminal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Terminal")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("status", &self.observation.status)
            .field("injecting", &self.injecting)
            .finish()
    }
}

#[cfg(test)]
#[path = "terminal_tests.rs"]
mod tests;
