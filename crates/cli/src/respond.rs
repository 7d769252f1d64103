// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Auto-continue responder: presses Return at confirmation prompts.
//!
//! Runs as a detached task per prompt occurrence, observing the terminal's
//! status watch channel (level-triggered). The engine spawns it only when
//! auto-continue is enabled and no injection or keyword interrupt is
//! active, and cancels it when either starts.

use bytes::Bytes;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::detect::{Observation, Status};
use crate::event::{RespondOutcome, TaskEvent};
use crate::executor::JitterMs;
use crate::terminal::TerminalId;

/// Pacing and bounds of the responder.
#[derive(Debug, Clone, Copy)]
pub struct RespondConfig {
    /// Return presses before giving up.
    pub max_attempts: u32,
    /// Delay before each Return press.
    pub press_delay: JitterMs,
    /// Wait before re-checking whether the prompt cleared.
    pub recheck_delay: JitterMs,
    /// Delay before acknowledging the trust dialog.
    pub trust_delay: JitterMs,
}

impl Default for RespondConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            press_delay: JitterMs(50, 150),
            recheck_delay: JitterMs(1000, 1300),
            trust_delay: JitterMs(1000, 2000),
        }
    }
}

impl RespondConfig {
    /// Zero-delay config for tests.
    pub fn instant() -> Self {
        Self {
            max_attempts: 10,
            press_delay: JitterMs(0, 0),
            recheck_delay: JitterMs(0, 0),
            trust_delay: JitterMs(0, 0),
        }
    }
}

/// Whether an observation still shows the confirmation prompt.
fn prompt_present(obs: &Observation) -> bool {
    obs.status == Status::Prompting || obs.proceed_prompt
}

/// Spawn the Return-retry loop for a confirmation prompt.
pub fn spawn_auto_continue(
    terminal_id: TerminalId,
    status_rx: watch::Receiver<Observation>,
    input_tx: mpsc::Sender<Bytes>,
    cancel: CancellationToken,
    events_tx: mpsc::Sender<TaskEvent>,
    config: RespondConfig,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let outcome = retry_returns(&status_rx, &input_tx, &cancel, &config).await;
        if let Some(outcome) = outcome {
            let _ = events_tx.send(TaskEvent::AutoContinue { terminal_id, outcome }).await;
        }
    })
}

/// The retry loop. Returns `None` when cancelled (the engine already knows
/// why), otherwise the outcome to report.
async fn retry_returns(
    status_rx: &watch::Receiver<Observation>,
    input_tx: &mpsc::Sender<Bytes>,
    cancel: &CancellationToken,
    config: &RespondConfig,
) -> Option<RespondOutcome> {
    for attempt in 1..=config.max_attempts {
        if sleep_or_cancelled(config.press_delay, cancel).await {
            return None;
        }
        if input_tx.send(Bytes::from_static(b"\r")).await.is_err() {
            return Some(RespondOutcome::WriteFailed);
        }
        if sleep_or_cancelled(config.recheck_delay, cancel).await {
            return None;
        }
        let obs = status_rx.borrow().clone();
        if !prompt_present(&obs) {
            return Some(RespondOutcome::Cleared { attempts: attempt });
        }
    }
    Some(RespondOutcome::Exhausted)
}

/// Spawn the single-Return acknowledgement for the trust dialog.
pub fn spawn_trust_ack(
    terminal_id: TerminalId,
    status_rx: watch::Receiver<Observation>,
    input_tx: mpsc::Sender<Bytes>,
    cancel: CancellationToken,
    events_tx: mpsc::Sender<TaskEvent>,
    config: RespondConfig,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if sleep_or_cancelled(config.trust_delay, &cancel).await {
            return;
        }
        // The dialog may have been answered by hand during the delay.
        if status_rx.borrow().status != Status::TrustAsked {
            return;
        }
        if input_tx.send(Bytes::from_static(b"\r")).await.is_ok() {
            let _ = events_tx.send(TaskEvent::TrustAcknowledged { terminal_id }).await;
        }
    })
}

/// Sleep a jittered delay, returning `true` if cancelled first.
async fn sleep_or_cancelled(delay: JitterMs, cancel: &CancellationToken) -> bool {
    let d = delay.sample();
    if d.is_zero() {
        return cancel.is_cancelled();
    }
    tokio::select! {
        _ = cancel.cancelled() => true,
        _ = tokio::time::sleep(d) => false,
    }
}

#[cfg(test)]
#[path = "respond_tests.rs"]
mod tests;
