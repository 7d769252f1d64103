// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typing executor: delivers one message's bytes into one terminal.
//!
//! Runs as a detached cooperative task. Pacing sleeps are the only
//! suspension points; the pause gate and the cancellation token are checked
//! at every one of them, so pausing freezes mid-message (position kept by
//! the task itself) and cancellation never emits further bytes.

use std::time::Duration;

use bytes::Bytes;
use rand::Rng;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::terminal::TerminalId;

/// Control-escape markers recognized in processed message text.
const CONTROL_MARKERS: &[(&str, u8)] = &[
    ("^C", 0x03),
    ("^Z", 0x1a),
    ("^D", 0x04),
    ("\\x1b", 0x1b),
    ("\\r", 0x0d),
    ("\\t", 0x09),
];

/// One unit of typed output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keystroke {
    /// A literal character, written as its UTF-8 bytes.
    Char(char),
    /// A translated control byte.
    Control(u8),
}

/// Tokenize processed text into keystrokes. The second value is `true`
/// when any control-escape marker was found, which switches delivery to
/// control pacing and suppresses the trailing Return.
pub fn keystrokes(text: &str) -> (Vec<Keystroke>, bool) {
    let mut out = Vec::with_capacity(text.len());
    let mut has_control = false;
    let mut rest = text;

    'outer: while !rest.is_empty() {
        for &(marker, byte) in CONTROL_MARKERS {
            if let Some(stripped) = rest.strip_prefix(marker) {
                out.push(Keystroke::Control(byte));
                has_control = true;
                rest = stripped;
                continue 'outer;
            }
        }
        let mut chars = rest.chars();
        if let Some(c) = chars.next() {
            out.push(Keystroke::Char(c));
        }
        rest = chars.as_str();
    }

    (out, has_control)
}

/// A jittered delay range in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JitterMs(pub u64, pub u64);

impl JitterMs {
    /// Draw a duration uniformly from the range.
    pub fn sample(&self) -> Duration {
        if self.0 >= self.1 {
            return Duration::from_millis(self.0);
        }
        Duration::from_millis(rand::rng().random_range(self.0..=self.1))
    }
}

/// All pacing knobs of the executor, grouped so tests can zero them.
#[derive(Debug, Clone, Copy)]
pub struct Pacing {
    /// Delay between plain characters.
    pub per_char: Duration,
    /// Delay between units when control escapes are present.
    pub control_spacing: Duration,
    /// Pause between the last character and Return.
    pub return_delay: JitterMs,
    /// Settle time after Return before reporting completion.
    pub settle: JitterMs,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            per_char: Duration::from_millis(50),
            control_spacing: Duration::from_millis(10),
            return_delay: JitterMs(150, 300),
            settle: JitterMs(500, 800),
        }
    }
}

impl Pacing {
    /// Zero-delay pacing for tests.
    pub fn instant() -> Self {
        Self {
            per_char: Duration::ZERO,
            control_spacing: Duration::ZERO,
            return_delay: JitterMs(0, 0),
            settle: JitterMs(0, 0),
        }
    }
}

/// How a typing task ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// All bytes (and Return where applicable) were written.
    Delivered,
    /// Cancelled before completion; no further bytes were written.
    Cancelled,
    /// A PTY write was rejected mid-message.
    WriteFailed(String),
}

/// Completion report sent back to the engine.
///
/// `injection_id` identifies the launch, not the message: after a force
/// reset the same message can relaunch on the same terminal, and the
/// engine must be able to tell a stale completion from the live one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub injection_id: u64,
    pub message_id: u64,
    pub terminal_id: TerminalId,
    pub outcome: Outcome,
}

/// Everything a typing task needs; owned, so the task shares nothing.
pub struct TypingJob {
    pub injection_id: u64,
    pub message_id: u64,
    pub terminal_id: TerminalId,
    pub text: String,
    pub input_tx: mpsc::Sender<Bytes>,
    /// Pause gate: `true` halts delivery at the next pacing boundary.
    pub gate_rx: watch::Receiver<bool>,
    pub cancel: CancellationToken,
    pub done_tx: mpsc::Sender<Completion>,
    pub pacing: Pacing,
}

/// Spawn the typing task for a job.
pub fn spawn(job: TypingJob) -> tokio::task::JoinHandle<()> {
    tokio::spawn(run(job))
}

async fn run(job: TypingJob) {
    let TypingJob {
        injection_id,
        message_id,
        terminal_id,
        text,
        input_tx,
        mut gate_rx,
        cancel,
        done_tx,
        pacing,
    } = job;
    let outcome = deliver(&text, &input_tx, &mut gate_rx, &cancel, &pacing).await;
    let _ = done_tx.send(Completion { injection_id, message_id, terminal_id, outcome }).await;
}

/// Type the message into the terminal, honoring gate and cancellation.
async fn deliver(
    text: &str,
    input_tx: &mpsc::Sender<Bytes>,
    gate_rx: &mut watch::Receiver<bool>,
    cancel: &CancellationToken,
    pacing: &Pacing,
) -> Outcome {
    let (keys, has_control) = keystrokes(text);

    // Spacing applies between keys only: the delay after the last
    // character is `return_delay` (or nothing, for control sequences).
    let spacing = if has_control { pacing.control_spacing } else { pacing.per_char };
    let last = keys.len().saturating_sub(1);
    for (i, key) in keys.into_iter().enumerate() {
        if let Some(outcome) = checkpoint(gate_rx, cancel).await {
            return outcome;
        }
        let bytes = match key {
            Keystroke::Char(c) => {
                let mut buf = [0u8; 4];
                Bytes::copy_from_slice(c.encode_utf8(&mut buf).as_bytes())
            }
            Keystroke::Control(b) => Bytes::copy_from_slice(&[b]),
        };
        if input_tx.send(bytes).await.is_err() {
            return Outcome::WriteFailed("terminal input channel closed".to_owned());
        }
        if i < last {
            if let Some(outcome) = pace(spacing, cancel).await {
                return outcome;
            }
        }
    }

    // Control sequences are complete as-is; plain text gets Return.
    if has_control {
        return Outcome::Delivered;
    }

    if let Some(outcome) = pace(pacing.return_delay.sample(), cancel).await {
        return outcome;
    }
    if let Some(outcome) = checkpoint(gate_rx, cancel).await {
        return outcome;
    }
    if input_tx.send(Bytes::from_static(b"\r")).await.is_err() {
        return Outcome::WriteFailed("terminal input channel closed".to_owned());
    }
    if let Some(outcome) = pace(pacing.settle.sample(), cancel).await {
        return outcome;
    }
    Outcome::Delivered
}

/// Block while the gate is raised; report cancellation either way.
async fn checkpoint(
    gate_rx: &mut watch::Receiver<bool>,
    cancel: &CancellationToken,
) -> Option<Outcome> {
    if cancel.is_cancelled() {
        return Some(Outcome::Cancelled);
    }
    while *gate_rx.borrow() {
        tokio::select! {
            _ = cancel.cancelled() => return Some(Outcome::Cancelled),
            changed = gate_rx.changed() => {
                if changed.is_err() {
                    // Gate sender dropped: engine is gone, stop quietly.
                    return Some(Outcome::Cancelled);
                }
            }
        }
    }
    None
}

/// Sleep one pacing interval, racing cancellation.
async fn pace(delay: Duration, cancel: &CancellationToken) -> Option<Outcome> {
    if delay.is_zero() {
        if cancel.is_cancelled() {
            return Some(Outcome::Cancelled);
        }
        return None;
    }
    tokio::select! {
        _ = cancel.cancelled() => Some(Outcome::Cancelled),
        _ = tokio::time::sleep(delay) => None,
    }
}

/// Type plain characters with per-character pacing, used by the keyword
/// interruptor for rule responses. No trailing Return.
pub async fn type_plain(
    text: &str,
    input_tx: &mpsc::Sender<Bytes>,
    per_char: Duration,
    cancel: &CancellationToken,
) -> anyhow::Result<bool> {
    for c in text.chars() {
        if cancel.is_cancelled() {
            return Ok(true);
        }
        let mut buf = [0u8; 4];
        input_tx
            .send(Bytes::copy_from_slice(c.encode_utf8(&mut buf).as_bytes()))
            .await
            .map_err(|_| anyhow::anyhow!("terminal input channel closed"))?;
        if pace(per_char, cancel).await.is_some() {
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(test)]
#[path = "executor_tests.rs"]
mod tests;
