// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Keyword interruptor: cancels a prompt with Escape when a configured
//! keyword appears in the prompt region, optionally typing a prepared
//! response afterward.
//!
//! The engine arms the interruptor once per prompt occurrence and re-arms
//! it when the verdict leaves `prompting`; while its sequence runs (and for
//! a short window after) auto-continue is suppressed.

use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::event::TaskEvent;
use crate::executor::{type_plain, JitterMs};
use crate::terminal::TerminalId;

/// A configured keyword with an optional prepared response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordRule {
    pub id: u64,
    pub keyword: String,
    pub response: Option<String>,
}

/// The set of keyword rules; keywords are unique case-insensitively.
#[derive(Debug, Default)]
pub struct KeywordSet {
    rules: Vec<KeywordRule>,
    next_id: u64,
}

impl KeywordSet {
    pub fn new() -> Self {
        Self { rules: Vec::new(), next_id: 1 }
    }

    /// Add a rule. The keyword must be non-empty after trimming and not
    /// collide (case-insensitively) with an existing rule.
    pub fn add(&mut self, keyword: &str, response: Option<String>) -> anyhow::Result<&KeywordRule> {
        let keyword = keyword.trim();
        if keyword.is_empty() {
            anyhow::bail!("keyword is empty");
        }
        let lower = keyword.to_lowercase();
        if self.rules.iter().any(|r| r.keyword.to_lowercase() == lower) {
            anyhow::bail!("duplicate keyword: {keyword}");
        }
        let rule = KeywordRule { id: self.next_id, keyword: keyword.to_owned(), response };
        self.next_id += 1;
        self.rules.push(rule);
        let idx = self.rules.len() - 1;
        Ok(&self.rules[idx])
    }

    pub fn remove(&mut self, id: u64) -> anyhow::Result<KeywordRule> {
        let idx = self
            .rules
            .iter()
            .position(|r| r.id == id)
            .ok_or_else(|| anyhow::anyhow!("no keyword rule with id {id}"))?;
        Ok(self.rules.remove(idx))
    }

    pub fn rules(&self) -> &[KeywordRule] {
        &self.rules
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// First rule whose keyword appears (case-insensitively) in the prompt
    /// region.
    pub fn match_region(&self, region: &str) -> Option<&KeywordRule> {
        let lower = region.to_lowercase();
        self.rules.iter().find(|r| lower.contains(&r.keyword.to_lowercase()))
    }
}

/// Pacing of the interrupt sequence.
#[derive(Debug, Clone, Copy)]
pub struct InterruptConfig {
    /// Wait between Escape and typing the response.
    pub response_delay: JitterMs,
    /// Wait between the response's last character and Return.
    pub return_delay: JitterMs,
    /// Per-character delay while typing the response.
    pub per_char: Duration,
    /// Auto-continue suppression window after the interrupt fires.
    pub suppress: JitterMs,
}

impl Default for InterruptConfig {
    fn default() -> Self {
        Self {
            response_delay: JitterMs(700, 1000),
            return_delay: JitterMs(150, 350),
            per_char: Duration::from_millis(50),
            suppress: JitterMs(800, 1200),
        }
    }
}

impl InterruptConfig {
    /// Zero-delay config for tests.
    pub fn instant() -> Self {
        Self {
            response_delay: JitterMs(0, 0),
            return_delay: JitterMs(0, 0),
            per_char: Duration::ZERO,
            suppress: JitterMs(0, 0),
        }
    }
}

/// Spawn the Escape(+response) sequence for a matched rule.
pub fn spawn_interrupt(
    terminal_id: TerminalId,
    rule: KeywordRule,
    input_tx: mpsc::Sender<Bytes>,
    cancel: CancellationToken,
    events_tx: mpsc::Sender<TaskEvent>,
    config: InterruptConfig,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if input_tx.send(Bytes::from_static(b"\x1b")).await.is_err() {
            return;
        }

        let mut delivered_response = false;
        if let Some(ref response) = rule.response {
            if sleep_or_cancelled(config.response_delay, &cancel).await {
                return;
            }
            match type_plain(response, &input_tx, config.per_char, &cancel).await {
                Ok(false) => {}
                // Cancelled mid-response or the channel closed: stop quietly.
                Ok(true) | Err(_) => return,
            }
            if sleep_or_cancelled(config.return_delay, &cancel).await {
                return;
            }
            if input_tx.send(Bytes::from_static(b"\r")).await.is_err() {
                return;
            }
            delivered_response = true;
        }

        let _ = events_tx
            .send(TaskEvent::InterruptFinished {
                terminal_id,
                keyword: rule.keyword,
                delivered_response,
            })
            .await;
    })
}

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
#[path = "interrupt_tests.rs"]
mod tests;
