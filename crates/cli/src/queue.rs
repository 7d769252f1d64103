// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Ordered, persisted queue of pending injections plus the bounded history
//! of completed ones.
//!
//! The in-memory queue is authoritative; every mutation is followed by a
//! whole-array persistence attempt with bounded retries. A persistence
//! failure is reported but never rolls back the in-memory state.

use std::collections::VecDeque;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::settings::SettingsStore;
use crate::terminal::TerminalId;

/// In-memory history bound.
const HISTORY_CAP: usize = 100;

/// Persistence retry schedule: attempts after the first.
const PERSIST_RETRIES: u32 = 3;
const PERSIST_BACKOFF_BASE: Duration = Duration::from_millis(50);

/// A queued injection bound to a target terminal.
///
/// `processed_content` is the text the executor types: identical to
/// `content` except that control-escape markers (`^C`, `\x1b`, …) are kept
/// verbatim for the executor to translate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: u64,
    pub content: String,
    pub processed_content: String,
    /// Earliest moment this message may start, epoch milliseconds.
    pub execute_at: u64,
    pub created_at: u64,
    /// Monotone tie-breaker; insertion order.
    pub sequence: u64,
    pub terminal_id: TerminalId,
}

/// A completed injection, kept for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: u64,
    pub content: String,
    pub terminal_id: TerminalId,
    pub completed_at: u64,
}

/// The ordered set of pending messages.
#[derive(Debug)]
pub struct MessageQueue {
    items: Vec<Message>,
    next_id: u64,
    next_sequence: u64,
}

impl Default for MessageQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageQueue {
    pub fn new() -> Self {
        Self { items: Vec::new(), next_id: 1, next_sequence: 1 }
    }

    /// Rebuild from persisted messages, restoring the id and sequence
    /// counters past every persisted value.
    pub fn from_persisted(items: Vec<Message>) -> Self {
        let next_id = items.iter().map(|m| m.id).max().unwrap_or(0) + 1;
        let next_sequence = items.iter().map(|m| m.sequence).max().unwrap_or(0) + 1;
        Self { items, next_id, next_sequence }
    }

    /// Append a message for `terminal_id`. Content must be non-empty after
    /// trimming; `execute_at` defaults to `now_ms`.
    pub fn enqueue(
        &mut self,
        content: &str,
        terminal_id: TerminalId,
        now_ms: u64,
        execute_at: Option<u64>,
    ) -> anyhow::Result<&Message> {
        let trimmed = content.trim();
        if trimmed.is_empty() {
            anyhow::bail!("message content is empty");
        }
        let message = Message {
            id: self.next_id,
            content: trimmed.to_owned(),
            processed_content: trimmed.to_owned(),
            execute_at: execute_at.unwrap_or(now_ms),
            created_at: now_ms,
            sequence: self.next_sequence,
            terminal_id,
        };
        self.next_id += 1;
        self.next_sequence += 1;
        self.items.push(message);
        let idx = self.items.len() - 1;
        Ok(&self.items[idx])
    }

    /// Insert a message at the head of the queue (smallest sequence), used
    /// for the post-usage-limit "continue". Existing entries keep their
    /// sequences; the new one slots in front of the current minimum.
    pub fn enqueue_front(
        &mut self,
        content: &str,
        terminal_id: TerminalId,
        now_ms: u64,
    ) -> anyhow::Result<&Message> {
        let trimmed = content.trim();
        if trimmed.is_empty() {
            anyhow::bail!("message content is empty");
        }
        let sequence = match self.items.iter().map(|m| m.sequence).min() {
            Some(min) => min.saturating_sub(1),
            None => self.next_sequence,
        };
        if sequence >= self.next_sequence {
            self.next_sequence = sequence + 1;
        }
        let message = Message {
            id: self.next_id,
            content: trimmed.to_owned(),
            processed_content: trimmed.to_owned(),
            execute_at: now_ms,
            created_at: now_ms,
            sequence,
            terminal_id,
        };
        self.next_id += 1;
        self.items.insert(0, message);
        Ok(&self.items[0])
    }

    /// Move the message at index `from` to index `to`, then renumber the
    /// stored sequences to match the new array order so dispatch follows
    /// the visible arrangement. Ids are preserved.
    pub fn reorder(&mut self, from: usize, to: usize) -> anyhow::Result<()> {
        if from >= self.items.len() || to >= self.items.len() {
            anyhow::bail!("reorder index out of range: {from} -> {to}");
        }
        let item = self.items.remove(from);
        self.items.insert(to, item);

        let mut sequences: Vec<u64> = self.items.iter().map(|m| m.sequence).collect();
        sequences.sort_unstable();
        for (message, seq) in self.items.iter_mut().zip(sequences) {
            message.sequence = seq;
        }
        Ok(())
    }

    /// Replace the content of a queued message.
    pub fn update(&mut self, id: u64, content: &str) -> anyhow::Result<()> {
        let trimmed = content.trim();
        if trimmed.is_empty() {
            anyhow::bail!("message content is empty");
        }
        let message = self
            .items
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or_else(|| anyhow::anyhow!("no queued message with id {id}"))?;
        message.content = trimmed.to_owned();
        message.processed_content = trimmed.to_owned();
        Ok(())
    }

    /// Remove a queued message by id.
    pub fn remove(&mut self, id: u64) -> anyhow::Result<Message> {
        let idx = self
            .items
            .iter()
            .position(|m| m.id == id)
            .ok_or_else(|| anyhow::anyhow!("no queued message with id {id}"))?;
        Ok(self.items.remove(idx))
    }

    /// Drop every queued message.
    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[Message] {
        &self.items
    }

    pub fn get(&self, id: u64) -> Option<&Message> {
        self.items.iter().find(|m| m.id == id)
    }

    /// The next dispatchable message for `terminal_id`: smallest
    /// `(execute_at, sequence, id)` among messages due by `now_ms`,
    /// excluding ids in `skip` (in-flight messages).
    pub fn next_for(&self, terminal_id: TerminalId, now_ms: u64, skip: &[u64]) -> Option<&Message> {
        self.items
            .iter()
            .filter(|m| m.terminal_id == terminal_id)
            .filter(|m| m.execute_at <= now_ms)
            .filter(|m| !skip.contains(&m.id))
            .min_by_key(|m| (m.execute_at, m.sequence, m.id))
    }

    /// The head message for `terminal_id` regardless of `execute_at`, used
    /// by manual inject.
    pub fn head_for(&self, terminal_id: TerminalId, skip: &[u64]) -> Option<&Message> {
        self.items
            .iter()
            .filter(|m| m.terminal_id == terminal_id)
            .filter(|m| !skip.contains(&m.id))
            .min_by_key(|m| (m.execute_at, m.sequence, m.id))
    }

    /// The earliest future `execute_at` among messages for any terminal,
    /// used for scheduler wake-up computation.
    pub fn earliest_deferred(&self, now_ms: u64, skip: &[u64]) -> Option<u64> {
        self.items
            .iter()
            .filter(|m| m.execute_at > now_ms)
            .filter(|m| !skip.contains(&m.id))
            .map(|m| m.execute_at)
            .min()
    }

    /// Remove a completed message, converting it to a history entry.
    pub fn complete(&mut self, id: u64, now_ms: u64) -> Option<HistoryEntry> {
        let idx = self.items.iter().position(|m| m.id == id)?;
        let message = self.items.remove(idx);
        Some(HistoryEntry {
            id: message.id,
            content: message.content,
            terminal_id: message.terminal_id,
            completed_at: now_ms,
        })
    }
}

/// Bounded ring of completed injections.
#[derive(Debug, Default)]
pub struct MessageHistory {
    entries: VecDeque<HistoryEntry>,
}

impl MessageHistory {
    pub fn new() -> Self {
        Self { entries: VecDeque::new() }
    }

    pub fn from_persisted(entries: Vec<HistoryEntry>) -> Self {
        let mut history = Self { entries: entries.into() };
        while history.entries.len() > HISTORY_CAP {
            history.entries.pop_front();
        }
        history
    }

    pub fn push(&mut self, entry: HistoryEntry) {
        if self.entries.len() == HISTORY_CAP {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    pub fn snapshot(&self) -> Vec<HistoryEntry> {
        self.entries.iter().cloned().collect()
    }
}

/// Persist the whole queue array with bounded retries and exponential
/// backoff. Returns an error only after every attempt has failed; the
/// in-memory queue stays authoritative either way.
pub async fn persist_queue(store: &dyn SettingsStore, queue: &MessageQueue) -> anyhow::Result<()> {
    persist_with_retry(|| store.save_message_queue(queue.items())).await
}

/// Persist the whole history array with the same retry policy.
pub async fn persist_history(
    store: &dyn SettingsStore,
    history: &MessageHistory,
) -> anyhow::Result<()> {
    let snapshot = history.snapshot();
    persist_with_retry(|| store.save_message_history(&snapshot)).await
}

async fn persist_with_retry(
    mut attempt: impl FnMut() -> anyhow::Result<()>,
) -> anyhow::Result<()> {
    let mut backoff = PERSIST_BACKOFF_BASE;
    let mut last_err = None;
    for round in 0..=PERSIST_RETRIES {
        match attempt() {
            Ok(()) => return Ok(()),
            Err(e) => {
                if round < PERSIST_RETRIES {
                    warn!("queue persistence attempt {} failed: {e}", round + 1);
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
                last_err = Some(e);
            }
        }
    }
    Err(last_err.unwrap_or_else(|| anyhow::anyhow!("persistence failed")))
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
