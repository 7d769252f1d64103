// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only in-memory log of engine decisions.
//!
//! Bounded: at 10,000 entries the oldest half is dropped so the log holds
//! the most recent 5,000. Entries are mirrored to `tracing` so operators
//! see decisions live while tests and the status surface read the ring.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// Hard bound on retained entries.
const LOG_CAP: usize = 10_000;
/// Entries kept after an overflow trim.
const LOG_KEEP: usize = 5_000;

/// Severity of a logged engine decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Success,
    Warning,
    Error,
    Debug,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Success => "success",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Debug => "debug",
        }
    }
}

/// One logged decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp_ms: u64,
    pub level: LogLevel,
    pub message: String,
}

/// The bounded decision log.
#[derive(Debug, Default)]
pub struct ActionLog {
    entries: VecDeque<LogEntry>,
}

impl ActionLog {
    pub fn new() -> Self {
        Self { entries: VecDeque::new() }
    }

    /// Append an entry, trimming on overflow and mirroring to `tracing`.
    pub fn push(&mut self, level: LogLevel, message: impl Into<String>) {
        let message = message.into();
        match level {
            LogLevel::Info | LogLevel::Success => tracing::info!(target: "prompter::action", "{message}"),
            LogLevel::Warning => tracing::warn!(target: "prompter::action", "{message}"),
            LogLevel::Error => tracing::error!(target: "prompter::action", "{message}"),
            LogLevel::Debug => tracing::debug!(target: "prompter::action", "{message}"),
        }
        self.entries.push_back(LogEntry { timestamp_ms: now_ms(), level, message });
        if self.entries.len() > LOG_CAP {
            let excess = self.entries.len() - LOG_KEEP;
            self.entries.drain(..excess);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Case-insensitive substring search over messages, oldest first.
    pub fn search(&self, needle: &str) -> Vec<LogEntry> {
        let lower = needle.to_lowercase();
        self.entries
            .iter()
            .filter(|e| e.message.to_lowercase().contains(&lower))
            .cloned()
            .collect()
    }

    /// Page of the most recent entries: skip the newest `offset`, then
    /// return up to `n`, newest first.
    pub fn tail(&self, n: usize, offset: usize) -> Vec<LogEntry> {
        self.entries.iter().rev().skip(offset).take(n).cloned().collect()
    }
}

fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
#[path = "action_log_tests.rs"]
mod tests;
