// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::action_log::LogLevel;
use crate::terminal::TerminalId;

/// Engine error taxonomy. Every variant is recovered locally: nothing here
/// unwinds past the engine task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineError {
    /// A PTY write was rejected; the executor aborted and released the
    /// terminal, leaving the message at the head of the queue.
    TransientWrite { terminal_id: TerminalId, detail: String },
    /// Queue or history persistence failed after retries; in-memory state
    /// remains authoritative.
    Persistence { detail: String },
    /// Rejected at an operation boundary with no state mutation.
    InvalidInput { detail: String },
    /// In-flight bookkeeping disagreed with reality; resolved by a force
    /// reset.
    StaleState { detail: String },
    /// A terminal's child process exited.
    Fatal { terminal_id: TerminalId, detail: String },
}

impl EngineError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::TransientWrite { .. } => "TRANSIENT_WRITE",
            Self::Persistence { .. } => "PERSISTENCE",
            Self::InvalidInput { .. } => "INVALID_INPUT",
            Self::StaleState { .. } => "STALE_STATE",
            Self::Fatal { .. } => "FATAL",
        }
    }

    /// The action-log level this error is recorded at.
    pub fn log_level(&self) -> LogLevel {
        match self {
            Self::TransientWrite { .. } => LogLevel::Warning,
            Self::Persistence { .. } => LogLevel::Error,
            Self::InvalidInput { .. } => LogLevel::Warning,
            Self::StaleState { .. } => LogLevel::Warning,
            Self::Fatal { .. } => LogLevel::Error,
        }
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TransientWrite { terminal_id, detail } => {
                write!(f, "[{}] terminal {terminal_id}: {detail}", self.code())
            }
            Self::Fatal { terminal_id, detail } => {
                write!(f, "[{}] terminal {terminal_id}: {detail}", self.code())
            }
            Self::Persistence { detail } | Self::InvalidInput { detail } | Self::StaleState { detail } => {
                write!(f, "[{}] {detail}", self.code())
            }
        }
    }
}

impl std::error::Error for EngineError {}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
