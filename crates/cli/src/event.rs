// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The engine's command, query, and internal-event surfaces.
//!
//! `EngineCommand` is the serde face of every observable UI operation
//! (buttons, the manual-inject keyboard chord, the stdin control protocol
//! all reduce to it). Queries carry oneshot reply channels and are
//! therefore a separate, non-serde enum.

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::action_log::LogEntry;
use crate::detect::Status;
use crate::pty::ExitStatus;
use crate::queue::{HistoryEntry, Message};
use crate::terminal::TerminalId;
use crate::timer::TimerState;

/// Observable commands from the UI toward the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum EngineCommand {
    /// Queue a message; `terminal_id` defaults to the active terminal.
    Enqueue {
        content: String,
        #[serde(default)]
        terminal_id: Option<TerminalId>,
        /// Earliest start, epoch ms; defaults to now.
        #[serde(default)]
        execute_at: Option<u64>,
    },
    EditMessage { id: u64, content: String },
    DeleteMessage { id: u64 },
    Reorder { from: usize, to: usize },
    ClearQueue,
    /// Manual inject: execute the active terminal's queue head now,
    /// bypassing the stability gate (but not pause).
    InjectNext,
    /// Cancel in-flight injections; all terminals when `terminal_id` is
    /// absent.
    CancelInFlight {
        #[serde(default)]
        terminal_id: Option<TerminalId>,
    },
    PauseInjection,
    ResumeInjection,
    /// Clear all in-flight bookkeeping and re-run a scheduling pass.
    ForceReset,
    TimerSet { hours: u8, minutes: u8, seconds: u8 },
    TimerStart,
    TimerPause,
    TimerStop,
    TimerReset,
    SetAutoContinue { enabled: bool },
    AddKeywordRule {
        keyword: String,
        #[serde(default)]
        response: Option<String>,
    },
    RemoveKeywordRule { id: u64 },
    SwitchActiveTerminal { terminal_id: TerminalId },
    OpenTerminal {
        #[serde(default)]
        working_directory: Option<String>,
    },
    CloseTerminal { terminal_id: TerminalId },
    ResizeTerminal { terminal_id: TerminalId, cols: u16, rows: u16 },
}

/// Read-only queries answered over oneshot channels.
#[derive(Debug)]
pub enum EngineQuery {
    Status(oneshot::Sender<StatusSnapshot>),
    Queue(oneshot::Sender<Vec<Message>>),
    History(oneshot::Sender<Vec<HistoryEntry>>),
    SearchLog { needle: String, reply: oneshot::Sender<Vec<LogEntry>> },
    TailLog { n: usize, offset: usize, reply: oneshot::Sender<Vec<LogEntry>> },
}

/// Anything that can be sent into the engine channel.
#[derive(Debug)]
pub enum EngineRequest {
    Command(EngineCommand),
    Query(EngineQuery),
}

impl From<EngineCommand> for EngineRequest {
    fn from(cmd: EngineCommand) -> Self {
        Self::Command(cmd)
    }
}

/// Outcome of an auto-continue retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RespondOutcome {
    /// The prompt cleared after this many Return presses.
    Cleared { attempts: u32 },
    /// The prompt survived every attempt.
    Exhausted,
    /// A PTY write was rejected.
    WriteFailed,
}

/// Events from spawned helper tasks back into the engine loop. Typing
/// executors report through their own completion channel; everything else
/// arrives here.
#[derive(Debug)]
pub enum TaskEvent {
    /// The auto-continue responder finished its loop.
    AutoContinue { terminal_id: TerminalId, outcome: RespondOutcome },
    /// The trust prompt was acknowledged with a single Return.
    TrustAcknowledged { terminal_id: TerminalId },
    /// The keyword interruptor finished its Escape(+response) sequence.
    InterruptFinished { terminal_id: TerminalId, keyword: String, delivered_response: bool },
    /// A terminal's child process exited.
    TerminalExited { terminal_id: TerminalId, status: ExitStatus },
}

/// Global engine mode, derived for status reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineMode {
    Idle,
    TimerRunning,
    WaitingForUsageLimit,
    Injecting,
    Paused,
}

impl EngineMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::TimerRunning => "timer_running",
            Self::WaitingForUsageLimit => "waiting_for_usage_limit",
            Self::Injecting => "injecting",
            Self::Paused => "paused",
        }
    }
}

/// One terminal's row in the status snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerminalSummary {
    pub id: TerminalId,
    pub name: String,
    pub color: String,
    pub status: Status,
    pub injecting: bool,
    pub stable: bool,
    pub active: bool,
}

/// Countdown state in the status snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimerSummary {
    pub state: TimerState,
    pub display: String,
    pub naturally_completed: bool,
}

/// Point-in-time view of the whole engine, for the status query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub mode: EngineMode,
    pub timer: TimerSummary,
    pub queue_len: usize,
    pub history_len: usize,
    pub auto_continue: bool,
    pub waiting_for_usage_limit: bool,
    pub usage_limit_reset: Option<String>,
    pub terminals: Vec<TerminalSummary>,
    pub keyword_rules: Vec<KeywordRuleSummary>,
}

/// A keyword rule as reported in the status snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordRuleSummary {
    pub id: u64,
    pub keyword: String,
    pub response: Option<String>,
}
