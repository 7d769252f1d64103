// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine struct and the core `tokio::select!` loop.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::action_log::{ActionLog, LogEntry, LogLevel};
use crate::event::{EngineCommand, EngineQuery, EngineRequest, StatusSnapshot, TaskEvent};
use crate::executor::Completion;
use crate::interrupt::KeywordSet;
use crate::queue::{HistoryEntry, Message, MessageHistory, MessageQueue};
use crate::settings::{
    KEY_AUTO_CONTINUE, KEY_TIMER_VALUE, KEY_USAGE_LIMIT_RESET, KEY_USAGE_LIMIT_RESETS_AT,
};
use crate::terminal::{Terminal, TerminalId};
use crate::timer::{Countdown, TimerValue};
use crate::usage_limit::UsageLimitSync;

use super::dispatch;
use super::EngineConfig;

/// Mutable engine state, owned exclusively by the engine task.
pub struct EngineState {
    pub queue: MessageQueue,
    pub history: MessageHistory,
    pub timer: Countdown,
    pub sync: UsageLimitSync,
    pub keywords: KeywordSet,
    pub terminals: BTreeMap<TerminalId, Terminal>,
    pub next_terminal_id: TerminalId,
    pub active_terminal: TerminalId,
    pub paused: bool,
    pub waiting_for_usage_limit: bool,
    pub auto_continue: bool,
    /// In-flight injection per terminal (the at-most-one invariant lives
    /// here: a map keyed by terminal cannot hold two entries for one).
    pub in_flight: HashMap<TerminalId, InFlight>,
    /// Monotone launch counter distinguishing executor generations.
    pub next_injection_id: u64,
    /// Terminal that announced the current usage limit.
    pub limit_terminal: Option<TerminalId>,
    pub log: ActionLog,
    /// Scheduler wake-up deadline, armed by planning passes.
    pub wake_at: Option<Instant>,
    /// Re-entry guard for scheduling passes.
    pub scheduling: bool,
    /// Executor freeze gate: `true` while paused or waiting.
    pub gate_tx: watch::Sender<bool>,
}

/// One launched injection: which message, and which executor generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InFlight {
    pub message_id: u64,
    pub injection_id: u64,
}

/// Channel ends cloned into helper tasks.
#[derive(Clone)]
pub struct Channels {
    pub output_tx: mpsc::Sender<(TerminalId, Bytes)>,
    pub events_tx: mpsc::Sender<TaskEvent>,
    pub completions_tx: mpsc::Sender<Completion>,
}

/// The engine: owns all mutable state and runs the select loop.
pub struct Engine {
    pub(super) cfg: EngineConfig,
    pub(super) state: EngineState,
    pub(super) channels: Channels,
    requests_rx: mpsc::Receiver<EngineRequest>,
    output_rx: mpsc::Receiver<(TerminalId, Bytes)>,
    events_rx: mpsc::Receiver<TaskEvent>,
    completions_rx: mpsc::Receiver<Completion>,
}

/// Cloneable command/query surface of a running engine.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    pub async fn command(&self, cmd: EngineCommand) -> anyhow::Result<()> {
        self.tx
            .send(EngineRequest::Command(cmd))
            .await
            .map_err(|_| anyhow::anyhow!("engine stopped"))
    }

    pub async fn status(&self) -> anyhow::Result<StatusSnapshot> {
        self.query(EngineQuery::Status).await
    }

    pub async fn queue(&self) -> anyhow::Result<Vec<Message>> {
        self.query(EngineQuery::Queue).await
    }

    pub async fn history(&self) -> anyhow::Result<Vec<HistoryEntry>> {
        self.query(EngineQuery::History).await
    }

    pub async fn search_log(&self, needle: &str) -> anyhow::Result<Vec<LogEntry>> {
        let needle = needle.to_owned();
        self.query(move |reply| EngineQuery::SearchLog { needle, reply }).await
    }

    pub async fn tail_log(&self, n: usize, offset: usize) -> anyhow::Result<Vec<LogEntry>> {
        self.query(move |reply| EngineQuery::TailLog { n, offset, reply }).await
    }

    /// The raw request sender, for wiring external readers.
    pub fn sender(&self) -> mpsc::Sender<EngineRequest> {
        self.tx.clone()
    }

    async fn query<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> EngineQuery,
    ) -> anyhow::Result<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Query(build(reply_tx)))
            .await
            .map_err(|_| anyhow::anyhow!("engine stopped"))?;
        reply_rx.await.map_err(|_| anyhow::anyhow!("engine dropped the query"))
    }
}

impl Engine {
    /// Build the engine: restore persisted state and open the configured
    /// number of terminals. Must be called inside a tokio runtime (backend
    /// tasks are spawned here).
    pub fn new(cfg: EngineConfig) -> anyhow::Result<(Self, EngineHandle)> {
        let (requests_tx, requests_rx) = mpsc::channel(64);
        let (output_tx, output_rx) = mpsc::channel(256);
        let (events_tx, events_rx) = mpsc::channel(64);
        let (completions_tx, completions_rx) = mpsc::channel(64);
        let (gate_tx, _) = watch::channel(false);

        let mut log = ActionLog::new();

        let queue = match cfg.settings.load_message_queue() {
            Ok(items) => MessageQueue::from_persisted(items),
            Err(e) => {
                log.push(LogLevel::Error, format!("failed to load queue: {e}"));
                MessageQueue::new()
            }
        };
        let history = match cfg.settings.load_message_history() {
            Ok(entries) => MessageHistory::from_persisted(entries),
            Err(e) => {
                log.push(LogLevel::Error, format!("failed to load history: {e}"));
                MessageHistory::new()
            }
        };
        let mut sync = UsageLimitSync::new(cfg.settings.get_app_state(KEY_USAGE_LIMIT_RESET));

        let mut timer = Countdown::new();
        if let Some(value) = cfg
            .settings
            .get(KEY_TIMER_VALUE)
            .and_then(|v| serde_json::from_value::<TimerValue>(v).ok())
        {
            timer.edit(value);
        }

        let auto_continue = cfg
            .settings
            .get(KEY_AUTO_CONTINUE)
            .and_then(|v| v.as_bool())
            .unwrap_or(cfg.auto_continue);

        // Resume an interrupted usage-limit wait: the absolute reset time
        // is persisted exactly so a restart lands back in waiting mode.
        let mut waiting_for_usage_limit = false;
        if let Some(epoch) = cfg
            .settings
            .get_app_state(KEY_USAGE_LIMIT_RESETS_AT)
            .and_then(|s| s.parse::<i64>().ok())
        {
            let now = chrono::Utc::now().timestamp();
            if epoch > now {
                timer.edit(TimerValue::from_duration(Duration::from_secs((epoch - now) as u64)));
                let _ = timer.start();
                waiting_for_usage_limit = true;
                log.push(LogLevel::Info, format!("resuming usage-limit wait ({})", timer.display()));
            } else {
                // The reset moment passed while we were down.
                sync.clear();
                let _ = cfg.settings.set_app_state(KEY_USAGE_LIMIT_RESET, None);
                let _ = cfg.settings.set_app_state(KEY_USAGE_LIMIT_RESETS_AT, None);
            }
        }

        let mut state = EngineState {
            queue,
            history,
            timer,
            sync,
            keywords: KeywordSet::new(),
            terminals: BTreeMap::new(),
            next_terminal_id: 1,
            active_terminal: 1,
            paused: false,
            waiting_for_usage_limit,
            auto_continue,
            in_flight: HashMap::new(),
            next_injection_id: 1,
            limit_terminal: None,
            log,
            wake_at: None,
            scheduling: false,
            gate_tx,
        };

        state.gate_tx.send_replace(state.waiting_for_usage_limit);

        let channels = Channels { output_tx, events_tx, completions_tx };

        for _ in 0..cfg.terminals {
            dispatch::open_terminal(&mut state, &cfg, &channels, cfg.workdir.as_deref())?;
        }
        state.active_terminal = state.terminals.keys().next().copied().unwrap_or(1);

        let engine = Self {
            cfg,
            state,
            channels,
            requests_rx,
            output_rx,
            events_rx,
            completions_rx,
        };
        Ok((engine, EngineHandle { tx: requests_tx }))
    }

    /// Run the engine loop until shutdown.
    pub async fn run(mut self) -> anyhow::Result<()> {
        let mut tick = tokio::time::interval(Duration::from_secs(1));
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut requests_open = true;

        self.state.log.push(LogLevel::Info, "engine started");
        // Initial pass picks up any queue restored from disk.
        dispatch::schedule_pass(&mut self.state, &self.cfg, &self.channels).await;

        loop {
            tokio::select! {
                // 1. Terminal output → window, classification, reactions.
                Some((terminal_id, bytes)) = self.output_rx.recv() => {
                    dispatch::feed_output(
                        &mut self.state, &self.cfg, &self.channels, terminal_id, &bytes,
                    ).await;
                }

                // 2. Commands and queries from the UI surface.
                req = self.requests_rx.recv(), if requests_open => {
                    match req {
                        Some(EngineRequest::Command(cmd)) => {
                            dispatch::handle_command(
                                &mut self.state, &self.cfg, &self.channels, cmd,
                            ).await;
                        }
                        Some(EngineRequest::Query(query)) => {
                            dispatch::handle_query(&self.state, &self.cfg, query);
                        }
                        None => {
                            debug!("request channel closed");
                            requests_open = false;
                        }
                    }
                }

                // 3. Typing executor completions.
                Some(completion) = self.completions_rx.recv() => {
                    dispatch::handle_completion(
                        &mut self.state, &self.cfg, &self.channels, completion,
                    ).await;
                }

                // 4. Responder / interrupt / terminal-exit events.
                Some(event) = self.events_rx.recv() => {
                    dispatch::handle_task_event(&mut self.state, &self.cfg, &self.channels, event);
                }

                // 5. Countdown tick (1 s cadence).
                _ = tick.tick() => {
                    dispatch::handle_tick(&mut self.state, &self.cfg, &self.channels).await;
                }

                // 6. Scheduler wake-up timer.
                _ = async {
                    match self.state.wake_at {
                        Some(at) => tokio::time::sleep_until(at).await,
                        None => std::future::pending().await,
                    }
                }, if self.state.wake_at.is_some() => {
                    self.state.wake_at = None;
                    dispatch::schedule_pass(&mut self.state, &self.cfg, &self.channels).await;
                }

                // 7. Shutdown.
                _ = self.cfg.shutdown.cancelled() => {
                    debug!("shutdown signal received");
                    break;
                }
            }
        }

        // Stop every helper task and release the power blocker.
        for terminal in self.state.terminals.values_mut() {
            terminal.cancel_tasks();
        }
        self.state.in_flight.clear();
        if self.cfg.power_save_block {
            self.cfg.platform.power.stop();
        }
        self.state
            .log
            .push(LogLevel::Info, format!("engine stopped ({} queued)", self.state.queue.len()));
        if let Err(e) = self.cfg.settings.save_message_queue(self.state.queue.items()) {
            warn!("final queue persistence failed: {e}");
        }
        Ok(())
    }
}
