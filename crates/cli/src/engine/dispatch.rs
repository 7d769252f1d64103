// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Transition helpers for the engine select-loop.
//!
//! Each function takes the mutable [`EngineState`] plus the minimal set of
//! collaborators it needs, so the pieces stay independently testable and
//! the select-loop body stays readable.

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::action_log::LogLevel;
use crate::detect::Status;
use crate::error::EngineError;
use crate::event::{
    EngineCommand, EngineMode, EngineQuery, KeywordRuleSummary, RespondOutcome, StatusSnapshot,
    TaskEvent, TerminalSummary, TimerSummary,
};
use crate::executor::{self, Completion, Outcome, TypingJob};
use crate::interrupt::{self, KeywordRule};
use crate::pty::ExitStatus;
use crate::queue;
use crate::respond;
use crate::scheduler::{self, Gates};
use crate::settings::{
    KEY_AUTO_CONTINUE, KEY_TIMER_VALUE, KEY_USAGE_LIMIT_RESET, KEY_USAGE_LIMIT_RESETS_AT,
};
use crate::terminal::{Terminal, TerminalId, MAX_TERMINALS};
use crate::timer::{Tick, TimerValue};

use super::run::{Channels, EngineState, InFlight};
use super::EngineConfig;

/// Message text injected after a usage-limit wait ends.
const CONTINUE_MESSAGE: &str = "continue";

/// Sound asset played on successful delivery.
const COMPLETE_SOUND: &str = "injection-complete";

pub(super) fn now_epoch_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Record an engine error in the action log at its taxonomy level.
fn record_error(state: &mut EngineState, error: EngineError) {
    state.log.push(error.log_level(), error.to_string());
}

/// Recompute the executor freeze gate from the pause/waiting flags.
fn update_gate(state: &mut EngineState) {
    let halted = state.paused || state.waiting_for_usage_limit;
    state.gate_tx.send_replace(halted);
}

fn update_badge(state: &EngineState, cfg: &EngineConfig) {
    cfg.platform.tray.set_queue_badge(state.queue.len());
}

/// Derive the reported engine mode from the underlying flags.
pub(super) fn engine_mode(state: &EngineState) -> EngineMode {
    if state.paused {
        EngineMode::Paused
    } else if state.waiting_for_usage_limit {
        EngineMode::WaitingForUsageLimit
    } else if !state.in_flight.is_empty() {
        EngineMode::Injecting
    } else if state.timer.state() == crate::timer::TimerState::Running {
        EngineMode::TimerRunning
    } else {
        EngineMode::Idle
    }
}

async fn persist_queue_logged(state: &mut EngineState, cfg: &EngineConfig) {
    if let Err(e) = queue::persist_queue(cfg.settings.as_ref(), &state.queue).await {
        record_error(state, EngineError::Persistence { detail: e.to_string() });
    }
}

async fn persist_history_logged(state: &mut EngineState, cfg: &EngineConfig) {
    if let Err(e) = queue::persist_history(cfg.settings.as_ref(), &state.history).await {
        record_error(state, EngineError::Persistence { detail: e.to_string() });
    }
}

/// Spawn a terminal: backend task, output pump, and registry entry.
pub(super) fn open_terminal(
    state: &mut EngineState,
    cfg: &EngineConfig,
    channels: &Channels,
    working_directory: Option<&str>,
) -> anyhow::Result<TerminalId> {
    if state.terminals.len() >= MAX_TERMINALS {
        anyhow::bail!("terminal limit reached ({MAX_TERMINALS})");
    }

    let mut backend = (cfg.backend_factory)(working_directory)?;
    let id = state.next_terminal_id;
    state.next_terminal_id += 1;

    let _ = backend.resize(cfg.cols, cfg.rows);

    let (pty_out_tx, mut pty_out_rx) = mpsc::channel::<Bytes>(256);
    let (input_tx, input_rx) = mpsc::channel::<Bytes>(256);
    let (resize_tx, resize_rx) = mpsc::channel(4);

    let events_tx = channels.events_tx.clone();
    tokio::spawn(async move {
        let status = match backend.run(pty_out_tx, input_rx, resize_rx).await {
            Ok(status) => status,
            Err(e) => {
                warn!("terminal {id} backend error: {e}");
                ExitStatus { code: Some(1), signal: None }
            }
        };
        let _ = events_tx.send(TaskEvent::TerminalExited { terminal_id: id, status }).await;
    });

    let output_tx = channels.output_tx.clone();
    tokio::spawn(async move {
        while let Some(bytes) = pty_out_rx.recv().await {
            if output_tx.send((id, bytes)).await.is_err() {
                break;
            }
        }
    });

    let mut terminal = Terminal::new(id, cfg.window_size, input_tx, resize_tx);
    // A silent terminal is idle from the moment it opens; the stability
    // clock starts here rather than at its first output.
    terminal.stability.observe(Status::Idle, Instant::now());
    state.terminals.insert(id, terminal);
    state.log.push(LogLevel::Info, format!("terminal {id} opened"));
    Ok(id)
}

/// Feed terminal output through detection and react to the verdict.
pub(super) async fn feed_output(
    state: &mut EngineState,
    cfg: &EngineConfig,
    channels: &Channels,
    terminal_id: TerminalId,
    bytes: &[u8],
) {
    let now = Instant::now();
    let Some((prev_status, observation)) = ({
        state.terminals.get_mut(&terminal_id).map(|term| {
            let prev = term.observation.status;
            (prev, term.feed(bytes, now))
        })
    }) else {
        return;
    };

    if let Some(reset) = observation.usage_limit.clone() {
        handle_usage_limit(state, cfg, terminal_id, &reset);
    }

    if observation.status != prev_status {
        state.log.push(
            LogLevel::Debug,
            format!("terminal {terminal_id}: {prev_status} -> {}", observation.status),
        );
        // A trust responder whose dialog was answered by hand never
        // reports; release its slot when the verdict moves on.
        if prev_status == Status::TrustAsked {
            if let Some(term) = state.terminals.get_mut(&terminal_id) {
                if let Some(token) = term.responder_cancel.take() {
                    token.cancel();
                }
            }
        }
    }

    react(state, cfg, channels, terminal_id, &observation, now);

    if observation.status != prev_status {
        schedule_pass(state, cfg, channels).await;
    }
}

/// Spawn responders appropriate to the current verdict: the keyword
/// interruptor takes precedence over auto-continue for the same prompt.
fn react(
    state: &mut EngineState,
    cfg: &EngineConfig,
    channels: &Channels,
    terminal_id: TerminalId,
    observation: &crate::detect::Observation,
    now: Instant,
) {
    if !state.auto_continue {
        return;
    }

    if observation.status == Status::Prompting {
        let matched: Option<KeywordRule> = {
            let Some(term) = state.terminals.get(&terminal_id) else { return };
            if term.interrupt_armed && term.interrupt_cancel.is_none() {
                let region = term.prompt_region();
                state.keywords.match_region(&region).cloned()
            } else {
                None
            }
        };
        if let Some(rule) = matched {
            fire_interrupt(state, cfg, channels, terminal_id, rule, now);
            return;
        }
    }

    match observation.status {
        Status::Prompting => maybe_auto_continue(state, cfg, channels, terminal_id, now),
        Status::TrustAsked => maybe_trust_ack(state, cfg, channels, terminal_id),
        _ if observation.proceed_prompt => {
            maybe_auto_continue(state, cfg, channels, terminal_id, now)
        }
        _ => {}
    }
}

/// Start the auto-continue retry loop unless something suppresses it.
fn maybe_auto_continue(
    state: &mut EngineState,
    cfg: &EngineConfig,
    channels: &Channels,
    terminal_id: TerminalId,
    now: Instant,
) {
    let Some(term) = state.terminals.get_mut(&terminal_id) else { return };
    if term.injecting
        || term.responder_cancel.is_some()
        || term.interrupt_cancel.is_some()
        || term.auto_continue_suppressed(now)
    {
        return;
    }
    let cancel = CancellationToken::new();
    term.responder_cancel = Some(cancel.clone());
    respond::spawn_auto_continue(
        terminal_id,
        term.status_rx(),
        term.input_tx.clone(),
        cancel,
        channels.events_tx.clone(),
        cfg.respond,
    );
    state.log.push(LogLevel::Debug, format!("auto-continue engaged on terminal {terminal_id}"));
}

/// Acknowledge the trust dialog with a single delayed Return.
fn maybe_trust_ack(
    state: &mut EngineState,
    cfg: &EngineConfig,
    channels: &Channels,
    terminal_id: TerminalId,
) {
    let Some(term) = state.terminals.get_mut(&terminal_id) else { return };
    if term.responder_cancel.is_some() {
        return;
    }
    let cancel = CancellationToken::new();
    term.responder_cancel = Some(cancel.clone());
    respond::spawn_trust_ack(
        terminal_id,
        term.status_rx(),
        term.input_tx.clone(),
        cancel,
        channels.events_tx.clone(),
        cfg.respond,
    );
    state.log.push(LogLevel::Info, format!("trust prompt detected on terminal {terminal_id}"));
}

/// Fire the keyword interruptor: Escape, optional typed response.
fn fire_interrupt(
    state: &mut EngineState,
    cfg: &EngineConfig,
    channels: &Channels,
    terminal_id: TerminalId,
    rule: KeywordRule,
    now: Instant,
) {
    let keyword = rule.keyword.clone();
    {
        let Some(term) = state.terminals.get_mut(&terminal_id) else { return };
        term.interrupt_armed = false;
        if let Some(token) = term.responder_cancel.take() {
            token.cancel();
        }
        let cancel = CancellationToken::new();
        term.interrupt_cancel = Some(cancel.clone());
        term.suppress_auto_continue_until = Some(now + cfg.interrupt.suppress.sample());
        interrupt::spawn_interrupt(
            terminal_id,
            rule,
            term.input_tx.clone(),
            cancel,
            channels.events_tx.clone(),
            cfg.interrupt,
        );
    }
    state.log.push(
        LogLevel::Info,
        format!("keyword \"{keyword}\" matched on terminal {terminal_id}; sending Escape"),
    );
}

/// Process a fresh usage-limit announcement.
fn handle_usage_limit(
    state: &mut EngineState,
    cfg: &EngineConfig,
    terminal_id: TerminalId,
    reset: &str,
) {
    let Some(plan) = state.sync.observe(reset, chrono::Local::now()) else {
        return;
    };
    state.timer.edit(plan.timer);
    let _ = state.timer.start();
    state.waiting_for_usage_limit = true;
    state.limit_terminal = Some(terminal_id);
    update_gate(state);

    if let Err(e) = cfg.settings.set_app_state(KEY_USAGE_LIMIT_RESET, Some(&plan.reset)) {
        record_error(state, EngineError::Persistence { detail: e.to_string() });
    }
    if let Err(e) = cfg
        .settings
        .set_app_state(KEY_USAGE_LIMIT_RESETS_AT, Some(&plan.resets_at_epoch.to_string()))
    {
        record_error(state, EngineError::Persistence { detail: e.to_string() });
    }
    state.log.push(
        LogLevel::Warning,
        format!(
            "usage limit reached on terminal {terminal_id}; waiting {} until {}",
            state.timer.display(),
            plan.reset
        ),
    );
}

/// One second of countdown.
pub(super) async fn handle_tick(state: &mut EngineState, cfg: &EngineConfig, channels: &Channels) {
    match state.timer.tick() {
        Tick::None | Tick::Display => {}
        Tick::Expired => handle_timer_expired(state, cfg, channels).await,
    }
}

/// The countdown reached zero.
async fn handle_timer_expired(state: &mut EngineState, cfg: &EngineConfig, channels: &Channels) {
    state.log.push(LogLevel::Success, "timer completed");
    if !state.waiting_for_usage_limit {
        return;
    }

    state.waiting_for_usage_limit = false;
    update_gate(state);
    state.sync.clear();
    if let Err(e) = cfg.settings.set_app_state(KEY_USAGE_LIMIT_RESET, None) {
        record_error(state, EngineError::Persistence { detail: e.to_string() });
    }
    if let Err(e) = cfg.settings.set_app_state(KEY_USAGE_LIMIT_RESETS_AT, None) {
        record_error(state, EngineError::Persistence { detail: e.to_string() });
    }

    // Scrub windows so the lingering announcement cannot re-trigger.
    for terminal in state.terminals.values_mut() {
        terminal.window.clear();
    }

    let target = state
        .limit_terminal
        .take()
        .filter(|t| state.terminals.contains_key(t))
        .unwrap_or(state.active_terminal);
    match state.queue.enqueue_front(CONTINUE_MESSAGE, target, now_epoch_ms()) {
        Ok(message) => {
            let id = message.id;
            state.log.push(
                LogLevel::Info,
                format!("usage limit over; queued \"{CONTINUE_MESSAGE}\" (message {id}) for terminal {target}"),
            );
        }
        Err(e) => record_error(state, EngineError::StaleState { detail: e.to_string() }),
    }
    persist_queue_logged(state, cfg).await;
    update_badge(state, cfg);
    schedule_pass(state, cfg, channels).await;
}

/// One scheduling pass: plan over snapshots, start everything startable,
/// arm the wake-up timer.
pub(super) async fn schedule_pass(state: &mut EngineState, cfg: &EngineConfig, channels: &Channels) {
    if state.scheduling {
        return;
    }
    state.scheduling = true;

    let now = Instant::now();
    let now_ms = now_epoch_ms();
    let views: Vec<_> =
        state.terminals.values().map(|t| t.view(cfg.stability_threshold, now)).collect();
    let gates =
        Gates { paused: state.paused, waiting_for_usage_limit: state.waiting_for_usage_limit };
    let in_flight: Vec<u64> = state.in_flight.values().map(|f| f.message_id).collect();

    let plan = scheduler::plan(&state.queue, &views, gates, &in_flight, now_ms);
    if !plan.starts.is_empty() {
        debug!("scheduling pass starting {} injection(s)", plan.starts.len());
    }
    for start in &plan.starts {
        start_injection(state, cfg, channels, start.message_id, start.terminal_id, false);
    }
    state.wake_at = plan.wake_after.map(|d| now + d);

    state.scheduling = false;
}

/// Launch a typing executor for a chosen (message, terminal) pair.
fn start_injection(
    state: &mut EngineState,
    cfg: &EngineConfig,
    channels: &Channels,
    message_id: u64,
    terminal_id: TerminalId,
    manual: bool,
) {
    let Some(message) = state.queue.get(message_id).cloned() else {
        record_error(
            state,
            EngineError::StaleState { detail: format!("message {message_id} vanished before start") },
        );
        return;
    };

    let launch = {
        let Some(term) = state.terminals.get_mut(&terminal_id) else {
            return;
        };
        if term.injecting {
            None
        } else {
            // Auto-continue must not race the injection's own keystrokes.
            if let Some(token) = term.responder_cancel.take() {
                token.cancel();
            }
            let cancel = CancellationToken::new();
            term.executor_cancel = Some(cancel.clone());
            term.injecting = true;
            Some((term.input_tx.clone(), cancel))
        }
    };
    let Some((input_tx, cancel)) = launch else {
        record_error(
            state,
            EngineError::StaleState {
                detail: format!("terminal {terminal_id} already injecting"),
            },
        );
        return;
    };

    let injection_id = state.next_injection_id;
    state.next_injection_id += 1;
    state.in_flight.insert(terminal_id, InFlight { message_id, injection_id });
    executor::spawn(TypingJob {
        injection_id,
        message_id,
        terminal_id,
        text: message.processed_content.clone(),
        input_tx,
        gate_rx: state.gate_tx.subscribe(),
        cancel,
        done_tx: channels.completions_tx.clone(),
        pacing: cfg.pacing,
    });

    if cfg.power_save_block && state.in_flight.len() == 1 {
        cfg.platform.power.start();
    }
    let prefix = if manual { "manually " } else { "" };
    state.log.push(
        LogLevel::Info,
        format!("{prefix}injecting message {message_id} into terminal {terminal_id}"),
    );
}

/// A typing executor finished. Idempotent: stale completions (after a
/// force reset or terminal close) are ignored.
pub(super) async fn handle_completion(
    state: &mut EngineState,
    cfg: &EngineConfig,
    channels: &Channels,
    completion: Completion,
) {
    let Completion { injection_id, message_id, terminal_id, outcome } = completion;
    // A completion only counts if it belongs to the launch currently
    // recorded for this terminal; anything else is an echo of a reset or
    // close that already released it.
    if state.in_flight.get(&terminal_id).map(|f| f.injection_id) != Some(injection_id) {
        debug!("stale completion for message {message_id} on terminal {terminal_id}");
        return;
    }
    state.in_flight.remove(&terminal_id);
    if let Some(term) = state.terminals.get_mut(&terminal_id) {
        term.injecting = false;
        term.executor_cancel = None;
        // Idle time starts over at the injection's end, even if the
        // terminal never echoes another byte.
        term.stability.reset();
        term.stability.observe(term.observation.status, Instant::now());
    }

    match outcome {
        Outcome::Delivered => {
            if let Some(entry) = state.queue.complete(message_id, now_epoch_ms()) {
                state.history.push(entry);
                persist_queue_logged(state, cfg).await;
                persist_history_logged(state, cfg).await;
            }
            state.log.push(
                LogLevel::Success,
                format!("message {message_id} delivered to terminal {terminal_id}"),
            );
            if cfg.sound {
                cfg.platform.sound.play(COMPLETE_SOUND);
            }
            update_badge(state, cfg);
            schedule_pass(state, cfg, channels).await;
        }
        Outcome::Cancelled => {
            state.log.push(
                LogLevel::Info,
                format!("injection of message {message_id} cancelled; message stays queued"),
            );
        }
        Outcome::WriteFailed(detail) => {
            record_error(state, EngineError::TransientWrite { terminal_id, detail });
        }
    }

    if state.in_flight.is_empty() && cfg.power_save_block {
        cfg.platform.power.stop();
    }
}

/// Events from responder, interruptor, and backend tasks.
pub(super) fn handle_task_event(
    state: &mut EngineState,
    cfg: &EngineConfig,
    channels: &Channels,
    event: TaskEvent,
) {
    match event {
        TaskEvent::AutoContinue { terminal_id, outcome } => {
            if let Some(term) = state.terminals.get_mut(&terminal_id) {
                term.responder_cancel = None;
            }
            match outcome {
                RespondOutcome::Cleared { attempts } => state.log.push(
                    LogLevel::Success,
                    format!("prompt on terminal {terminal_id} cleared after {attempts} return(s)"),
                ),
                RespondOutcome::Exhausted => state.log.push(
                    LogLevel::Error,
                    format!("auto-continue gave up on terminal {terminal_id} after 10 attempts"),
                ),
                RespondOutcome::WriteFailed => record_error(
                    state,
                    EngineError::TransientWrite {
                        terminal_id,
                        detail: "auto-continue return press rejected".to_owned(),
                    },
                ),
            }
        }
        TaskEvent::TrustAcknowledged { terminal_id } => {
            if let Some(term) = state.terminals.get_mut(&terminal_id) {
                term.responder_cancel = None;
            }
            state
                .log
                .push(LogLevel::Info, format!("trust prompt on terminal {terminal_id} acknowledged"));
        }
        TaskEvent::InterruptFinished { terminal_id, keyword, delivered_response } => {
            if let Some(term) = state.terminals.get_mut(&terminal_id) {
                term.interrupt_cancel = None;
            }
            let detail = if delivered_response { " and response typed" } else { "" };
            state.log.push(
                LogLevel::Success,
                format!("keyword \"{keyword}\" interrupt on terminal {terminal_id} done{detail}"),
            );
        }
        TaskEvent::TerminalExited { terminal_id, status } => {
            handle_terminal_exit(state, cfg, channels, terminal_id, status);
        }
    }
}

/// The child process behind a terminal is gone.
fn handle_terminal_exit(
    state: &mut EngineState,
    cfg: &EngineConfig,
    _channels: &Channels,
    terminal_id: TerminalId,
    status: ExitStatus,
) {
    if let Some(mut term) = state.terminals.remove(&terminal_id) {
        term.cancel_tasks();
    } else {
        return;
    }
    if state.in_flight.remove(&terminal_id).is_some() {
        state.log.push(
            LogLevel::Info,
            format!("terminal {terminal_id} exited mid-injection; message stays queued"),
        );
    }
    record_error(
        state,
        EngineError::Fatal {
            terminal_id,
            detail: format!("process exited (code {:?}, signal {:?})", status.code, status.signal),
        },
    );
    if state.active_terminal == terminal_id {
        if let Some(&first) = state.terminals.keys().next() {
            state.active_terminal = first;
        }
    }
    if state.in_flight.is_empty() && cfg.power_save_block {
        cfg.platform.power.stop();
    }
}

/// Dispatch one observable command.
pub(super) async fn handle_command(
    state: &mut EngineState,
    cfg: &EngineConfig,
    channels: &Channels,
    command: EngineCommand,
) {
    match command {
        EngineCommand::Enqueue { content, terminal_id, execute_at } => {
            let target = terminal_id.unwrap_or(state.active_terminal);
            if !state.terminals.contains_key(&target) {
                record_error(
                    state,
                    EngineError::InvalidInput { detail: format!("no terminal {target}") },
                );
                return;
            }
            match state.queue.enqueue(&content, target, now_epoch_ms(), execute_at) {
                Ok(message) => {
                    let id = message.id;
                    state
                        .log
                        .push(LogLevel::Info, format!("message {id} queued for terminal {target}"));
                }
                Err(e) => {
                    record_error(state, EngineError::InvalidInput { detail: e.to_string() });
                    return;
                }
            }
            persist_queue_logged(state, cfg).await;
            update_badge(state, cfg);
            schedule_pass(state, cfg, channels).await;
        }

        EngineCommand::EditMessage { id, content } => {
            match state.queue.update(id, &content) {
                Ok(()) => {
                    state.log.push(LogLevel::Info, format!("message {id} edited"));
                    persist_queue_logged(state, cfg).await;
                }
                Err(e) => record_error(state, EngineError::InvalidInput { detail: e.to_string() }),
            }
        }

        EngineCommand::DeleteMessage { id } => {
            // Deleting an in-flight message cancels its executor first.
            let holder = state
                .in_flight
                .iter()
                .find(|(_, f)| f.message_id == id)
                .map(|(&tid, _)| tid);
            if let Some(tid) = holder {
                if let Some(term) = state.terminals.get_mut(&tid) {
                    if let Some(token) = term.executor_cancel.take() {
                        token.cancel();
                    }
                    term.injecting = false;
                }
                state.in_flight.remove(&tid);
            }
            match state.queue.remove(id) {
                Ok(_) => {
                    state.log.push(LogLevel::Info, format!("message {id} deleted"));
                    persist_queue_logged(state, cfg).await;
                    update_badge(state, cfg);
                }
                Err(e) => record_error(state, EngineError::InvalidInput { detail: e.to_string() }),
            }
        }

        EngineCommand::Reorder { from, to } => match state.queue.reorder(from, to) {
            Ok(()) => {
                state.log.push(LogLevel::Info, format!("queue reordered ({from} -> {to})"));
                persist_queue_logged(state, cfg).await;
            }
            Err(e) => record_error(state, EngineError::InvalidInput { detail: e.to_string() }),
        },

        EngineCommand::ClearQueue => {
            cancel_in_flight(state, None);
            state.queue.clear();
            state.log.push(LogLevel::Info, "queue cleared");
            persist_queue_logged(state, cfg).await;
            update_badge(state, cfg);
        }

        EngineCommand::InjectNext => {
            if state.paused {
                state.log.push(LogLevel::Warning, "manual inject ignored while paused");
                return;
            }
            let target = state.active_terminal;
            if state.in_flight.contains_key(&target) {
                state
                    .log
                    .push(LogLevel::Warning, format!("terminal {target} is already injecting"));
                return;
            }
            let in_flight: Vec<u64> = state.in_flight.values().map(|f| f.message_id).collect();
            let Some(message_id) = state.queue.head_for(target, &in_flight).map(|m| m.id) else {
                state
                    .log
                    .push(LogLevel::Warning, format!("no queued message for terminal {target}"));
                return;
            };
            start_injection(state, cfg, channels, message_id, target, true);
        }

        EngineCommand::CancelInFlight { terminal_id } => {
            cancel_in_flight(state, terminal_id);
        }

        EngineCommand::PauseInjection => {
            state.paused = true;
            update_gate(state);
            state.log.push(LogLevel::Info, "injection paused");
        }

        EngineCommand::ResumeInjection => {
            state.paused = false;
            update_gate(state);
            state.log.push(LogLevel::Info, "injection resumed");
            schedule_pass(state, cfg, channels).await;
        }

        EngineCommand::ForceReset => {
            for terminal in state.terminals.values_mut() {
                terminal.cancel_tasks();
            }
            state.in_flight.clear();
            if cfg.power_save_block {
                cfg.platform.power.stop();
            }
            state.log.push(LogLevel::Info, "injection state reset");
            schedule_pass(state, cfg, channels).await;
        }

        EngineCommand::TimerSet { hours, minutes, seconds } => {
            match TimerValue::new(hours, minutes, seconds) {
                Ok(value) => {
                    state.timer.edit(value);
                    if let Ok(json) = serde_json::to_value(value) {
                        if let Err(e) = cfg.settings.set(KEY_TIMER_VALUE, json) {
                            record_error(state, EngineError::Persistence { detail: e.to_string() });
                        }
                    }
                    state.log.push(LogLevel::Info, format!("timer set to {value}"));
                }
                Err(e) => record_error(state, EngineError::InvalidInput { detail: e.to_string() }),
            }
        }

        EngineCommand::TimerStart => {
            if state.timer.start() {
                state.log.push(LogLevel::Info, format!("timer started ({})", state.timer.display()));
            } else {
                record_error(
                    state,
                    EngineError::InvalidInput {
                        detail: "timer cannot start (zero value or already running)".to_owned(),
                    },
                );
            }
        }

        EngineCommand::TimerPause => {
            if state.timer.pause() {
                state.log.push(LogLevel::Info, format!("timer paused at {}", state.timer.display()));
            } else {
                record_error(
                    state,
                    EngineError::InvalidInput { detail: "timer is not running".to_owned() },
                );
            }
        }

        EngineCommand::TimerStop | EngineCommand::TimerReset => {
            state.timer.stop();
            state
                .log
                .push(LogLevel::Info, format!("timer stopped ({} restored)", state.timer.display()));
        }

        EngineCommand::SetAutoContinue { enabled } => {
            state.auto_continue = enabled;
            if let Err(e) = cfg.settings.set(KEY_AUTO_CONTINUE, serde_json::Value::Bool(enabled)) {
                record_error(state, EngineError::Persistence { detail: e.to_string() });
            }
            if !enabled {
                for terminal in state.terminals.values_mut() {
                    if let Some(token) = terminal.responder_cancel.take() {
                        token.cancel();
                    }
                }
            }
            state.log.push(
                LogLevel::Info,
                format!("auto-continue {}", if enabled { "enabled" } else { "disabled" }),
            );
        }

        EngineCommand::AddKeywordRule { keyword, response } => {
            match state.keywords.add(&keyword, response) {
                Ok(rule) => {
                    let keyword = rule.keyword.clone();
                    state.log.push(LogLevel::Info, format!("keyword rule added: \"{keyword}\""));
                }
                Err(e) => record_error(state, EngineError::InvalidInput { detail: e.to_string() }),
            }
        }

        EngineCommand::RemoveKeywordRule { id } => match state.keywords.remove(id) {
            Ok(rule) => {
                state
                    .log
                    .push(LogLevel::Info, format!("keyword rule removed: \"{}\"", rule.keyword));
            }
            Err(e) => record_error(state, EngineError::InvalidInput { detail: e.to_string() }),
        },

        EngineCommand::SwitchActiveTerminal { terminal_id } => {
            if state.terminals.contains_key(&terminal_id) {
                state.active_terminal = terminal_id;
                state.log.push(LogLevel::Info, format!("active terminal: {terminal_id}"));
            } else {
                record_error(
                    state,
                    EngineError::InvalidInput { detail: format!("no terminal {terminal_id}") },
                );
            }
        }

        EngineCommand::OpenTerminal { working_directory } => {
            if let Some(ref dir) = working_directory {
                if let Err(e) = cfg.platform.picker.change_working_directory(dir) {
                    record_error(state, EngineError::InvalidInput { detail: e.to_string() });
                    return;
                }
            }
            match open_terminal(state, cfg, channels, working_directory.as_deref()) {
                Ok(_) => schedule_pass(state, cfg, channels).await,
                Err(e) => record_error(state, EngineError::InvalidInput { detail: e.to_string() }),
            }
        }

        EngineCommand::CloseTerminal { terminal_id } => {
            if !state.terminals.contains_key(&terminal_id) {
                record_error(
                    state,
                    EngineError::InvalidInput { detail: format!("no terminal {terminal_id}") },
                );
                return;
            }
            if state.terminals.len() == 1 {
                record_error(
                    state,
                    EngineError::InvalidInput { detail: "cannot close the last terminal".to_owned() },
                );
                return;
            }
            if let Some(mut term) = state.terminals.remove(&terminal_id) {
                term.cancel_tasks();
            }
            if state.in_flight.remove(&terminal_id).is_some() {
                state.log.push(
                    LogLevel::Info,
                    format!("terminal {terminal_id} closed mid-injection; message stays queued"),
                );
            }
            if state.active_terminal == terminal_id {
                if let Some(&first) = state.terminals.keys().next() {
                    state.active_terminal = first;
                }
            }
            if state.in_flight.is_empty() && cfg.power_save_block {
                cfg.platform.power.stop();
            }
            state.log.push(LogLevel::Info, format!("terminal {terminal_id} closed"));
        }

        EngineCommand::ResizeTerminal { terminal_id, cols, rows } => {
            match state.terminals.get(&terminal_id) {
                Some(term) => {
                    let _ = term.resize_tx.try_send((cols, rows));
                    state.log.push(
                        LogLevel::Debug,
                        format!("terminal {terminal_id} resized to {cols}x{rows}"),
                    );
                }
                None => record_error(
                    state,
                    EngineError::InvalidInput { detail: format!("no terminal {terminal_id}") },
                ),
            }
        }
    }
}

/// Cancel in-flight executors, all terminals or one. Cleanup happens when
/// the cancelled completion arrives.
fn cancel_in_flight(state: &mut EngineState, terminal_id: Option<TerminalId>) {
    let targets: Vec<TerminalId> = state
        .in_flight
        .keys()
        .copied()
        .filter(|tid| terminal_id.map_or(true, |want| want == *tid))
        .collect();
    for tid in targets {
        if let Some(term) = state.terminals.get_mut(&tid) {
            if let Some(token) = term.executor_cancel.take() {
                token.cancel();
            }
        }
        state.log.push(LogLevel::Info, format!("cancelling injection on terminal {tid}"));
    }
}

/// Answer a read-only query from a state snapshot.
pub(super) fn handle_query(state: &EngineState, cfg: &EngineConfig, query: EngineQuery) {
    match query {
        EngineQuery::Status(reply) => {
            let _ = reply.send(snapshot(state, cfg));
        }
        EngineQuery::Queue(reply) => {
            let _ = reply.send(state.queue.items().to_vec());
        }
        EngineQuery::History(reply) => {
            let _ = reply.send(state.history.snapshot());
        }
        EngineQuery::SearchLog { needle, reply } => {
            let _ = reply.send(state.log.search(&needle));
        }
        EngineQuery::TailLog { n, offset, reply } => {
            let _ = reply.send(state.log.tail(n, offset));
        }
    }
}

/// Build the status snapshot.
fn snapshot(state: &EngineState, cfg: &EngineConfig) -> StatusSnapshot {
    let now = Instant::now();
    StatusSnapshot {
        mode: engine_mode(state),
        timer: TimerSummary {
            state: state.timer.state(),
            display: state.timer.display(),
            naturally_completed: state.timer.naturally_completed(),
        },
        queue_len: state.queue.len(),
        history_len: state.history.len(),
        auto_continue: state.auto_continue,
        waiting_for_usage_limit: state.waiting_for_usage_limit,
        usage_limit_reset: state.sync.last_reset().map(str::to_owned),
        terminals: state
            .terminals
            .values()
            .map(|t| TerminalSummary {
                id: t.id,
                name: t.name.clone(),
                color: t.color.clone(),
                status: t.observation.status,
                injecting: t.injecting,
                stable: t.stability.is_stable(cfg.stability_threshold, now),
                active: t.id == state.active_terminal,
            })
            .collect(),
        keyword_rules: state
            .keywords
            .rules()
            .iter()
            .map(|r| KeywordRuleSummary {
                id: r.id,
                keyword: r.keyword.clone(),
                response: r.response.clone(),
            })
            .collect(),
    }
}
