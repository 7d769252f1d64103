// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Newline-delimited JSON command protocol on stdin.
//!
//! Each line is one serde-tagged [`EngineCommand`], e.g.
//! `{"cmd":"enqueue","content":"ls","terminal_id":1}`. This is the
//! process's stand-in for UI buttons and keyboard accelerators; a desktop
//! shell would feed the same channel.

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::event::{EngineCommand, EngineRequest};

/// Parse one control line into a command.
pub fn parse_command_line(line: &str) -> anyhow::Result<EngineCommand> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        anyhow::bail!("empty command line");
    }
    Ok(serde_json::from_str(trimmed)?)
}

/// Spawn the stdin reader task. Malformed lines are logged and skipped;
/// EOF ends the task without touching the engine.
pub fn spawn_stdin_reader(
    requests_tx: mpsc::Sender<EngineRequest>,
    shutdown: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                line = lines.next_line() => {
                    match line {
                        Ok(Some(line)) => {
                            if line.trim().is_empty() {
                                continue;
                            }
                            match parse_command_line(&line) {
                                Ok(cmd) => {
                                    if requests_tx.send(cmd.into()).await.is_err() {
                                        break;
                                    }
                                }
                                Err(e) => warn!("control: ignoring malformed command: {e}"),
                            }
                        }
                        Ok(None) => break,
                        Err(e) => {
                            warn!("control: stdin read failed: {e}");
                            break;
                        }
                    }
                }
            }
        }
    })
}

#[cfg(test)]
#[path = "control_tests.rs"]
mod tests;
