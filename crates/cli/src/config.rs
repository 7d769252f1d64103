// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::terminal::MAX_TERMINALS;

/// Multi-terminal prompt injection controller for AI coding agents.
#[derive(Debug, Parser)]
#[command(name = "prompter", version, about)]
pub struct Config {
    /// Number of terminals to open at startup.
    #[arg(long, env = "PROMPTER_TERMINALS", default_value = "1")]
    pub terminals: usize,

    /// Terminal columns.
    #[arg(long, env = "PROMPTER_COLS", default_value = "200")]
    pub cols: u16,

    /// Terminal rows.
    #[arg(long, env = "PROMPTER_ROWS", default_value = "50")]
    pub rows: u16,

    /// Output window size in bytes per terminal.
    #[arg(long, env = "PROMPTER_WINDOW_SIZE", default_value = "4096")]
    pub window_size: usize,

    /// Continuous idle seconds required before auto-injection.
    #[arg(long, env = "PROMPTER_STABILITY_THRESHOLD", default_value = "5")]
    pub stability_threshold: u64,

    /// Delay between typed characters in milliseconds.
    #[arg(long, env = "PROMPTER_TYPING_INTERVAL", default_value = "50")]
    pub typing_interval_ms: u64,

    /// Delay between control-sequence bytes in milliseconds.
    #[arg(long, env = "PROMPTER_CONTROL_INTERVAL", default_value = "10")]
    pub control_interval_ms: u64,

    /// Respond to confirmation prompts automatically.
    #[arg(
        long,
        env = "PROMPTER_AUTO_CONTINUE",
        default_value_t = true,
        action = clap::ArgAction::Set
    )]
    pub auto_continue: bool,

    /// State directory (settings, queue, history). Defaults to
    /// $XDG_STATE_HOME/prompter.
    #[arg(long, env = "PROMPTER_STATE_DIR")]
    pub state_dir: Option<PathBuf>,

    /// Keep the machine awake while injections run.
    #[arg(long, env = "PROMPTER_POWER_SAVE_BLOCK")]
    pub power_save_block: bool,

    /// Play a sound when an injection completes.
    #[arg(long, env = "PROMPTER_SOUND")]
    pub sound: bool,

    /// Log format (json or text).
    #[arg(long, env = "PROMPTER_LOG_FORMAT", default_value = "text")]
    pub log_format: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "PROMPTER_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Grace period in milliseconds for a terminal child to exit after
    /// hangup before it is killed.
    #[arg(long, env = "PROMPTER_SHUTDOWN_GRACE", default_value = "500")]
    pub shutdown_grace_ms: u64,

    /// Working directory for spawned terminals.
    #[arg(long, env = "PROMPTER_WORKDIR")]
    pub workdir: Option<String>,

    /// Command to run in each terminal (after --).
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,
}

impl Config {
    /// Validate the configuration after parsing.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.terminals == 0 || self.terminals > MAX_TERMINALS {
            anyhow::bail!("--terminals must be between 1 and {MAX_TERMINALS}");
        }
        if !(2000..=5000).contains(&self.window_size) {
            anyhow::bail!("--window-size must be between 2000 and 5000 bytes");
        }
        if self.command.is_empty() {
            anyhow::bail!("a command must be specified (after --)");
        }
        match self.log_format.as_str() {
            "json" | "text" => {}
            other => anyhow::bail!("invalid log format: {other}"),
        }
        Ok(())
    }

    pub fn stability_threshold(&self) -> Duration {
        Duration::from_secs(self.stability_threshold)
    }

    pub fn typing_interval(&self) -> Duration {
        Duration::from_millis(self.typing_interval_ms)
    }

    pub fn control_interval(&self) -> Duration {
        Duration::from_millis(self.control_interval_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    /// Resolve the state directory, defaulting to
    /// `$XDG_STATE_HOME/prompter` (or `~/.local/state/prompter`).
    pub fn state_dir(&self) -> PathBuf {
        if let Some(ref dir) = self.state_dir {
            return dir.clone();
        }
        let state_home = std::env::var("XDG_STATE_HOME").unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_default();
            format!("{home}/.local/state")
        });
        PathBuf::from(state_home).join("prompter")
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
