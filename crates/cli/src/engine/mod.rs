// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The injection engine: a single task owning queue, terminals, timer, and
//! log, with cooperative helper tasks for anything that sleeps.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::executor::Pacing;
use crate::interrupt::InterruptConfig;
use crate::platform::Platform;
use crate::pty::BackendFactory;
use crate::respond::RespondConfig;
use crate::settings::SettingsStore;

mod dispatch;
pub mod run;

pub use run::{Engine, EngineHandle};

#[cfg(test)]
#[path = "../engine_tests.rs"]
mod tests;

/// Runtime objects and tuning for building an [`Engine`].
pub struct EngineConfig {
    pub settings: Arc<dyn SettingsStore>,
    pub platform: Platform,
    pub backend_factory: BackendFactory,
    pub shutdown: CancellationToken,
    /// Terminals opened at startup.
    pub terminals: usize,
    pub cols: u16,
    pub rows: u16,
    pub window_size: usize,
    pub stability_threshold: Duration,
    pub pacing: Pacing,
    pub respond: RespondConfig,
    pub interrupt: InterruptConfig,
    /// Initial auto-continue toggle (the persisted setting wins).
    pub auto_continue: bool,
    pub power_save_block: bool,
    pub sound: bool,
    /// Working directory for spawned terminals.
    pub workdir: Option<String>,
}

impl EngineConfig {
    /// Build from the CLI config plus runtime collaborators.
    pub fn from_cli(
        config: &Config,
        settings: Arc<dyn SettingsStore>,
        platform: Platform,
        backend_factory: BackendFactory,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            settings,
            platform,
            backend_factory,
            shutdown,
            terminals: config.terminals,
            cols: config.cols,
            rows: config.rows,
            window_size: config.window_size,
            stability_threshold: config.stability_threshold(),
            pacing: Pacing {
                per_char: config.typing_interval(),
                control_spacing: config.control_interval(),
                ..Pacing::default()
            },
            respond: RespondConfig::default(),
            interrupt: InterruptConfig::default(),
            auto_continue: config.auto_continue,
            power_save_block: config.power_save_block,
            sound: config.sound,
            workdir: config.workdir.clone(),
        }
    }

    /// Instant pacing and a headless platform, for tests.
    pub fn for_tests(settings: Arc<dyn SettingsStore>, backend_factory: BackendFactory) -> Self {
        Self {
            settings,
            platform: Platform::headless(),
            backend_factory,
            shutdown: CancellationToken::new(),
            terminals: 1,
            cols: 80,
            rows: 24,
            window_size: 4096,
            stability_threshold: Duration::from_secs(5),
            pacing: Pacing::instant(),
            // Zero recheck delays would exhaust the retry loop before a
            // test can react; paused tokio time keeps the real ranges fast.
            respond: RespondConfig::default(),
            interrupt: InterruptConfig::default(),
            auto_continue: true,
            power_save_block: false,
            sound: false,
            workdir: None,
        }
    }
}
