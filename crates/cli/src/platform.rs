// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Contracts for host-desktop affordances the engine calls but does not
//! implement: power-save blocking, the tray queue badge, sound playback,
//! and the directory picker. The default implementations only log, which
//! is all a headless deployment needs; a desktop shell substitutes its own.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info};

/// Keeps the machine awake while injections are in flight.
pub trait PowerSaveBlocker: Send + Sync {
    fn start(&self);
    fn stop(&self);
    fn is_active(&self) -> bool;
}

/// Tray surface: shows the number of queued messages.
pub trait Tray: Send + Sync {
    fn set_queue_badge(&self, count: usize);
}

/// Plays named sound assets. Volume contract: 50 %.
pub trait SoundPlayer: Send + Sync {
    fn play(&self, asset: &str);
}

/// Result of a directory-picker dialog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryChoice {
    pub canceled: bool,
    pub paths: Vec<PathBuf>,
}

/// Lets the user pick a working directory for a terminal.
pub trait DirectoryPicker: Send + Sync {
    fn show_directory_dialog(&self, initial: Option<&str>) -> DirectoryChoice;
    fn change_working_directory(&self, path: &str) -> anyhow::Result<()>;
}

/// Bundle of platform collaborators handed to the engine.
pub struct Platform {
    pub power: Box<dyn PowerSaveBlocker>,
    pub tray: Box<dyn Tray>,
    pub sound: Box<dyn SoundPlayer>,
    pub picker: Box<dyn DirectoryPicker>,
}

impl Platform {
    /// Logging no-op implementations for every contract.
    pub fn headless() -> Self {
        Self {
            power: Box::new(LogPowerSaveBlocker::default()),
            tray: Box::new(LogTray),
            sound: Box::new(LogSoundPlayer),
            picker: Box::new(HeadlessPicker),
        }
    }
}

/// Tracks the active flag and logs transitions; no OS hook.
#[derive(Default)]
pub struct LogPowerSaveBlocker {
    active: AtomicBool,
}

impl PowerSaveBlocker for LogPowerSaveBlocker {
    fn start(&self) {
        if !self.active.swap(true, Ordering::AcqRel) {
            info!("power-save blocker engaged");
        }
    }

    fn stop(&self) {
        if self.active.swap(false, Ordering::AcqRel) {
            info!("power-save blocker released");
        }
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

pub struct LogTray;

impl Tray for LogTray {
    fn set_queue_badge(&self, count: usize) {
        debug!("queue badge: {count}");
    }
}

pub struct LogSoundPlayer;

impl SoundPlayer for LogSoundPlayer {
    fn play(&self, asset: &str) {
        debug!("play sound: {asset} (volume 50%)");
    }
}

/// Headless environments have no dialog; the picker always cancels, and
/// directory changes just validate the path.
pub struct HeadlessPicker;

impl DirectoryPicker for HeadlessPicker {
    fn show_directory_dialog(&self, _initial: Option<&str>) -> DirectoryChoice {
        DirectoryChoice { canceled: true, paths: vec![] }
    }

    fn change_working_directory(&self, path: &str) -> anyhow::Result<()> {
        if !std::path::Path::new(path).is_dir() {
            anyhow::bail!("not a directory: {path}");
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "platform_tests.rs"]
mod tests;
