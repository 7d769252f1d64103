// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Persistence contract and the JSON-file implementation behind it.
//!
//! Four documents live side by side in the state directory: the settings
//! bag (`settings.json`), the message queue (`queue.json`), the message
//! history (`history.json`), and engine app-state markers
//! (`app_state.json`). Every write replaces the whole document atomically
//! (write tmp + rename).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde_json::Value;

use crate::queue::{HistoryEntry, Message};

/// Key-value and compound persistence operations the engine relies on.
///
/// Object-safe so tests can substitute an in-memory or failing store.
pub trait SettingsStore: Send + Sync {
    /// Read a JSON-encoded scalar setting.
    fn get(&self, key: &str) -> Option<Value>;

    /// Write a JSON-encoded scalar setting.
    fn set(&self, key: &str, value: Value) -> anyhow::Result<()>;

    /// Replace the persisted message queue with the given array.
    fn save_message_queue(&self, messages: &[Message]) -> anyhow::Result<()>;

    /// Load the persisted message queue (empty if never saved).
    fn load_message_queue(&self) -> anyhow::Result<Vec<Message>>;

    /// Replace the persisted message history.
    fn save_message_history(&self, entries: &[HistoryEntry]) -> anyhow::Result<()>;

    /// Load the persisted message history (empty if never saved).
    fn load_message_history(&self) -> anyhow::Result<Vec<HistoryEntry>>;

    /// Read an engine app-state marker (e.g. the last usage-limit reset).
    fn get_app_state(&self, key: &str) -> Option<String>;

    /// Write an engine app-state marker. `None` removes the key.
    fn set_app_state(&self, key: &str, value: Option<&str>) -> anyhow::Result<()>;
}

/// App-state key for the last processed usage-limit reset string.
pub const KEY_USAGE_LIMIT_RESET: &str = "last_usage_limit_reset";
/// App-state key for the computed absolute reset time (epoch seconds).
pub const KEY_USAGE_LIMIT_RESETS_AT: &str = "usage_limit_resets_at";
/// Settings key for the last saved timer value.
pub const KEY_TIMER_VALUE: &str = "timer_value";
/// Settings key for the auto-continue toggle.
pub const KEY_AUTO_CONTINUE: &str = "auto_continue";

/// File-backed store rooted at a state directory.
///
/// Interior mutability keeps the trait object shareable; the engine is the
/// only writer, so the mutexes only guard read-modify-write cycles against
/// snapshot readers.
pub struct JsonSettings {
    dir: PathBuf,
    settings: Mutex<HashMap<String, Value>>,
    app_state: Mutex<HashMap<String, String>>,
}

impl JsonSettings {
    /// Open (or create) a store under `dir`, loading existing documents.
    pub fn open(dir: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        let settings = load_map(&dir.join("settings.json"))?;
        let app_state = load_map(&dir.join("app_state.json"))?;
        Ok(Self { dir, settings: Mutex::new(settings), app_state: Mutex::new(app_state) })
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }
}

impl SettingsStore for JsonSettings {
    fn get(&self, key: &str) -> Option<Value> {
        self.settings.lock().ok()?.get(key).cloned()
    }

    fn set(&self, key: &str, value: Value) -> anyhow::Result<()> {
        let snapshot = {
            let mut map = lock(&self.settings)?;
            map.insert(key.to_owned(), value);
            map.clone()
        };
        save_json(&self.path("settings.json"), &snapshot)
    }

    fn save_message_queue(&self, messages: &[Message]) -> anyhow::Result<()> {
        save_json(&self.path("queue.json"), &messages)
    }

    fn load_message_queue(&self) -> anyhow::Result<Vec<Message>> {
        load_vec(&self.path("queue.json"))
    }

    fn save_message_history(&self, entries: &[HistoryEntry]) -> anyhow::Result<()> {
        save_json(&self.path("history.json"), &entries)
    }

    fn load_message_history(&self) -> anyhow::Result<Vec<HistoryEntry>> {
        load_vec(&self.path("history.json"))
    }

    fn get_app_state(&self, key: &str) -> Option<String> {
        self.app_state.lock().ok()?.get(key).cloned()
    }

    fn set_app_state(&self, key: &str, value: Option<&str>) -> anyhow::Result<()> {
        let snapshot = {
            let mut map = lock(&self.app_state)?;
            match value {
                Some(v) => map.insert(key.to_owned(), v.to_owned()),
                None => map.remove(key),
            };
            map.clone()
        };
        save_json(&self.path("app_state.json"), &snapshot)
    }
}

fn lock<T>(m: &Mutex<T>) -> anyhow::Result<std::sync::MutexGuard<'_, T>> {
    m.lock().map_err(|_| anyhow::anyhow!("settings store lock poisoned"))
}

/// Save a JSON document atomically (write tmp + rename).
fn save_json<T: serde::Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    let tmp_path = path.with_extension("tmp");
    std::fs::write(&tmp_path, json)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

fn load_map<V: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<HashMap<String, V>> {
    match std::fs::read_to_string(path) {
        Ok(contents) => Ok(serde_json::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
        Err(e) => Err(e.into()),
    }
}

fn load_vec<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<Vec<T>> {
    match std::fs::read_to_string(path) {
        Ok(contents) => Ok(serde_json::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
#[path = "settings_tests.rs"]
mod tests;
