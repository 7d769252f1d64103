// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory doubles for the engine's external collaborators: a scripted
//! terminal backend (tests feed output and observe written bytes) and a
//! settings store without a filesystem.

use std::collections::HashMap;
use std::sync::Mutex;

use bytes::Bytes;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

use crate::pty::{Backend, BackendFactory, ExitStatus};
use crate::queue::{HistoryEntry, Message};
use crate::settings::SettingsStore;

/// Backend half: handed to the engine through the factory.
pub struct ScriptedBackend {
    feed_rx: mpsc::Receiver<Bytes>,
    written_tx: mpsc::Sender<Bytes>,
    exit_rx: oneshot::Receiver<ExitStatus>,
}

/// Test half: feeds output, observes writes, triggers exit.
pub struct ScriptedTerminal {
    pub feed_tx: mpsc::Sender<Bytes>,
    pub written_rx: mpsc::Receiver<Bytes>,
    pub exit_tx: oneshot::Sender<ExitStatus>,
}

/// Create a connected scripted backend/terminal pair.
pub fn scripted_pair() -> (ScriptedBackend, ScriptedTerminal) {
    let (feed_tx, feed_rx) = mpsc::channel(256);
    let (written_tx, written_rx) = mpsc::channel(1024);
    let (exit_tx, exit_rx) = oneshot::channel();
    (
        ScriptedBackend { feed_rx, written_tx, exit_rx },
        ScriptedTerminal { feed_tx, written_rx, exit_tx },
    )
}

impl Backend for ScriptedBackend {
    fn run(
        &mut self,
        output_tx: mpsc::Sender<Bytes>,
        mut input_rx: mpsc::Receiver<Bytes>,
        mut resize_rx: mpsc::Receiver<(u16, u16)>,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = anyhow::Result<ExitStatus>> + Send + '_>>
    {
        Box::pin(async move {
            let mut feed_open = true;
            let mut resize_open = true;
            loop {
                tokio::select! {
                    fed = self.feed_rx.recv(), if feed_open => {
                        match fed {
                            Some(bytes) => {
                                if output_tx.send(bytes).await.is_err() {
                                    return Ok(ExitStatus { code: Some(0), signal: None });
                                }
                            }
                            // Test side dropped: stay alive, nothing more to feed.
                            None => feed_open = false,
                        }
                    }
                    input = input_rx.recv() => {
                        match input {
                            Some(bytes) => { let _ = self.written_tx.send(bytes).await; }
                            None => return Ok(ExitStatus { code: Some(0), signal: None }),
                        }
                    }
                    size = resize_rx.recv(), if resize_open => {
                        if size.is_none() {
                            resize_open = false;
                        }
                    }
                    status = &mut self.exit_rx => {
                        return Ok(status.unwrap_or(ExitStatus { code: Some(0), signal: None }));
                    }
                }
            }
        })
    }

    fn resize(&self, _cols: u16, _rows: u16) -> anyhow::Result<()> {
        Ok(())
    }

    fn child_pid(&self) -> Option<u32> {
        None
    }
}

/// Factory handing out the given backends in order; errors when exhausted.
pub fn scripted_factory(backends: Vec<ScriptedBackend>) -> BackendFactory {
    let pool = Mutex::new(backends.into_iter().collect::<Vec<_>>());
    Box::new(move |_workdir| {
        let mut pool = pool.lock().map_err(|_| anyhow::anyhow!("factory lock poisoned"))?;
        if pool.is_empty() {
            anyhow::bail!("no scripted backend left");
        }
        Ok(Box::new(pool.remove(0)) as Box<dyn Backend>)
    })
}

/// In-memory settings store. `fail_writes` makes every mutation fail, for
/// persistence-error tests.
#[derive(Default)]
pub struct MemorySettings {
    pub fail_writes: bool,
    settings: Mutex<HashMap<String, Value>>,
    app_state: Mutex<HashMap<String, String>>,
    queue: Mutex<Vec<Message>>,
    history: Mutex<Vec<HistoryEntry>>,
}

impl MemorySettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self { fail_writes: true, ..Self::default() }
    }

    fn check(&self) -> anyhow::Result<()> {
        if self.fail_writes {
            anyhow::bail!("simulated persistence failure");
        }
        Ok(())
    }
}

impl SettingsStore for MemorySettings {
    fn get(&self, key: &str) -> Option<Value> {
        self.settings.lock().ok()?.get(key).cloned()
    }

    fn set(&self, key: &str, value: Value) -> anyhow::Result<()> {
        self.check()?;
        self.settings
            .lock()
            .map_err(|_| anyhow::anyhow!("lock poisoned"))?
            .insert(key.to_owned(), value);
        Ok(())
    }

    fn save_message_queue(&self, messages: &[Message]) -> anyhow::Result<()> {
        self.check()?;
        *self.queue.lock().map_err(|_| anyhow::anyhow!("lock poisoned"))? = messages.to_vec();
        Ok(())
    }

    fn load_message_queue(&self) -> anyhow::Result<Vec<Message>> {
        Ok(self.queue.lock().map_err(|_| anyhow::anyhow!("lock poisoned"))?.clone())
    }

    fn save_message_history(&self, entries: &[HistoryEntry]) -> anyhow::Result<()> {
        self.check()?;
        *self.history.lock().map_err(|_| anyhow::anyhow!("lock poisoned"))? = entries.to_vec();
        Ok(())
    }

    fn load_message_history(&self) -> anyhow::Result<Vec<HistoryEntry>> {
        Ok(self.history.lock().map_err(|_| anyhow::anyhow!("lock poisoned"))?.clone())
    }

    fn get_app_state(&self, key: &str) -> Option<String> {
        self.app_state.lock().ok()?.get(key).cloned()
    }

    fn set_app_state(&self, key: &str, value: Option<&str>) -> anyhow::Result<()> {
        self.check()?;
        let mut map = self.app_state.lock().map_err(|_| anyhow::anyhow!("lock poisoned"))?;
        match value {
            Some(v) => map.insert(key.to_owned(), v.to_owned()),
            None => map.remove(key),
        };
        Ok(())
    }
}
