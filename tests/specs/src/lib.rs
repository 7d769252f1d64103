// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Harness for end-to-end engine scenarios: a real file-backed settings
//! store in a temp directory plus scripted terminal backends.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use prompter::engine::{Engine, EngineConfig, EngineHandle};
use prompter::settings::JsonSettings;
use prompter::test_support::{scripted_factory, scripted_pair, ScriptedTerminal};

/// A running engine wired to scripted terminals and a temp-dir store.
pub struct Scenario {
    pub handle: EngineHandle,
    pub terminals: Vec<ScriptedTerminal>,
    pub shutdown: CancellationToken,
}

/// Start an engine with `terminal_count` scripted terminals whose state
/// lives under `state_dir`.
pub fn start(state_dir: &std::path::Path, terminal_count: usize) -> anyhow::Result<Scenario> {
    let mut backends = Vec::new();
    let mut terminals = Vec::new();
    for _ in 0..terminal_count {
        let (backend, terminal) = scripted_pair();
        backends.push(backend);
        terminals.push(terminal);
    }

    let settings = Arc::new(JsonSettings::open(state_dir)?);
    let mut cfg = EngineConfig::for_tests(settings, scripted_factory(backends));
    cfg.terminals = terminal_count;
    let shutdown = cfg.shutdown.clone();

    let (engine, handle) = Engine::new(cfg)?;
    tokio::spawn(engine.run());
    Ok(Scenario { handle, terminals, shutdown })
}

/// Collect written bytes until `needle` appears (bounded).
pub async fn read_until(terminal: &mut ScriptedTerminal, needle: &[u8]) -> Vec<u8> {
    let mut seen = Vec::new();
    for _ in 0..10_000 {
        match terminal.written_rx.recv().await {
            Some(bytes) => {
                seen.extend_from_slice(&bytes);
                if seen.windows(needle.len().max(1)).any(|w| w == needle) {
                    return seen;
                }
            }
            None => break,
        }
    }
    seen
}
