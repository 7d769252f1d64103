// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::error;
use tracing_subscriber::EnvFilter;

use prompter::config::Config;
use prompter::control;
use prompter::engine::{Engine, EngineConfig};
use prompter::platform::Platform;
use prompter::pty::spawn::NativePty;
use prompter::pty::BackendFactory;
use prompter::settings::JsonSettings;

#[tokio::main]
async fn main() {
    let config = Config::parse();

    if let Err(e) = config.validate() {
        eprintln!("error: {e}");
        std::process::exit(2);
    }

    init_tracing(&config);

    if let Err(e) = run(config).await {
        error!("fatal: {e:#}");
        std::process::exit(1);
    }
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone()));
    if config.log_format == "json" {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn run(config: Config) -> anyhow::Result<()> {
    let settings = Arc::new(JsonSettings::open(config.state_dir())?);

    let command = config.command.clone();
    let cols = config.cols;
    let rows = config.rows;
    let shutdown_grace = config.shutdown_grace();
    let backend_factory: BackendFactory = Box::new(move |workdir| {
        let pty = NativePty::spawn(&command, cols, rows, workdir, shutdown_grace)?;
        Ok(Box::new(pty) as Box<dyn prompter::pty::Backend>)
    });

    let shutdown = CancellationToken::new();
    let engine_config = EngineConfig::from_cli(
        &config,
        settings,
        Platform::headless(),
        backend_factory,
        shutdown.clone(),
    );

    let (engine, handle) = Engine::new(engine_config)?;

    // Commands arrive as JSONL on stdin; ctrl-c stops the engine.
    control::spawn_stdin_reader(handle.sender(), shutdown.clone());
    let ctrl_c_shutdown = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c_shutdown.cancel();
        }
    });

    engine.run().await
}
