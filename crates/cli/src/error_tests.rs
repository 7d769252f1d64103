// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::EngineError;
use crate::action_log::LogLevel;

#[yare::parameterized(
    transient = { EngineError::TransientWrite { terminal_id: 1, detail: "eio".into() }, "TRANSIENT_WRITE", LogLevel::Warning },
    persistence = { EngineError::Persistence { detail: "disk full".into() }, "PERSISTENCE", LogLevel::Error },
    invalid = { EngineError::InvalidInput { detail: "empty".into() }, "INVALID_INPUT", LogLevel::Warning },
    stale = { EngineError::StaleState { detail: "orphan".into() }, "STALE_STATE", LogLevel::Warning },
    fatal = { EngineError::Fatal { terminal_id: 2, detail: "exited".into() }, "FATAL", LogLevel::Error },
)]
fn codes_and_levels(err: EngineError, code: &str, level: LogLevel) {
    assert_eq!(err.code(), code);
    assert_eq!(err.log_level(), level);
}

#[test]
fn display_includes_code_and_terminal() {
    let err = EngineError::TransientWrite { terminal_id: 3, detail: "EIO".into() };
    let text = err.to_string();
    assert!(text.contains("TRANSIENT_WRITE"));
    assert!(text.contains("terminal 3"));
}

#[test]
fn serde_roundtrip() -> anyhow::Result<()> {
    let err = EngineError::Persistence { detail: "nope".into() };
    let json = serde_json::to_string(&err)?;
    let back: EngineError = serde_json::from_str(&json)?;
    assert_eq!(back, err);
    Ok(())
}
