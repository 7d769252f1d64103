// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::Parser;

use super::Config;

fn parse(args: &[&str]) -> Config {
    let mut full = vec!["prompter"];
    full.extend_from_slice(args);
    Config::parse_from(full)
}

#[test]
fn defaults_are_valid_with_a_command() {
    let config = parse(&["--", "claude"]);
    assert!(config.validate().is_ok());
    assert_eq!(config.terminals, 1);
    assert_eq!(config.window_size, 4096);
    assert_eq!(config.stability_threshold().as_secs(), 5);
    assert_eq!(config.typing_interval().as_millis(), 50);
    assert_eq!(config.control_interval().as_millis(), 10);
    assert_eq!(config.shutdown_grace().as_millis(), 500);
    assert!(config.auto_continue);
}

#[test]
fn command_is_required() {
    let config = parse(&[]);
    assert!(config.validate().is_err());
}

#[yare::parameterized(
    zero = { "0" },
    five = { "5" },
)]
fn terminal_count_bounds(count: &str) {
    let config = parse(&["--terminals", count, "--", "claude"]);
    assert!(config.validate().is_err());
}

#[test]
fn four_terminals_allowed() {
    let config = parse(&["--terminals", "4", "--", "claude"]);
    assert!(config.validate().is_ok());
}

#[yare::parameterized(
    too_small = { "1999" },
    too_large = { "5001" },
)]
fn window_size_bounds(size: &str) {
    let config = parse(&["--window-size", size, "--", "claude"]);
    assert!(config.validate().is_err());
}

#[test]
fn invalid_log_format_rejected() {
    let config = parse(&["--log-format", "xml", "--", "claude"]);
    assert!(config.validate().is_err());
}

#[test]
fn explicit_state_dir_wins() {
    let config = parse(&["--state-dir", "/tmp/prompter-test", "--", "claude"]);
    assert_eq!(config.state_dir(), std::path::PathBuf::from("/tmp/prompter-test"));
}

#[test]
fn command_captures_flags_after_separator() {
    let config = parse(&["--", "claude", "--dangerously-skip-permissions"]);
    assert_eq!(config.command, vec!["claude", "--dangerously-skip-permissions"]);
}
