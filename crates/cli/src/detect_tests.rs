// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::{classify, clear_screen_tail, parse_usage_limit, prompt_region, Status};
use crate::window::OutputWindow;

fn window_with(text: &str) -> OutputWindow {
    let mut w = OutputWindow::new(4096);
    w.push(text.as_bytes());
    w
}

#[yare::parameterized(
    empty = { "", Status::Idle },
    plain_output = { "compiling prompter v0.4.7\nfinished dev profile", Status::Idle },
    running = { "Churning... (esc to interrupt)", Status::Running },
    running_bare = { "esc to interrupt", Status::Running },
    running_offline = { "retrying (offline)", Status::Running },
    running_case = { "ESC TO INTERRUPT", Status::Running },
    prompting = { "1. Yes\n2. No, and tell Claude what to do differently", Status::Prompting },
    prompting_case = { "NO, AND TELL CLAUDE WHAT TO DO DIFFERENTLY", Status::Prompting },
    trust = { "Do you trust the files in this folder?", Status::TrustAsked },
)]
fn classify_status(text: &str, expected: Status) {
    assert_eq!(classify(&window_with(text)).status, expected);
}

#[test]
fn running_takes_priority_over_prompting() {
    let w = window_with("No, and tell Claude what to do differently\n(esc to interrupt)");
    assert_eq!(classify(&w).status, Status::Running);
}

#[test]
fn proceed_prompt_flag_is_independent() {
    let obs = classify(&window_with("Do you want to proceed? (y/n)"));
    assert_eq!(obs.status, Status::Idle);
    assert!(obs.proceed_prompt);
}

#[yare::parameterized(
    am = { "Claude usage limit reached. Your limit will reset at 3am", Some("3am") },
    pm = { "Claude usage limit reached. Your limit will reset at 11pm", Some("11pm") },
    mixed_case = { "CLAUDE USAGE LIMIT REACHED. YOUR LIMIT WILL RESET AT 7PM", Some("7pm") },
    embedded = { "noise before\nClaude usage limit reached. Your limit will reset at 9am (UTC)", Some("9am") },
    absent = { "no limit here", None },
    malformed = { "Claude usage limit reached. Your limit will reset at noon", None },
)]
fn usage_limit_extraction(text: &str, expected: Option<&str>) {
    assert_eq!(parse_usage_limit(text).as_deref(), expected);
}

#[test]
fn usage_limit_reported_alongside_running() {
    let w = window_with(
        "Claude usage limit reached. Your limit will reset at 3am\n(esc to interrupt)",
    );
    let obs = classify(&w);
    assert_eq!(obs.status, Status::Running);
    assert_eq!(obs.usage_limit.as_deref(), Some("3am"));
}

#[test]
fn prompt_region_after_last_frame() {
    let text = "old box ╭ stale ╭─ fresh prompt [Claude Code]";
    let region = prompt_region(text);
    assert!(region.starts_with('╭'));
    assert!(region.contains("[Claude Code]"));
    assert!(!region.contains("stale"));
}

#[test]
fn prompt_region_fallback_is_tail() {
    let long = "x".repeat(3000);
    let text = format!("{long}KEYWORD");
    let region = prompt_region(&text);
    assert!(region.len() <= 1000);
    assert!(region.ends_with("KEYWORD"));
}

#[test]
fn prompt_region_fallback_respects_char_boundary() {
    // 10 + 2 + 999 bytes puts the fallback cut inside the two-byte "é";
    // the region must advance to the next boundary instead of panicking.
    let text = format!("{}é{}", "a".repeat(10), "b".repeat(999));
    let region = prompt_region(&text);
    assert_eq!(region, "b".repeat(999));
}

#[yare::parameterized(
    erase_display = { b"before\x1b[2Jafter".as_slice(), Some(10) },
    home_then_erase = { b"x\x1b[H\x1b[2Jy".as_slice(), Some(8) },
    erase_scrollback = { b"\x1b[3Jrest".as_slice(), Some(4) },
    none = { b"plain output".as_slice(), None },
)]
fn clear_screen_scan(data: &[u8], expected: Option<usize>) {
    assert_eq!(clear_screen_tail(data), expected);
}

#[test]
fn clear_screen_uses_last_occurrence() {
    let data = b"\x1b[2Jfirst\x1b[2Jsecond";
    let idx = clear_screen_tail(data).unwrap_or(0);
    assert_eq!(&data[idx..], b"second");
}

#[test]
fn stale_marker_discarded_after_clear() {
    let mut w = OutputWindow::new(4096);
    w.push(b"(esc to interrupt)");
    let chunk = b"\x1b[2J$ ";
    if let Some(idx) = clear_screen_tail(chunk) {
        w.clear();
        w.push(&chunk[idx..]);
    }
    assert_eq!(classify(&w).status, Status::Idle);
}
