// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Marker-based classification of a terminal's recent output.
//!
//! The assistant's TUI renders a small set of plain-ASCII phrases that
//! survive ANSI styling unchanged, so classification is substring matching
//! over the lowercased window tail rather than escape-sequence parsing.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::window::OutputWindow;

/// Phrases that indicate the agent is actively working.
const RUNNING_MARKERS: &[&str] = &["esc to interrupt", "(esc to interrupt)", "offline)"];

/// Phrase rendered by the permission prompt's reject option.
const PROMPTING_MARKER: &str = "no, and tell claude what to do differently";

/// Phrase rendered by the workspace-trust dialog.
const TRUST_MARKER: &str = "do you trust the files in this folder?";

/// Generic confirmation phrase, recognized for auto-continue.
const PROCEED_MARKER: &str = "do you want to proceed?";

/// Frame character that opens the assistant's prompt box. Keyword matching
/// is restricted to the text after its last occurrence.
const PROMPT_FRAME: char = '\u{256d}'; // ╭

/// Fallback keyword-matching region when no frame character is buffered.
const PROMPT_REGION_FALLBACK_BYTES: usize = 1000;

static USAGE_LIMIT_RE: LazyLock<Regex> = LazyLock::new(|| {
    // Pattern is a compile-time constant.
    #[allow(clippy::expect_used)]
    let re = Regex::new(r"(?i)Claude usage limit reached\. Your limit will reset at (\d{1,2})(am|pm)")
        .expect("usage-limit regex");
    re
});

/// Classified status of one terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// None of the known markers are present.
    #[default]
    Idle,
    /// The agent is working ("esc to interrupt" is on screen).
    Running,
    /// A confirmation prompt is awaiting a choice.
    Prompting,
    /// The workspace-trust dialog is on screen.
    TrustAsked,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Prompting => "prompting",
            Self::TrustAsked => "trust_asked",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Full detector verdict over one terminal's window.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Observation {
    pub status: Status,
    /// Announced usage-limit reset time (e.g. `"3am"`), if present anywhere
    /// in the window. Reported alongside any status.
    pub usage_limit: Option<String>,
    /// Whether the generic "Do you want to proceed?" phrase is present.
    pub proceed_prompt: bool,
}

/// Classify the window contents into an [`Observation`].
///
/// Marker checks run in a fixed order (running, prompting, trust); the first
/// match wins. The usage-limit announcement is extracted independently so a
/// limit notice printed while the agent is still rendering other markers is
/// not lost.
pub fn classify(window: &OutputWindow) -> Observation {
    let text = window.text();
    let lower = text.to_lowercase();

    let status = if RUNNING_MARKERS.iter().any(|m| lower.contains(m)) {
        Status::Running
    } else if lower.contains(PROMPTING_MARKER) {
        Status::Prompting
    } else if lower.contains(TRUST_MARKER) {
        Status::TrustAsked
    } else {
        Status::Idle
    };

    let usage_limit = parse_usage_limit(&text);
    let proceed_prompt = lower.contains(PROCEED_MARKER);

    Observation { status, usage_limit, proceed_prompt }
}

/// Extract the announced reset time from a usage-limit notice, normalized
/// to lowercase (e.g. `"3am"`, `"11pm"`).
pub fn parse_usage_limit(text: &str) -> Option<String> {
    let caps = USAGE_LIMIT_RE.captures(text)?;
    let hour = caps.get(1)?.as_str();
    let meridiem = caps.get(2)?.as_str().to_lowercase();
    Some(format!("{hour}{meridiem}"))
}

/// The substring of `text` that keyword rules are matched against: the text
/// after the last prompt-frame character, or the trailing
/// [`PROMPT_REGION_FALLBACK_BYTES`] when no frame is buffered.
pub fn prompt_region(text: &str) -> &str {
    if let Some(idx) = text.rfind(PROMPT_FRAME) {
        return &text[idx..];
    }
    let mut start = text.len().saturating_sub(PROMPT_REGION_FALLBACK_BYTES);
    while start < text.len() && !text.is_char_boundary(start) {
        start += 1;
    }
    &text[start..]
}

/// Scan appended output for clear-screen sequences (CSI 2J, CSI H CSI 2J,
/// CSI 3J). Returns the byte index just past the last one, telling the
/// caller to reset the window and keep only the bytes after it.
pub fn clear_screen_tail(data: &[u8]) -> Option<usize> {
    const ERASE_DISPLAY: &[u8] = b"\x1b[2J";
    const ERASE_SCROLLBACK: &[u8] = b"\x1b[3J";

    let mut last = None;
    for seq in [ERASE_DISPLAY, ERASE_SCROLLBACK] {
        let mut from = 0;
        while from + seq.len() <= data.len() {
            match find_subsequence(&data[from..], seq) {
                Some(pos) => {
                    let end = from + pos + seq.len();
                    last = Some(last.map_or(end, |l: usize| l.max(end)));
                    from = end;
                }
                None => break,
            }
        }
    }
    last
}

fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

#[cfg(test)]
#[path = "detect_tests.rs"]
mod tests;
