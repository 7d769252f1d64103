// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use super::{keystrokes, spawn, Completion, JitterMs, Keystroke, Outcome, Pacing, TypingJob};

#[yare::parameterized(
    plain = { "ls", 2, false },
    ctrl_c = { "hello^C", 6, true },
    ctrl_z = { "^Z", 1, true },
    escape = { "\\x1b", 1, true },
    carriage = { "a\\rb", 3, true },
    tab = { "\\t", 1, true },
    lowercase_not_marker = { "^c", 2, false },
    unicode = { "héllo", 5, false },
)]
fn tokenization(text: &str, count: usize, has_control: bool) {
    let (keys, control) = keystrokes(text);
    assert_eq!(keys.len(), count);
    assert_eq!(control, has_control);
}

#[test]
fn control_escape_translation() {
    let (keys, control) = keystrokes("hello^C");
    assert!(control);
    assert_eq!(keys[5], Keystroke::Control(0x03));
    assert_eq!(keys[0], Keystroke::Char('h'));

    let (keys, _) = keystrokes("^Z^D\\x1b\\r\\t");
    let bytes: Vec<u8> = keys
        .iter()
        .map(|k| match k {
            Keystroke::Control(b) => *b,
            Keystroke::Char(_) => 0,
        })
        .collect();
    assert_eq!(bytes, vec![0x1a, 0x04, 0x1b, 0x0d, 0x09]);
}

struct Harness {
    input_rx: mpsc::Receiver<Bytes>,
    done_rx: mpsc::Receiver<Completion>,
    gate_tx: watch::Sender<bool>,
    cancel: CancellationToken,
}

fn start(text: &str, pacing: Pacing, gate: bool) -> Harness {
    let (input_tx, input_rx) = mpsc::channel(256);
    let (done_tx, done_rx) = mpsc::channel(4);
    let (gate_tx, gate_rx) = watch::channel(gate);
    let cancel = CancellationToken::new();
    spawn(TypingJob {
        injection_id: 1,
        message_id: 1,
        terminal_id: 1,
        text: text.to_owned(),
        input_tx,
        gate_rx,
        cancel: cancel.clone(),
        done_tx,
        pacing,
    });
    Harness { input_rx, done_rx, gate_tx, cancel }
}

async fn collect_bytes(rx: &mut mpsc::Receiver<Bytes>) -> Vec<u8> {
    let mut out = Vec::new();
    while let Some(b) = rx.recv().await {
        out.extend_from_slice(&b);
    }
    out
}

#[tokio::test(start_paused = true)]
async fn plain_text_ends_with_return() {
    let mut h = start("ls", Pacing::default(), false);
    let done = h.done_rx.recv().await.expect("completion");
    assert_eq!(done.outcome, Outcome::Delivered);
    let bytes = collect_bytes(&mut h.input_rx).await;
    assert_eq!(bytes, b"ls\r".to_vec());
}

#[tokio::test(start_paused = true)]
async fn control_message_has_no_return() {
    let mut h = start("hello^C", Pacing::default(), false);
    let done = h.done_rx.recv().await.expect("completion");
    assert_eq!(done.outcome, Outcome::Delivered);
    let bytes = collect_bytes(&mut h.input_rx).await;
    assert_eq!(bytes, vec![b'h', b'e', b'l', b'l', b'o', 0x03]);
}

#[tokio::test(start_paused = true)]
async fn no_extra_spacing_before_return() {
    let pacing = Pacing {
        per_char: Duration::from_millis(50),
        control_spacing: Duration::from_millis(10),
        return_delay: JitterMs(200, 200),
        settle: JitterMs(0, 0),
    };
    let started = tokio::time::Instant::now();
    let mut h = start("ab", pacing, false);
    let done = h.done_rx.recv().await.expect("completion");
    assert_eq!(done.outcome, Outcome::Delivered);
    // One inter-key gap plus the fixed return delay; no per-char pace
    // trails the last character.
    assert_eq!(started.elapsed(), Duration::from_millis(50 + 200));
    let bytes = collect_bytes(&mut h.input_rx).await;
    assert_eq!(bytes, b"ab\r".to_vec());
}

#[tokio::test(start_paused = true)]
async fn control_spacing_applies_between_units_only() {
    let pacing = Pacing {
        per_char: Duration::from_millis(50),
        control_spacing: Duration::from_millis(10),
        // Would dominate the elapsed time if the control path ever
        // reached the Return sequence.
        return_delay: JitterMs(500, 500),
        settle: JitterMs(500, 500),
    };
    let started = tokio::time::Instant::now();
    let mut h = start("^C^Z", pacing, false);
    let done = h.done_rx.recv().await.expect("completion");
    assert_eq!(done.outcome, Outcome::Delivered);
    assert_eq!(started.elapsed(), Duration::from_millis(10));
    let bytes = collect_bytes(&mut h.input_rx).await;
    assert_eq!(bytes, vec![0x03, 0x1a]);
}

#[tokio::test(start_paused = true)]
async fn unicode_characters_written_whole() {
    let mut h = start("é", Pacing::instant(), false);
    let done = h.done_rx.recv().await.expect("completion");
    assert_eq!(done.outcome, Outcome::Delivered);
    let bytes = collect_bytes(&mut h.input_rx).await;
    assert_eq!(bytes, "é\r".as_bytes().to_vec());
}

#[tokio::test(start_paused = true)]
async fn raised_gate_blocks_all_bytes() {
    let mut h = start("ls", Pacing::instant(), true);
    // Give the task ample fake time: it must stay parked on the gate.
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(h.input_rx.try_recv().is_err());

    // Lowering the gate resumes from the remembered position.
    let _ = h.gate_tx.send(false);
    let done = h.done_rx.recv().await.expect("completion");
    assert_eq!(done.outcome, Outcome::Delivered);
    let bytes = collect_bytes(&mut h.input_rx).await;
    assert_eq!(bytes, b"ls\r".to_vec());
}

#[tokio::test(start_paused = true)]
async fn cancel_before_start_emits_nothing() {
    // The task has not been polled yet when we cancel, so its first
    // checkpoint must catch the token.
    let mut h = start("ls", Pacing::instant(), false);
    h.cancel.cancel();
    let done = h.done_rx.recv().await.expect("completion");
    assert_eq!(done.outcome, Outcome::Cancelled);
    let bytes = collect_bytes(&mut h.input_rx).await;
    assert!(bytes.is_empty());
}

#[tokio::test(start_paused = true)]
async fn cancel_mid_message_stops_at_pacing_tick() {
    let mut h = start("abc", Pacing::default(), false);
    let first = h.input_rx.recv().await.expect("first byte");
    assert_eq!(&first[..], b"a");
    // The task is now parked in its per-char sleep; cancelling wakes it
    // before any further byte is written.
    h.cancel.cancel();
    let done = h.done_rx.recv().await.expect("completion");
    assert_eq!(done.outcome, Outcome::Cancelled);
    let rest = collect_bytes(&mut h.input_rx).await;
    assert!(rest.is_empty());
}

#[tokio::test(start_paused = true)]
async fn closed_input_reports_write_failure() {
    let (input_tx, input_rx) = mpsc::channel(4);
    drop(input_rx);
    let (done_tx, mut done_rx) = mpsc::channel(4);
    let (_gate_tx, gate_rx) = watch::channel(false);
    spawn(TypingJob {
        injection_id: 9,
        message_id: 7,
        terminal_id: 2,
        text: "x".to_owned(),
        input_tx,
        gate_rx,
        cancel: CancellationToken::new(),
        done_tx,
        pacing: Pacing::instant(),
    });
    let done = done_rx.recv().await.expect("completion");
    assert_eq!(done.message_id, 7);
    assert!(matches!(done.outcome, Outcome::WriteFailed(_)));
}

#[tokio::test(start_paused = true)]
async fn parallel_executors_interleave() {
    let h1 = start("pwd", Pacing::default(), false);
    let h2 = start("date", Pacing::default(), false);
    let mut h1 = h1;
    let mut h2 = h2;
    let d1 = h1.done_rx.recv().await.expect("completion 1");
    let d2 = h2.done_rx.recv().await.expect("completion 2");
    assert_eq!(d1.outcome, Outcome::Delivered);
    assert_eq!(d2.outcome, Outcome::Delivered);
    assert_eq!(collect_bytes(&mut h1.input_rx).await, b"pwd\r".to_vec());
    assert_eq!(collect_bytes(&mut h2.input_rx).await, b"date\r".to_vec());
}
