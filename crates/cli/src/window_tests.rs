// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::OutputWindow;

#[test]
fn empty_window() {
    let w = OutputWindow::new(16);
    assert!(w.is_empty());
    assert_eq!(w.contents(), Vec::<u8>::new());
    assert_eq!(w.text(), "");
}

#[test]
fn sequential_pushes() {
    let mut w = OutputWindow::new(16);
    w.push(b"hello");
    w.push(b" world");
    assert_eq!(w.len(), 11);
    assert_eq!(w.text(), "hello world");
}

#[test]
fn overflow_keeps_tail() {
    let mut w = OutputWindow::new(8);
    w.push(b"abcdef");
    w.push(b"ghij");
    // 10 bytes written into capacity 8: the first two are gone.
    assert_eq!(w.len(), 8);
    assert_eq!(w.contents(), b"cdefghij".to_vec());
}

#[test]
fn push_larger_than_capacity() {
    let mut w = OutputWindow::new(4);
    w.push(b"abcdefgh");
    assert_eq!(w.contents(), b"efgh".to_vec());
}

#[test]
fn clear_resets() {
    let mut w = OutputWindow::new(8);
    w.push(b"abcdef");
    w.clear();
    assert!(w.is_empty());
    w.push(b"xy");
    assert_eq!(w.text(), "xy");
}

#[test]
fn tail_text_returns_suffix() {
    let mut w = OutputWindow::new(32);
    w.push(b"0123456789");
    assert_eq!(w.tail_text(4), "6789");
    assert_eq!(w.tail_text(100), "0123456789");
}

#[test]
fn exact_capacity_wraps_cleanly() {
    let mut w = OutputWindow::new(4);
    w.push(b"abcd");
    assert_eq!(w.contents(), b"abcd".to_vec());
    w.push(b"e");
    assert_eq!(w.contents(), b"bcde".to_vec());
}

#[test]
fn multibyte_cut_degrades_lossily() {
    let mut w = OutputWindow::new(4);
    // "╭" is three bytes; pushing five bytes total cuts its first byte off.
    w.push("╭ab".as_bytes());
    let text = w.text();
    assert!(text.ends_with("ab"));
}
