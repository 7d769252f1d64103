// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end scenarios against real file-backed persistence.

use std::time::Duration;

use bytes::Bytes;

use prompter::control::parse_command_line;
use prompter::event::{EngineCommand, EngineMode};
use prompter_specs::{read_until, start};

#[tokio::test(start_paused = true)]
async fn full_cycle_persists_history_across_restart() {
    let dir = tempfile::tempdir().expect("tempdir");

    {
        let mut s = start(dir.path(), 1).expect("start engine");
        s.handle
            .command(EngineCommand::Enqueue {
                content: "make test".into(),
                terminal_id: Some(1),
                execute_at: None,
            })
            .await
            .expect("enqueue");

        let seen = read_until(&mut s.terminals[0], b"\r").await;
        assert_eq!(seen, b"make test\r".to_vec());

        // Wait for the completion to drain into history.
        let mut done = false;
        for _ in 0..200 {
            if s.handle.history().await.is_ok_and(|h| h.len() == 1) {
                done = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert!(done, "delivery never reached history");
        s.shutdown.cancel();
    }

    // A fresh engine over the same state directory sees the history and an
    // empty queue.
    let s = start(dir.path(), 1).expect("restart engine");
    let history = s.handle.history().await.expect("history");
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].content, "make test");
    assert!(s.handle.queue().await.expect("queue").is_empty());
    s.shutdown.cancel();
}

#[tokio::test(start_paused = true)]
async fn queue_reorder_survives_restart_on_disk() {
    let dir = tempfile::tempdir().expect("tempdir");

    {
        let s = start(dir.path(), 1).expect("start engine");
        s.handle.command(EngineCommand::PauseInjection).await.expect("pause");
        for content in ["A", "B"] {
            s.handle
                .command(EngineCommand::Enqueue {
                    content: content.into(),
                    terminal_id: Some(1),
                    execute_at: None,
                })
                .await
                .expect("enqueue");
        }
        s.handle.command(EngineCommand::Reorder { from: 1, to: 0 }).await.expect("reorder");
        let queue = s.handle.queue().await.expect("queue");
        assert_eq!(queue.len(), 2);
        s.shutdown.cancel();
    }

    let s = start(dir.path(), 1).expect("restart engine");
    s.handle.command(EngineCommand::PauseInjection).await.expect("pause");
    let queue = s.handle.queue().await.expect("queue");
    let contents: Vec<&str> = queue.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["B", "A"]);
    let ids: Vec<u64> = queue.iter().map(|m| m.id).collect();
    assert_eq!(ids, vec![2, 1]);
    s.shutdown.cancel();
}

#[tokio::test(start_paused = true)]
async fn usage_limit_wait_resumes_after_restart() {
    let dir = tempfile::tempdir().expect("tempdir");

    {
        let s = start(dir.path(), 1).expect("start engine");
        s.terminals[0]
            .feed_tx
            .send(Bytes::from_static(
                b"Claude usage limit reached. Your limit will reset at 3am",
            ))
            .await
            .expect("feed limit");

        let mut waiting = false;
        for _ in 0..200 {
            if s.handle.status().await.is_ok_and(|st| st.waiting_for_usage_limit) {
                waiting = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert!(waiting, "engine never entered waiting mode");
        s.shutdown.cancel();
    }

    // Restart: the persisted absolute reset time puts the engine straight
    // back into waiting mode with a running countdown.
    let s = start(dir.path(), 1).expect("restart engine");
    let status = s.handle.status().await.expect("status");
    assert!(status.waiting_for_usage_limit);
    assert_eq!(status.mode, EngineMode::WaitingForUsageLimit);
    assert_eq!(status.usage_limit_reset.as_deref(), Some("3am"));

    // The lingering announcement does not re-arm a second timer.
    s.terminals[0]
        .feed_tx
        .send(Bytes::from_static(
            b"Claude usage limit reached. Your limit will reset at 3am",
        ))
        .await
        .expect("feed duplicate");
    tokio::time::sleep(Duration::from_secs(2)).await;
    let hits = s.handle.search_log("usage limit reached").await.expect("search");
    assert!(hits.is_empty(), "duplicate announcement re-armed the timer");
    s.shutdown.cancel();
}

#[tokio::test(start_paused = true)]
async fn control_protocol_drives_the_engine() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut s = start(dir.path(), 1).expect("start engine");

    // Commands exactly as they arrive on stdin.
    for line in [
        r#"{"cmd":"add_keyword_rule","keyword":"[Claude Code]","response":"do not credit yourself"}"#,
        r#"{"cmd":"enqueue","content":"hello","terminal_id":1}"#,
    ] {
        let cmd = parse_command_line(line).expect("parse");
        s.handle.command(cmd).await.expect("send");
    }

    let status = s.handle.status().await.expect("status");
    assert_eq!(status.keyword_rules.len(), 1);
    assert_eq!(status.queue_len, 1);

    let seen = read_until(&mut s.terminals[0], b"\r").await;
    assert_eq!(seen, b"hello\r".to_vec());
    s.shutdown.cancel();
}

#[tokio::test(start_paused = true)]
async fn multi_terminal_round_robin_delivery() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut s = start(dir.path(), 3).expect("start engine");

    for (content, terminal_id) in [("one", 1), ("two", 2), ("three", 3)] {
        s.handle
            .command(EngineCommand::Enqueue {
                content: content.into(),
                terminal_id: Some(terminal_id),
                execute_at: None,
            })
            .await
            .expect("enqueue");
    }

    let mut t3 = s.terminals.pop().expect("t3");
    let mut t2 = s.terminals.pop().expect("t2");
    let mut t1 = s.terminals.pop().expect("t1");
    assert_eq!(read_until(&mut t1, b"\r").await, b"one\r".to_vec());
    assert_eq!(read_until(&mut t2, b"\r").await, b"two\r".to_vec());
    assert_eq!(read_until(&mut t3, b"\r").await, b"three\r".to_vec());
    s.shutdown.cancel();
}
