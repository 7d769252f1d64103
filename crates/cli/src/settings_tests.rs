// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde_json::json;

use super::{JsonSettings, SettingsStore, KEY_USAGE_LIMIT_RESET};
use crate::queue::{HistoryEntry, Message, MessageQueue};

fn store() -> (tempfile::TempDir, JsonSettings) {
    let dir = tempfile::tempdir().expect("tempdir");
    let settings = JsonSettings::open(dir.path()).expect("open store");
    (dir, settings)
}

#[test]
fn scalar_get_set_roundtrip() {
    let (_dir, settings) = store();
    assert_eq!(settings.get("auto_continue"), None);
    settings.set("auto_continue", json!(true)).expect("set");
    assert_eq!(settings.get("auto_continue"), Some(json!(true)));
}

#[test]
fn settings_survive_reopen() {
    let dir = tempfile::tempdir().expect("tempdir");
    {
        let settings = JsonSettings::open(dir.path()).expect("open");
        settings.set("volume", json!(50)).expect("set");
    }
    let settings = JsonSettings::open(dir.path()).expect("reopen");
    assert_eq!(settings.get("volume"), Some(json!(50)));
}

#[test]
fn queue_roundtrip_preserves_order_and_ids() {
    let (_dir, settings) = store();
    let mut queue = MessageQueue::new();
    let _ = queue.enqueue("A", 1, 1000, None);
    let _ = queue.enqueue("B", 1, 1001, None);
    queue.reorder(1, 0).expect("reorder");

    settings.save_message_queue(queue.items()).expect("save");
    let loaded = settings.load_message_queue().expect("load");
    let contents: Vec<&str> = loaded.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["B", "A"]);
    let ids: Vec<u64> = loaded.iter().map(|m| m.id).collect();
    assert_eq!(ids, vec![2, 1]);
}

#[test]
fn queue_load_without_file_is_empty() {
    let (_dir, settings) = store();
    assert!(settings.load_message_queue().expect("load").is_empty());
    assert!(settings.load_message_history().expect("load").is_empty());
}

#[test]
fn persisted_message_fields_are_stable() {
    // The on-disk field names are a contract with prior versions.
    let message = Message {
        id: 7,
        content: "ls".into(),
        processed_content: "ls".into(),
        execute_at: 123,
        created_at: 100,
        sequence: 3,
        terminal_id: 2,
    };
    let value = serde_json::to_value(&message).expect("serialize");
    for field in
        ["id", "content", "processed_content", "execute_at", "created_at", "sequence", "terminal_id"]
    {
        assert!(value.get(field).is_some(), "missing field {field}");
    }
}

#[test]
fn history_roundtrip() {
    let (_dir, settings) = store();
    let entries =
        vec![HistoryEntry { id: 1, content: "done".into(), terminal_id: 1, completed_at: 42 }];
    settings.save_message_history(&entries).expect("save");
    assert_eq!(settings.load_message_history().expect("load"), entries);
}

#[test]
fn app_state_set_get_and_remove() {
    let (_dir, settings) = store();
    assert_eq!(settings.get_app_state(KEY_USAGE_LIMIT_RESET), None);
    settings.set_app_state(KEY_USAGE_LIMIT_RESET, Some("3am")).expect("set");
    assert_eq!(settings.get_app_state(KEY_USAGE_LIMIT_RESET), Some("3am".to_owned()));
    settings.set_app_state(KEY_USAGE_LIMIT_RESET, None).expect("clear");
    assert_eq!(settings.get_app_state(KEY_USAGE_LIMIT_RESET), None);
}

#[test]
fn writes_leave_no_tmp_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let settings = JsonSettings::open(dir.path()).expect("open");
    settings.set("k", json!(1)).expect("set");
    let leftovers: Vec<_> = std::fs::read_dir(dir.path())
        .expect("read_dir")
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().is_some_and(|ext| ext == "tmp"))
        .collect();
    assert!(leftovers.is_empty());
}
