use super::*;
use crate::net::types::Item;
use serde_json::json;

// =============================================================
// Roster
// =============================================================

#[test]
fn roster_array_is_a_snapshot_and_skips_bad_rows() {
    let roster = parse_roster(&json!([
        {"id": 1, "username": "alice"},
        {"id": 2},
        "bob",
        ""
    ]))
    .unwrap();
    let Roster::Snapshot(list) = roster else {
        panic!("expected snapshot");
    };
    let names: Vec<_> = list.iter().map(|p| p.username.as_str()).collect();
    assert_eq!(names, vec!["alice", "bob"]);
}

#[test]
fn roster_single_user_from_object_or_string() {
    assert_eq!(
        parse_roster(&json!({"id": "9", "username": "carol"})),
        Some(Roster::Single(Participant { id: "9".into(), username: "carol".into(), is_host: false }))
    );
    assert_eq!(parse_roster(&json!("dave")), Some(Roster::Single(Participant::named("dave"))));
    assert_eq!(parse_roster(&json!(42)), None);
}

// =============================================================
// Rows
// =============================================================

#[test]
fn rows_accept_bare_array_or_wrapped_list() {
    let bare = parse_rows::<Item>(&json!([{"id": 1, "name": "A"}]), "beers").unwrap();
    let wrapped = parse_rows::<Item>(&json!({"beers": [{"id": 1, "name": "A"}]}), "beers").unwrap();
    assert_eq!(bare, wrapped);
    assert_eq!(bare.len(), 1);
}

#[test]
fn rows_drop_malformed_entries_only() {
    let items = parse_rows::<Item>(&json!([{"id": 1, "name": "A"}, {"name": "no id"}, {"id": 2, "name": "B"}]), "beers")
        .unwrap();
    assert_eq!(items.iter().map(|i| i.id).collect::<Vec<_>>(), vec![1, 2]);
}

#[test]
fn rows_reject_non_list_payload() {
    assert!(parse_rows::<Item>(&json!("nope"), "beers").is_none());
    assert!(parse_rows::<Item>(&json!({"other": []}), "beers").is_none());
}

// =============================================================
// Phase / draft / chat
// =============================================================

#[test]
fn phase_from_room_object_or_string() {
    assert_eq!(parse_phase(&json!({"name": "r", "state": "IN_PROGRESS"})), Some(Phase::InProgress));
    assert_eq!(parse_phase(&json!("STARTING")), Some(Phase::Starting));
    assert_eq!(parse_phase(&json!({"name": "r"})), None);
    assert_eq!(parse_phase(&json!("LATER")), None);
}

#[test]
fn draft_snapshot_reads_fields_and_item() {
    let snapshot = parse_draft_snapshot(&json!({"color": "amber", "note": 4, "beer_id": "12"})).unwrap();
    assert_eq!(snapshot.item_id, Some(12));
    assert_eq!(snapshot.fields.color, "amber");
    assert_eq!(snapshot.fields.score, Some(4));
}

#[test]
fn null_draft_snapshot_is_empty() {
    assert_eq!(parse_draft_snapshot(&Value::Null), Some(DraftSnapshot::default()));
    assert_eq!(parse_draft_snapshot(&json!([1])), None);
}

#[test]
fn chat_from_object_or_bare_text() {
    assert_eq!(
        parse_chat(&json!({"message": "hi", "user": "bob"})),
        Some(ChatMessage { message: "hi".into(), user: "bob".into() })
    );
    assert_eq!(parse_chat(&json!("bob joined")).map(|m| m.user), Some(String::new()));
    assert_eq!(parse_chat(&json!(null)), None);
}
