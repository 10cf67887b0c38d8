use super::*;

// =============================================================
// Helpers
// =============================================================

fn user(id: &str, name: &str) -> Participant {
    Participant { id: id.to_owned(), username: name.to_owned(), is_host: false }
}

fn item(id: ItemId, name: &str) -> Item {
    Item { id, name: name.to_owned(), ..Item::default() }
}

fn session() -> Session {
    Session::new("friday", 3)
}

fn names(session: &Session) -> Vec<&str> {
    session.participants().iter().map(|p| p.username.as_str()).collect()
}

// =============================================================
// Participants
// =============================================================

#[test]
fn participant_list_replaces_instead_of_merging() {
    let mut s = session();
    s.apply(Event::ParticipantList(vec![user("1", "alice"), user("2", "bob")]));
    s.apply(Event::ParticipantList(vec![user("3", "carol")]));
    assert_eq!(s.participants(), &[user("3", "carol")]);
}

#[test]
fn participant_set_always_equals_latest_listing() {
    let listings = [
        vec![user("1", "alice")],
        vec![user("1", "alice"), user("2", "bob"), user("3", "carol")],
        vec![],
        vec![user("2", "bob")],
    ];
    let mut s = session();
    for listing in listings {
        s.apply(Event::ParticipantList(listing.clone()));
        assert_eq!(s.participants(), listing.as_slice());
    }
}

#[test]
fn join_with_full_roster_replaces() {
    let mut s = session();
    s.apply(Event::ParticipantList(vec![user("1", "alice"), user("9", "zed")]));
    s.apply(Event::ParticipantJoined(Roster::Snapshot(vec![user("1", "alice"), user("2", "bob")])));
    assert_eq!(names(&s), vec!["alice", "bob"]);
}

#[test]
fn single_join_is_upserted() {
    let mut s = session();
    s.apply(Event::ParticipantList(vec![user("1", "alice")]));
    s.apply(Event::ParticipantJoined(Roster::Single(user("2", "bob"))));
    s.apply(Event::ParticipantJoined(Roster::Single(user("2", "bob"))));
    assert_eq!(names(&s), vec!["alice", "bob"]);
}

#[test]
fn single_leave_and_disconnect_remove() {
    let mut s = session();
    s.apply(Event::ParticipantList(vec![user("1", "alice"), user("2", "bob"), user("3", "carol")]));
    s.apply(Event::ParticipantLeft(Roster::Single(user("2", "bob"))));
    s.apply(Event::ParticipantDisconnected(Roster::Single(Participant::named("carol"))));
    assert_eq!(names(&s), vec!["alice"]);
}

#[test]
fn leave_for_unknown_participant_is_harmless() {
    let mut s = session();
    s.apply(Event::ParticipantList(vec![user("1", "alice")]));
    let t = s.apply(Event::ParticipantLeft(Roster::Single(user("42", "ghost"))));
    assert_eq!(t, Transition::default());
    assert_eq!(names(&s), vec!["alice"]);
}

// =============================================================
// Items
// =============================================================

#[test]
fn item_list_is_idempotent() {
    let items = vec![item(1, "Pils"), item(2, "Stout")];
    let mut once = session();
    once.apply(Event::ItemList(items.clone()));

    let mut twice = session();
    let first = twice.apply(Event::ItemList(items.clone()));
    let second = twice.apply(Event::ItemList(items));

    assert_eq!(once.items(), twice.items());
    assert!(first.items_changed);
    assert!(!second.items_changed);
}

#[test]
fn item_lookup_by_id() {
    let mut s = session();
    s.apply(Event::ItemList(vec![item(4, "A"), item(7, "B")]));
    assert_eq!(s.item(7).map(|i| i.name.as_str()), Some("B"));
    assert_eq!(s.item_position(7), Some(1));
    assert!(s.item(99).is_none());
}

// =============================================================
// Phase
// =============================================================

#[test]
fn new_session_starts_waiting() {
    assert_eq!(session().phase(), Phase::Waiting);
}

#[test]
fn entering_starting_requests_items() {
    let mut s = session();
    let t = s.apply(Event::PhaseChanged(Phase::Starting));
    assert_eq!(s.phase(), Phase::Starting);
    assert_eq!(t.commands, vec![Command::LoadItems]);
    assert_eq!(t.phase_change, Some(PhaseChange { from: Phase::Waiting, to: Phase::Starting }));
}

#[test]
fn entering_in_progress_twice_requests_items_once() {
    let mut s = session();
    s.apply(Event::PhaseChanged(Phase::Starting));
    let first = s.apply(Event::PhaseChanged(Phase::InProgress));
    let duplicate = s.apply(Event::PhaseChanged(Phase::InProgress));

    let load_requests = first.commands.iter().chain(&duplicate.commands).filter(|c| **c == Command::LoadItems).count();
    assert_eq!(load_requests, 1);
    assert_eq!(duplicate, Transition::default());
}

#[test]
fn entering_finished_requests_both_result_sets() {
    let mut s = session();
    s.apply(Event::PhaseChanged(Phase::InProgress));
    let t = s.apply(Event::PhaseChanged(Phase::Finished));
    assert_eq!(t.commands, vec![Command::GetUserRatings, Command::GetFinalRatings]);
}

#[test]
fn host_revision_back_to_starting_is_applied() {
    let mut s = session();
    s.apply(Event::PhaseChanged(Phase::InProgress));
    let t = s.apply(Event::PhaseChanged(Phase::Starting));
    assert_eq!(s.phase(), Phase::Starting);
    assert_eq!(t.commands, vec![Command::LoadItems]);
}

#[test]
fn unexpected_back_edge_still_follows_the_service() {
    let mut s = session();
    s.apply(Event::PhaseChanged(Phase::Starting));
    let t = s.apply(Event::PhaseChanged(Phase::Waiting));
    assert_eq!(s.phase(), Phase::Waiting);
    assert!(t.commands.is_empty());
}

// =============================================================
// Results
// =============================================================

fn result_row(order: i64) -> ItemResult {
    ItemResult {
        order,
        beer: crate::net::types::ItemSummary { name: format!("beer {order}"), ..Default::default() },
        average_rating: Some(5.0),
    }
}

#[test]
fn final_results_only_populate_when_finished() {
    let mut s = session();
    s.apply(Event::FinalResults(vec![result_row(1)]));
    assert!(s.final_results().is_empty());

    s.apply(Event::PhaseChanged(Phase::Finished));
    s.apply(Event::FinalResults(vec![result_row(1), result_row(2)]));
    assert_eq!(s.final_results().len(), 2);

    // A refresh replaces the previous rows.
    s.apply(Event::FinalResults(vec![result_row(3)]));
    assert_eq!(s.final_results(), &[result_row(3)]);
}

#[test]
fn user_results_replace() {
    let mut s = session();
    s.apply(Event::UserResults(vec![UserRating::default(), UserRating::default()]));
    s.apply(Event::UserResults(vec![UserRating { score: Some(4), ..UserRating::default() }]));
    assert_eq!(s.user_results().len(), 1);
}

// =============================================================
// Draft / chat / ignored
// =============================================================

#[test]
fn draft_snapshot_is_handed_to_the_owner() {
    let mut s = session();
    let snapshot = DraftSnapshot { item_id: Some(1), ..DraftSnapshot::default() };
    let t = s.apply(Event::DraftSnapshot(snapshot.clone()));
    assert_eq!(t.draft, Some(snapshot));
}

#[test]
fn log_is_bounded_oldest_first_out() {
    let mut s = session();
    for i in 0..5 {
        s.apply(Event::ChatMessage(ChatMessage { message: format!("m{i}"), user: "bob".into() }));
    }
    let kept: Vec<_> = s.log().map(|m| m.message.as_str()).collect();
    assert_eq!(kept, vec!["m2", "m3", "m4"]);
}

#[test]
fn ignored_event_changes_nothing() {
    let mut s = session();
    s.apply(Event::ParticipantList(vec![user("1", "alice")]));
    let t = s.apply(Event::Ignored { command: "set_confetti".into() });
    assert_eq!(t, Transition::default());
    assert_eq!(names(&s), vec!["alice"]);
    assert_eq!(s.phase(), Phase::Waiting);
}
