//! Local projection of one tasting session.
//!
//! SYSTEM CONTEXT
//! ==============
//! The room service is authoritative. This model only folds inbound events
//! into state, in arrival order, and reports what changed so the owner can
//! run side effects (requests on phase entry, draft hydration) exactly once
//! per actual transition.

#[cfg(test)]
#[path = "session_test.rs"]
mod session_test;

use std::collections::VecDeque;

use tracing::{debug, info, warn};

use crate::net::codec::{Command, Event};
use crate::net::types::{ChatMessage, DraftSnapshot, Item, ItemId, ItemResult, Participant, Phase, Roster, UserRating};

/// A phase move applied by [`Session::apply`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PhaseChange {
    pub from: Phase,
    pub to: Phase,
}

/// What applying one event changed.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Transition {
    /// Requests to issue because of this event.
    pub commands: Vec<Command>,
    pub phase_change: Option<PhaseChange>,
    /// The curated item list differs from before.
    pub items_changed: bool,
    /// A draft snapshot for the draft controller.
    pub draft: Option<DraftSnapshot>,
}

/// Session state for one open view.
#[derive(Clone, Debug)]
pub struct Session {
    name: String,
    phase: Phase,
    participants: Vec<Participant>,
    items: Vec<Item>,
    log: VecDeque<ChatMessage>,
    log_capacity: usize,
    final_results: Vec<ItemResult>,
    user_results: Vec<UserRating>,
}

impl Session {
    /// A fresh session. The phase is `WAITING` until the service says
    /// otherwise.
    #[must_use]
    pub fn new(name: impl Into<String>, log_capacity: usize) -> Self {
        Self {
            name: name.into(),
            phase: Phase::Waiting,
            participants: Vec::new(),
            items: Vec::new(),
            log: VecDeque::new(),
            log_capacity: log_capacity.max(1),
            final_results: Vec::new(),
            user_results: Vec::new(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    #[must_use]
    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }

    #[must_use]
    pub fn items(&self) -> &[Item] {
        &self.items
    }

    #[must_use]
    pub fn item(&self, id: ItemId) -> Option<&Item> {
        self.items.iter().find(|item| item.id == id)
    }

    #[must_use]
    pub fn item_position(&self, id: ItemId) -> Option<usize> {
        self.items.iter().position(|item| item.id == id)
    }

    /// Chat and log lines, oldest first.
    pub fn log(&self) -> impl Iterator<Item = &ChatMessage> {
        self.log.iter()
    }

    #[must_use]
    pub fn final_results(&self) -> &[ItemResult] {
        &self.final_results
    }

    #[must_use]
    pub fn user_results(&self) -> &[UserRating] {
        &self.user_results
    }

    /// Fold one inbound event into the session.
    pub fn apply(&mut self, event: Event) -> Transition {
        let mut transition = Transition::default();
        match event {
            Event::ParticipantList(list) => self.participants = list,
            Event::ParticipantJoined(roster) => match roster {
                Roster::Snapshot(list) => self.participants = list,
                Roster::Single(participant) => self.upsert_participant(participant),
            },
            Event::ParticipantLeft(roster) | Event::ParticipantDisconnected(roster) => match roster {
                Roster::Snapshot(list) => self.participants = list,
                Roster::Single(participant) => self.remove_participant(&participant),
            },
            Event::ItemList(items) => {
                transition.items_changed = items != self.items;
                self.items = items;
            }
            Event::PhaseChanged(next) => self.change_phase(next, &mut transition),
            Event::FinalResults(rows) => {
                if self.phase == Phase::Finished {
                    self.final_results = rows;
                } else {
                    debug!(room = %self.name, phase = %self.phase, "ignoring final results outside FINISHED");
                }
            }
            Event::UserResults(rows) => self.user_results = rows,
            Event::DraftSnapshot(snapshot) => transition.draft = Some(snapshot),
            Event::ChatMessage(message) => self.push_log(message),
            Event::Ignored { command } => debug!(room = %self.name, %command, "ignoring unhandled event"),
        }
        transition
    }

    fn change_phase(&mut self, next: Phase, transition: &mut Transition) {
        let from = self.phase;
        if from == next {
            debug!(room = %self.name, phase = %next, "phase unchanged");
            return;
        }
        if !from.is_expected_transition(next) {
            warn!(room = %self.name, %from, to = %next, "unexpected phase transition");
        }
        info!(room = %self.name, %from, to = %next, "phase changed");
        self.phase = next;
        if from == Phase::Finished {
            self.final_results.clear();
        }
        transition.phase_change = Some(PhaseChange { from, to: next });
        transition.commands = match next {
            Phase::Waiting => Vec::new(),
            Phase::Starting | Phase::InProgress => vec![Command::LoadItems],
            Phase::Finished => vec![Command::GetUserRatings, Command::GetFinalRatings],
        };
    }

    fn upsert_participant(&mut self, participant: Participant) {
        match self.participants.iter_mut().find(|p| p.same_account(&participant)) {
            Some(existing) => *existing = participant,
            None => self.participants.push(participant),
        }
    }

    fn remove_participant(&mut self, participant: &Participant) {
        let before = self.participants.len();
        self.participants.retain(|p| !p.same_account(participant));
        if self.participants.len() == before {
            debug!(room = %self.name, user = %participant.username, "departure for unknown participant");
        }
    }

    fn push_log(&mut self, message: ChatMessage) {
        self.log.push_back(message);
        while self.log.len() > self.log_capacity {
            self.log.pop_front();
        }
    }
}
