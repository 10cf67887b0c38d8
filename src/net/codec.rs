//! Command codec: typed outbound commands and inbound events.
//!
//! Both vocabularies are closed. Inbound tags this client does not handle
//! decode to [`Event::Ignored`] so newer services can add events without
//! breaking older clients.

#[cfg(test)]
#[path = "codec_test.rs"]
mod codec_test;

use serde_json::{Value, json};
use wire::{Envelope, WireError};

use super::parse;
use super::types::{
    ChatMessage, DraftFields, DraftSnapshot, Item, ItemId, ItemResult, Participant, Phase, Roster, UserRating,
};

/// Error returned by [`decode_event`] and [`decode_command`].
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error(transparent)]
    Envelope(#[from] WireError),
    /// The tag is known but its payload has the wrong shape.
    #[error("malformed {command} payload: {reason}")]
    Payload { command: String, reason: &'static str },
}

// =============================================================================
// OUTBOUND
// =============================================================================

/// A message this client sends to the room service.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// Liveness ping.
    UserActive,
    /// Request the participant list.
    GetUsers,
    /// Request the curated item list.
    LoadItems,
    /// Host request to move the session to a phase.
    ChangePhase(Phase),
    /// Request the current phase.
    GetRoomState,
    /// Request aggregate results.
    GetFinalRatings,
    /// Request the local participant's submitted ratings.
    GetUserRatings,
    /// Request the stored draft for an item.
    GetFormData(ItemId),
    /// Save the draft for an item.
    SaveForm { item_id: ItemId, fields: DraftFields },
}

impl Command {
    #[must_use]
    pub fn tag(&self) -> &'static str {
        match self {
            Self::UserActive => "user_active",
            Self::GetUsers => "get_users",
            Self::LoadItems => "load_beers",
            Self::ChangePhase(_) => "change_room_state",
            Self::GetRoomState => "get_room_state",
            Self::GetFinalRatings => "get_final_ratings",
            Self::GetUserRatings => "get_user_ratings",
            Self::GetFormData(_) => "get_form_data",
            Self::SaveForm { .. } => "user_form_save",
        }
    }

    #[must_use]
    pub fn payload(&self) -> Value {
        match self {
            Self::ChangePhase(phase) => json!(phase.as_str()),
            Self::GetFormData(item_id) => json!(item_id),
            Self::SaveForm { item_id, fields } => {
                let mut data = serde_json::to_value(fields).unwrap_or_else(|_| json!({}));
                if let Some(map) = data.as_object_mut() {
                    map.insert("beer_id".to_owned(), json!(item_id));
                }
                data
            }
            _ => Value::Null,
        }
    }

    #[must_use]
    pub fn to_envelope(&self) -> Envelope {
        Envelope::new(self.tag(), self.payload())
    }
}

/// Encode a command as socket text.
#[must_use]
pub fn encode_command(command: &Command) -> String {
    wire::encode_envelope(&command.to_envelope())
}

/// Decode socket text written by [`encode_command`]. The client never
/// receives commands; this exists for stand-in servers and logs.
///
/// # Errors
///
/// Returns [`DecodeError`] for unknown tags or malformed payloads.
pub fn decode_command(text: &str) -> Result<Command, DecodeError> {
    let envelope = wire::decode_envelope(text)?;
    let data = &envelope.data;
    let malformed = |reason| DecodeError::Payload { command: envelope.command.clone(), reason };
    Ok(match envelope.command.as_str() {
        "user_active" => Command::UserActive,
        "get_users" => Command::GetUsers,
        "load_beers" => Command::LoadItems,
        "get_room_state" => Command::GetRoomState,
        "get_final_ratings" => Command::GetFinalRatings,
        "get_user_ratings" => Command::GetUserRatings,
        "change_room_state" => Command::ChangePhase(parse::parse_phase(data).ok_or_else(|| malformed("expected phase"))?),
        "get_form_data" => Command::GetFormData(parse::pick_item_id(data).ok_or_else(|| malformed("expected item id"))?),
        "user_form_save" => {
            let item_id = data
                .get("beer_id")
                .and_then(parse::pick_item_id)
                .ok_or_else(|| malformed("expected beer_id"))?;
            let fields = serde_json::from_value(data.clone()).map_err(|_| malformed("expected form fields"))?;
            Command::SaveForm { item_id, fields }
        }
        _ => return Err(malformed("unknown command")),
    })
}

// =============================================================================
// INBOUND
// =============================================================================

/// A message the room service pushes to this client.
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    /// Full participant listing (`set_users`).
    ParticipantList(Vec<Participant>),
    ParticipantJoined(Roster),
    ParticipantLeft(Roster),
    ParticipantDisconnected(Roster),
    /// Full curated item list (`set_beers`).
    ItemList(Vec<Item>),
    PhaseChanged(Phase),
    FinalResults(Vec<ItemResult>),
    UserResults(Vec<UserRating>),
    DraftSnapshot(DraftSnapshot),
    ChatMessage(ChatMessage),
    /// A well-formed envelope with a tag this client does not handle.
    Ignored { command: String },
}

impl Event {
    /// Short name used in logs.
    #[must_use]
    pub fn kind(&self) -> &str {
        match self {
            Self::ParticipantList(_) => "participant-list",
            Self::ParticipantJoined(_) => "participant-joined",
            Self::ParticipantLeft(_) => "participant-left",
            Self::ParticipantDisconnected(_) => "participant-disconnected",
            Self::ItemList(_) => "item-list",
            Self::PhaseChanged(_) => "phase-changed",
            Self::FinalResults(_) => "final-results",
            Self::UserResults(_) => "user-results",
            Self::DraftSnapshot(_) => "draft-snapshot",
            Self::ChatMessage(_) => "chat-message",
            Self::Ignored { command } => command,
        }
    }
}

/// Decode socket text into an event.
///
/// # Errors
///
/// Returns [`DecodeError::Envelope`] when the text is not an envelope and
/// [`DecodeError::Payload`] when a known tag carries an unusable payload.
pub fn decode_event(text: &str) -> Result<Event, DecodeError> {
    let envelope = wire::decode_envelope(text)?;
    let data = &envelope.data;
    let malformed = |reason| DecodeError::Payload { command: envelope.command.clone(), reason };
    Ok(match envelope.command.as_str() {
        "set_users" => match parse::parse_roster(data) {
            Some(Roster::Snapshot(list)) => Event::ParticipantList(list),
            Some(Roster::Single(participant)) => Event::ParticipantList(vec![participant]),
            None => return Err(malformed("expected participant list")),
        },
        "user_join" => Event::ParticipantJoined(parse::parse_roster(data).ok_or_else(|| malformed("expected participant"))?),
        "user_leave" => Event::ParticipantLeft(parse::parse_roster(data).ok_or_else(|| malformed("expected participant"))?),
        "user_disconnect" => {
            Event::ParticipantDisconnected(parse::parse_roster(data).ok_or_else(|| malformed("expected participant"))?)
        }
        "set_beers" => Event::ItemList(parse::parse_rows(data, "beers").ok_or_else(|| malformed("expected item list"))?),
        "set_room_state" => Event::PhaseChanged(parse::parse_phase(data).ok_or_else(|| malformed("expected phase"))?),
        "set_final_results" => {
            Event::FinalResults(parse::parse_rows(data, "results").ok_or_else(|| malformed("expected result list"))?)
        }
        "set_user_results" => {
            Event::UserResults(parse::parse_rows(data, "results").ok_or_else(|| malformed("expected rating list"))?)
        }
        "set_form_data" => {
            Event::DraftSnapshot(parse::parse_draft_snapshot(data).ok_or_else(|| malformed("expected form data"))?)
        }
        "set_new_message" => Event::ChatMessage(parse::parse_chat(data).ok_or_else(|| malformed("expected message"))?),
        _ => Event::Ignored { command: envelope.command.clone() },
    })
}
