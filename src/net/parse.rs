//! Tolerant payload readers used by the command codec.
//!
//! Each reader returns `None` when the payload as a whole has the wrong
//! shape. Individual malformed rows inside a list are dropped with a warning
//! so one bad entry never discards the rest of a listing.

#[cfg(test)]
#[path = "parse_test.rs"]
mod parse_test;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use super::types::{ChatMessage, DraftFields, DraftSnapshot, ItemId, Participant, Phase, Roster};

pub(super) fn parse_roster(data: &Value) -> Option<Roster> {
    match data {
        Value::Array(rows) => Some(Roster::Snapshot(rows.iter().filter_map(parse_participant).collect())),
        Value::Object(_) | Value::String(_) => parse_participant(data).map(Roster::Single),
        _ => None,
    }
}

fn parse_participant(row: &Value) -> Option<Participant> {
    if let Some(name) = row.as_str() {
        let name = name.trim();
        return (!name.is_empty()).then(|| Participant::named(name));
    }
    match serde_json::from_value::<Participant>(row.clone()) {
        Ok(participant) => Some(participant),
        Err(e) => {
            warn!(error = %e, "dropping malformed participant row");
            None
        }
    }
}

/// Read a list payload row by row. Also accepts an object wrapping the list
/// under `key` (room detail responses embed `beers` this way).
pub(super) fn parse_rows<T: DeserializeOwned>(data: &Value, key: &str) -> Option<Vec<T>> {
    let rows = match data {
        Value::Array(rows) => rows,
        Value::Object(map) => map.get(key)?.as_array()?,
        _ => return None,
    };
    Some(
        rows.iter()
            .filter_map(|row| match serde_json::from_value::<T>(row.clone()) {
                Ok(parsed) => Some(parsed),
                Err(e) => {
                    warn!(error = %e, key, "dropping malformed row");
                    None
                }
            })
            .collect(),
    )
}

/// Phase from a bare string or a room object carrying `state`.
pub(super) fn parse_phase(data: &Value) -> Option<Phase> {
    let raw = match data {
        Value::String(s) => s.as_str(),
        Value::Object(map) => map.get("state")?.as_str()?,
        _ => return None,
    };
    Phase::parse(raw)
}

/// A draft snapshot. `null` means the service holds nothing for the item.
pub(super) fn parse_draft_snapshot(data: &Value) -> Option<DraftSnapshot> {
    match data {
        Value::Null => Some(DraftSnapshot::default()),
        Value::Object(map) => {
            let fields = match serde_json::from_value::<DraftFields>(data.clone()) {
                Ok(fields) => fields,
                Err(e) => {
                    debug!(error = %e, "malformed form data");
                    return None;
                }
            };
            let item_id = map.get("beer_id").and_then(pick_item_id);
            Some(DraftSnapshot { item_id, fields })
        }
        _ => None,
    }
}

pub(super) fn parse_chat(data: &Value) -> Option<ChatMessage> {
    match data {
        Value::String(message) => Some(ChatMessage { message: message.clone(), user: String::new() }),
        Value::Object(_) => match serde_json::from_value(data.clone()) {
            Ok(message) => Some(message),
            Err(e) => {
                debug!(error = %e, "malformed chat message");
                None
            }
        },
        _ => None,
    }
}

pub(super) fn pick_item_id(value: &Value) -> Option<ItemId> {
    if let Some(id) = value.as_i64() {
        return Some(id);
    }
    let Ok(id) = value.as_str()?.trim().parse() else {
        return None;
    };
    Some(id)
}
