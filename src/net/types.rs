//! Domain types carried by session socket payloads.
//!
//! DESIGN
//! ======
//! Field names follow the room service's JSON (`brewery`, `IBU`, `note`, ...)
//! through serde renames, while the Rust names describe what the value means
//! in a tasting session. Numeric fields are read leniently because the
//! service renders decimals as strings in some payloads.

#[cfg(test)]
#[path = "types_test.rs"]
mod types_test;

use std::fmt;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Identifier of a curated tasting item.
pub type ItemId = i64;

/// Lowest and highest accepted rating score.
pub const SCORE_RANGE: std::ops::RangeInclusive<u8> = 1..=10;

// =============================================================================
// PHASE / ROLE
// =============================================================================

/// Macro-state of a tasting session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    /// Lobby; participants gather before curation starts.
    #[default]
    Waiting,
    /// The host curates the item list.
    Starting,
    /// Participants rate items.
    InProgress,
    /// Results are available. Terminal.
    Finished,
}

impl Phase {
    /// Wire spelling of the phase.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Waiting => "WAITING",
            Self::Starting => "STARTING",
            Self::InProgress => "IN_PROGRESS",
            Self::Finished => "FINISHED",
        }
    }

    /// Parse a wire spelling. Case and surrounding whitespace are ignored.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "WAITING" => Some(Self::Waiting),
            "STARTING" => Some(Self::Starting),
            "IN_PROGRESS" => Some(Self::InProgress),
            "FINISHED" => Some(Self::Finished),
            _ => None,
        }
    }

    fn rank(self) -> u8 {
        match self {
            Self::Waiting => 0,
            Self::Starting => 1,
            Self::InProgress => 2,
            Self::Finished => 3,
        }
    }

    /// Whether moving from `self` to `next` is a normal transition: any
    /// forward move, or the host's `IN_PROGRESS -> STARTING` revision.
    #[must_use]
    pub fn is_expected_transition(self, next: Self) -> bool {
        next.rank() > self.rank() || (self == Self::InProgress && next == Self::Starting)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Role of the local participant in a session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Curates items and drives phase transitions.
    Host,
    /// Views items and rates them.
    #[default]
    Member,
}

impl Role {
    #[must_use]
    pub fn from_is_host(is_host: bool) -> Self {
        if is_host { Self::Host } else { Self::Member }
    }

    #[must_use]
    pub fn is_host(self) -> bool {
        self == Self::Host
    }
}

// =============================================================================
// PARTICIPANTS
// =============================================================================

/// A participant as listed by the room service.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    /// Account identifier. Numeric ids are normalized to their decimal text.
    #[serde(default, deserialize_with = "deserialize_id_string")]
    pub id: String,
    /// Display name.
    pub username: String,
    /// Set when the service marks this participant as the host.
    #[serde(default)]
    pub is_host: bool,
}

impl Participant {
    /// Participant known only by display name (bare-string presence events).
    #[must_use]
    pub fn named(username: impl Into<String>) -> Self {
        Self { id: String::new(), username: username.into(), is_host: false }
    }

    /// Whether two records describe the same account. Ids win when both
    /// sides carry one; otherwise display names are compared.
    #[must_use]
    pub fn same_account(&self, other: &Self) -> bool {
        if !self.id.is_empty() && !other.id.is_empty() {
            self.id == other.id
        } else {
            self.username == other.username
        }
    }
}

/// Presence payload: a full listing, or a single participant.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Roster {
    Snapshot(Vec<Participant>),
    Single(Participant),
}

// =============================================================================
// ITEMS
// =============================================================================

/// A tasting subject curated into the session.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Item {
    #[serde(deserialize_with = "deserialize_item_id")]
    pub id: ItemId,
    pub name: String,
    /// Brewery name.
    #[serde(rename = "brewery", default, deserialize_with = "deserialize_opt_name")]
    pub producer: Option<String>,
    /// Style name.
    #[serde(rename = "style", default, deserialize_with = "deserialize_opt_name")]
    pub category: Option<String>,
    /// Alcohol by volume, percent.
    #[serde(rename = "percentage", default, deserialize_with = "deserialize_opt_number")]
    pub strength: Option<f64>,
    /// International bitterness units.
    #[serde(rename = "IBU", default, deserialize_with = "deserialize_opt_number")]
    pub bitterness: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_opt_number")]
    pub volume_ml: Option<f64>,
    /// Original extract (degrees Plato).
    #[serde(default, deserialize_with = "deserialize_opt_number")]
    pub extract: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_opt_number")]
    pub hop_rate: Option<f64>,
    /// Image URL.
    #[serde(default)]
    pub image: Option<String>,
    /// Free-text description.
    #[serde(rename = "description", default)]
    pub notes: Option<String>,
    /// Hop identifiers.
    #[serde(default, deserialize_with = "deserialize_hop_ids")]
    pub hops: Vec<i64>,
}

/// Item reference embedded in aggregate results.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemSummary {
    pub name: String,
    #[serde(rename = "brewery", default, deserialize_with = "deserialize_opt_name")]
    pub producer: Option<String>,
    #[serde(rename = "style", default, deserialize_with = "deserialize_opt_name")]
    pub category: Option<String>,
}

// =============================================================================
// RESULTS
// =============================================================================

/// One row of the aggregate results published when the session finishes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ItemResult {
    /// Position of the item in the curated order.
    #[serde(default, deserialize_with = "deserialize_item_id")]
    pub order: i64,
    pub beer: ItemSummary,
    /// Mean score across participants; absent when nobody rated the item.
    #[serde(default, deserialize_with = "deserialize_opt_number")]
    pub average_rating: Option<f64>,
}

/// One of the local participant's submitted ratings.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRating {
    #[serde(default)]
    pub beer: Option<ItemSummary>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub foam: Option<String>,
    #[serde(default)]
    pub smell: Option<String>,
    #[serde(default)]
    pub taste: Option<String>,
    #[serde(default)]
    pub opinion: Option<String>,
    #[serde(rename = "note", default, deserialize_with = "deserialize_score")]
    pub score: Option<u8>,
}

// =============================================================================
// CHAT
// =============================================================================

/// A chat or system log line.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub message: String,
    /// Author display name; empty for system notices.
    #[serde(default)]
    pub user: String,
}

// =============================================================================
// DRAFT
// =============================================================================

/// The rating form a participant composes for one item.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftFields {
    #[serde(default, deserialize_with = "deserialize_text")]
    pub color: String,
    #[serde(default, deserialize_with = "deserialize_text")]
    pub foam: String,
    #[serde(default, deserialize_with = "deserialize_text")]
    pub smell: String,
    #[serde(default, deserialize_with = "deserialize_text")]
    pub taste: String,
    #[serde(default, deserialize_with = "deserialize_text")]
    pub opinion: String,
    /// Overall score in [`SCORE_RANGE`]; `None` until chosen.
    #[serde(rename = "note", default, deserialize_with = "deserialize_score", serialize_with = "serialize_score")]
    pub score: Option<u8>,
}

/// Server copy of the local participant's draft for one item.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DraftSnapshot {
    /// Item the snapshot belongs to, when the service says so.
    pub item_id: Option<ItemId>,
    pub fields: DraftFields,
}

// =============================================================================
// LENIENT DESERIALIZERS
// =============================================================================

/// Parse a score from a number or numeric text. Empty text and out-of-range
/// values yield `None`.
#[must_use]
pub fn score_from_value(value: &serde_json::Value) -> Option<u8> {
    let raw = match value {
        serde_json::Value::Number(n) => n.as_i64()?,
        serde_json::Value::String(s) => {
            let Ok(raw) = s.trim().parse::<i64>() else {
                return None;
            };
            raw
        }
        _ => return None,
    };
    match u8::try_from(raw) {
        Ok(score) if SCORE_RANGE.contains(&score) => Some(score),
        _ => None,
    }
}

fn deserialize_score<'de, D>(deserializer: D) -> Result<Option<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(score_from_value(&value))
}

#[allow(clippy::ref_option, clippy::trivially_copy_pass_by_ref)]
fn serialize_score<S>(score: &Option<u8>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    // The service stores an empty select as "".
    match score {
        Some(score) => serializer.serialize_u8(*score),
        None => serializer.serialize_str(""),
    }
}

fn deserialize_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.unwrap_or_default())
}

fn deserialize_id_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    match value {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        serde_json::Value::Null => Ok(String::new()),
        _ => Err(D::Error::custom("expected string or number id")),
    }
}

fn deserialize_item_id<'de, D>(deserializer: D) -> Result<ItemId, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    match value {
        serde_json::Value::Number(n) => n.as_i64().ok_or_else(|| D::Error::custom("expected integer id")),
        serde_json::Value::String(s) => s
            .trim()
            .parse::<ItemId>()
            .map_err(|_| D::Error::custom(format!("invalid id {s:?}"))),
        _ => Err(D::Error::custom("expected integer id")),
    }
}

fn deserialize_opt_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => match s.trim().parse::<f64>() {
            Ok(n) => Some(n),
            Err(_) => None,
        },
        _ => None,
    })
}

/// Accepts bare ids or embedded `{ "id": .. }` hop objects.
fn deserialize_hop_ids<'de, D>(deserializer: D) -> Result<Vec<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    let Some(rows) = value.as_array() else {
        return Ok(Vec::new());
    };
    Ok(rows
        .iter()
        .filter_map(|row| row.as_i64().or_else(|| row.get("id").and_then(serde_json::Value::as_i64)))
        .collect())
}

/// Accepts `"Name"` or an embedded `{ "id": .., "name": "Name" }` object.
fn deserialize_opt_name<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::String(s) => Some(s),
        serde_json::Value::Object(map) => map.get("name").and_then(serde_json::Value::as_str).map(str::to_owned),
        _ => None,
    })
}
