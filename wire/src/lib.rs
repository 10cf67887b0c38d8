//! Shared message envelope and JSON codec for the tasting-room socket.
//!
//! Every message in either direction is a flat JSON object carrying a
//! command tag, a tag-dependent payload, and a timestamp. This crate only
//! owns the envelope; interpreting `data` for a given tag is the caller's
//! job, so payloads stay flexible (`serde_json::Value`).

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// Error returned by [`decode_envelope`].
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    /// The text is not a JSON object with the envelope shape.
    #[error("failed to decode envelope: {0}")]
    Json(#[from] serde_json::Error),
    /// The envelope parsed but its `command` tag is blank.
    #[error("envelope has an empty command tag")]
    EmptyCommand,
}

/// A single message on the session socket.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Command (outbound) or event (inbound) tag, e.g. `"get_users"`.
    pub command: String,
    /// Tag-dependent payload. Absent payloads decode as `null`.
    #[serde(default)]
    pub data: Value,
    /// RFC 3339 creation time. Absent timestamps decode as an empty string.
    #[serde(default, deserialize_with = "string_or_number")]
    pub timestamp: String,
}

impl Envelope {
    /// Build an envelope stamped with the current time.
    pub fn new(command: impl Into<String>, data: Value) -> Self {
        Self { command: command.into(), data, timestamp: now_timestamp() }
    }

    /// Replace the timestamp, mostly useful for deterministic tests.
    #[must_use]
    pub fn with_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = timestamp.into();
        self
    }
}

/// Encode an envelope as JSON text.
#[must_use]
pub fn encode_envelope(envelope: &Envelope) -> String {
    // Serializing a struct of strings and a `Value` cannot fail; the only
    // serde_json error here would be a non-string map key, which `Value`
    // never produces.
    serde_json::to_string(envelope).unwrap_or_default()
}

/// Decode JSON text into an envelope.
///
/// # Errors
///
/// Returns [`WireError::Json`] for text that is not an envelope object and
/// [`WireError::EmptyCommand`] when the tag is blank.
pub fn decode_envelope(text: &str) -> Result<Envelope, WireError> {
    let envelope: Envelope = serde_json::from_str(text)?;
    if envelope.command.trim().is_empty() {
        return Err(WireError::EmptyCommand);
    }
    Ok(envelope)
}

/// Current UTC time formatted as RFC 3339.
#[must_use]
pub fn now_timestamp() -> String {
    OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default()
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    })
}

#[cfg(test)]
#[path = "lib_test.rs"]
mod tests;
