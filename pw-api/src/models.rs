//! Wire models for the subscribe and presence endpoints.
//!
//! The long-poll subscribe response is a compact envelope:
//! ```json
//! { "t": { "t": "15628897667482444", "r": 4 },
//!   "m": [ { "c": "room1", "d": {...}, "p": { "t": "...", "r": 4 },
//!            "b": "room.*", "i": "client-a", "e": 0 } ] }
//! ```
//! `t` carries the next cursor and is present even when `m` is empty.

use std::collections::HashMap;

use serde::Deserialize;

use pw_core::constants;

/// Cursor metadata attached to a subscribe envelope or a single message.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct WireCursor {
    /// Timetoken as a decimal string.
    #[serde(rename = "t")]
    pub timetoken: String,
    /// Opaque region hint to echo back on the next request.
    #[serde(rename = "r", default)]
    pub region: Option<i64>,
}

impl WireCursor {
    /// Timetoken as an integer; the wire sends it as a decimal string.
    pub fn timetoken_value(&self) -> Option<u64> {
        self.timetoken.parse().ok()
    }
}

/// A single message entry inside a subscribe envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct WireMessage {
    /// Origin channel. Presence events arrive on the `-pwpres` companion.
    #[serde(rename = "c")]
    pub channel: String,
    /// Message payload.
    #[serde(rename = "d", default)]
    pub payload: serde_json::Value,
    /// Subscription match (wildcard or channel-group name), when different
    /// from the origin channel.
    #[serde(rename = "b", default)]
    pub subscription_match: Option<String>,
    /// Publishing client's uuid.
    #[serde(rename = "i", default)]
    pub issuer: Option<String>,
    /// Publish-time cursor for this message.
    #[serde(rename = "p", default)]
    pub publish_cursor: Option<WireCursor>,
    /// Message kind flag: absent/0 message, 1 signal, 2 object.
    #[serde(rename = "e", default)]
    pub kind: Option<i64>,
}

impl WireMessage {
    /// Whether this entry is a presence event (delivered on the presence
    /// companion channel).
    pub fn is_presence(&self) -> bool {
        self.channel.ends_with(constants::PRESENCE_CHANNEL_SUFFIX)
    }
}

/// Decoded long-poll subscribe response.
#[derive(Debug, Clone, Deserialize)]
pub struct SubscribeEnvelope {
    /// Next cursor; unconditionally replaces the stored one.
    #[serde(rename = "t")]
    pub cursor: WireCursor,
    /// Messages delivered this cycle. May be empty.
    #[serde(rename = "m", default)]
    pub messages: Vec<WireMessage>,
}

/// Acknowledgment body returned by presence announce endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct PresenceAck {
    pub status: u16,
    #[serde(default)]
    pub message: String,
}

/// One occupant of a channel, from a here-now response.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Occupant {
    pub uuid: String,
    /// Presence state, when requested and set.
    #[serde(default)]
    pub state: Option<serde_json::Value>,
}

/// Per-channel occupancy data.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HereNowChannel {
    pub occupancy: u64,
    pub occupants: Vec<Occupant>,
}

/// Typed result of a here-now query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HereNowResult {
    pub total_channels: u64,
    pub total_occupancy: u64,
    pub channels: HashMap<String, HereNowChannel>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_with_messages() {
        let body = r#"{
            "t": {"t": "15628897667482444", "r": 4},
            "m": [{
                "c": "room1",
                "d": {"text": "hi"},
                "i": "client-a",
                "p": {"t": "15628897667482440", "r": 4}
            }]
        }"#;
        let envelope: SubscribeEnvelope = serde_json::from_str(body).unwrap();
        assert_eq!(envelope.cursor.timetoken_value(), Some(15628897667482444));
        assert_eq!(envelope.cursor.region, Some(4));
        assert_eq!(envelope.messages.len(), 1);
        assert_eq!(envelope.messages[0].channel, "room1");
        assert!(!envelope.messages[0].is_presence());
    }

    #[test]
    fn test_empty_envelope_still_carries_cursor() {
        let body = r#"{"t": {"t": "100", "r": 1}, "m": []}"#;
        let envelope: SubscribeEnvelope = serde_json::from_str(body).unwrap();
        assert!(envelope.messages.is_empty());
        assert_eq!(envelope.cursor.timetoken_value(), Some(100));
    }

    #[test]
    fn test_presence_companion_detection() {
        let body = r#"{"t": {"t": "1"}, "m": [{"c": "room1-pwpres", "d": {"action": "join"}}]}"#;
        let envelope: SubscribeEnvelope = serde_json::from_str(body).unwrap();
        assert!(envelope.messages[0].is_presence());
        assert_eq!(envelope.cursor.region, None);
    }

    #[test]
    fn test_non_numeric_timetoken() {
        let cursor = WireCursor {
            timetoken: "not-a-number".into(),
            region: None,
        };
        assert_eq!(cursor.timetoken_value(), None);
    }
}
