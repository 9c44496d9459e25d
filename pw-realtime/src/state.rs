//! Subscribe loop state: cursor, interest set, and connection lifecycle.

use std::collections::{BTreeSet, HashMap};

use serde_json::Value;

use pw_api::models::WireCursor;
use pw_core::constants;

/// Position in the message stream: "read up to here".
///
/// Starts unset, meaning "from now". Advances only on a successful long-poll
/// response and never moves backward. Owned exclusively by the subscribe
/// loop task; no other component writes it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionCursor {
    pub timetoken: u64,
    /// Opaque routing hint echoed back on the next request.
    pub region: Option<String>,
}

impl SubscriptionCursor {
    /// Whether this cursor still means "from now".
    pub fn is_unset(&self) -> bool {
        self.timetoken == 0
    }

    /// Replace this cursor from response metadata. The timetoken always
    /// advances to the server's value; an absent region keeps the previous
    /// one so it can be resent.
    pub fn advance(&mut self, cursor: &WireCursor) {
        if let Some(timetoken) = cursor.timetoken_value() {
            self.timetoken = timetoken;
        }
        if let Some(region) = cursor.region {
            self.region = Some(region.to_string());
        }
    }
}

/// The channels and channel groups the caller is interested in, plus any
/// per-channel presence state to announce.
///
/// Mutated only by caller-facing subscribe/unsubscribe/set-state operations;
/// read by the subscribe loop and the heartbeat coordinator. Shared behind a
/// single mutex so concurrent reads see atomic updates.
#[derive(Debug, Clone, Default)]
pub struct InterestSet {
    channels: BTreeSet<String>,
    channel_groups: BTreeSet<String>,
    state: HashMap<String, Value>,
}

fn presence_companion(name: &str) -> String {
    format!("{name}{}", constants::PRESENCE_CHANNEL_SUFFIX)
}

fn is_presence_companion(name: &str) -> bool {
    name.ends_with(constants::PRESENCE_CHANNEL_SUFFIX)
}

impl InterestSet {
    /// Register channels; with presence opt-in the `-pwpres` companion of
    /// each channel is registered too.
    pub fn add_channels(&mut self, channels: &[String], with_presence: bool) {
        for channel in channels {
            self.channels.insert(channel.clone());
            if with_presence {
                self.channels.insert(presence_companion(channel));
            }
        }
    }

    /// Register channel groups, with optional presence companions.
    pub fn add_channel_groups(&mut self, groups: &[String], with_presence: bool) {
        for group in groups {
            self.channel_groups.insert(group.clone());
            if with_presence {
                self.channel_groups.insert(presence_companion(group));
            }
        }
    }

    /// Remove channels along with their presence companions and state.
    pub fn remove_channels(&mut self, channels: &[String]) {
        for channel in channels {
            self.channels.remove(channel);
            self.channels.remove(&presence_companion(channel));
            self.state.remove(channel);
        }
    }

    /// Remove channel groups along with their presence companions.
    pub fn remove_channel_groups(&mut self, groups: &[String]) {
        for group in groups {
            self.channel_groups.remove(group);
            self.channel_groups.remove(&presence_companion(group));
        }
    }

    /// Drop everything.
    pub fn clear(&mut self) {
        self.channels.clear();
        self.channel_groups.clear();
        self.state.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty() && self.channel_groups.is_empty()
    }

    /// Everything the long poll should listen on, presence companions
    /// included.
    pub fn subscribe_channels(&self) -> Vec<String> {
        self.channels.iter().cloned().collect()
    }

    pub fn subscribe_channel_groups(&self) -> Vec<String> {
        self.channel_groups.iter().cloned().collect()
    }

    /// Channels to announce presence on: companions excluded, the server
    /// tracks occupancy on the real channel only.
    pub fn presence_channels(&self) -> Vec<String> {
        self.channels
            .iter()
            .filter(|c| !is_presence_companion(c))
            .cloned()
            .collect()
    }

    pub fn presence_channel_groups(&self) -> Vec<String> {
        self.channel_groups
            .iter()
            .filter(|g| !is_presence_companion(g))
            .cloned()
            .collect()
    }

    /// Attach presence state to a channel. Overwrites any previous value.
    pub fn set_state(&mut self, channel: &str, value: Value) {
        self.state.insert(channel.to_string(), value);
    }

    /// The `state` query payload: a JSON object keyed by channel, or None
    /// when no state is pending.
    pub fn state_payload(&self) -> Option<Value> {
        if self.state.is_empty() {
            return None;
        }
        Some(Value::Object(
            self.state
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        ))
    }
}

/// Lifecycle of the long-poll loop. Held only in memory for the loop's
/// lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No interest registered, or the caller has not started listening.
    Idle,
    /// First long-poll request in flight.
    Connecting,
    /// Last request succeeded; cursor advanced.
    Connected,
    /// Last request failed; retrying per policy.
    Reconnecting,
    /// Terminal until the caller re-subscribes.
    Disconnected,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Disconnected => "disconnected",
        };
        write!(f, "{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cursor_starts_unset() {
        let cursor = SubscriptionCursor::default();
        assert!(cursor.is_unset());
        assert_eq!(cursor.region, None);
    }

    #[test]
    fn test_cursor_advance() {
        let mut cursor = SubscriptionCursor::default();
        cursor.advance(&WireCursor {
            timetoken: "100".into(),
            region: Some(1),
        });
        assert_eq!(cursor.timetoken, 100);
        assert_eq!(cursor.region.as_deref(), Some("1"));
    }

    #[test]
    fn test_cursor_preserves_region_when_absent() {
        let mut cursor = SubscriptionCursor {
            timetoken: 100,
            region: Some("1".into()),
        };
        cursor.advance(&WireCursor {
            timetoken: "200".into(),
            region: None,
        });
        assert_eq!(cursor.timetoken, 200);
        assert_eq!(cursor.region.as_deref(), Some("1"));
    }

    #[test]
    fn test_presence_companions_added_and_removed() {
        let mut interest = InterestSet::default();
        interest.add_channels(&["room1".into()], true);
        assert_eq!(
            interest.subscribe_channels(),
            vec!["room1".to_string(), "room1-pwpres".to_string()]
        );
        assert_eq!(interest.presence_channels(), vec!["room1".to_string()]);

        interest.remove_channels(&["room1".into()]);
        assert!(interest.is_empty());
    }

    #[test]
    fn test_state_dropped_with_channel() {
        let mut interest = InterestSet::default();
        interest.add_channels(&["room1".into()], false);
        interest.set_state("room1", serde_json::json!({"mood": "ok"}));
        assert!(interest.state_payload().is_some());

        interest.remove_channels(&["room1".into()]);
        assert!(interest.state_payload().is_none());
    }

    #[test]
    fn test_state_payload_shape() {
        let mut interest = InterestSet::default();
        interest.add_channels(&["room1".into()], false);
        interest.set_state("room1", serde_json::json!({"mood": "ok"}));
        assert_eq!(
            interest.state_payload(),
            Some(serde_json::json!({"room1": {"mood": "ok"}}))
        );
    }

    #[test]
    fn test_groups_tracked_separately() {
        let mut interest = InterestSet::default();
        interest.add_channel_groups(&["cg1".into()], false);
        assert!(!interest.is_empty());
        assert!(interest.subscribe_channels().is_empty());
        assert_eq!(interest.subscribe_channel_groups(), vec!["cg1".to_string()]);

        interest.remove_channel_groups(&["cg1".into()]);
        assert!(interest.is_empty());
    }
}
