//! Listener events and the broadcast-based dispatcher.
//!
//! Decoded long-poll entries and loop status changes are fanned out through
//! a tokio broadcast channel so multiple consumers can independently receive
//! events without blocking each other. Delivery order per receiver follows
//! emit order; each consumer chooses its own task to receive on.

use serde::Deserialize;
use tokio::sync::broadcast;
use tracing::debug;

use pw_api::endpoint::OperationKind;
use pw_api::models::WireMessage;
use pw_core::constants;

/// Classification carried by status events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCategory {
    /// First successful long-poll cycle after subscribing.
    Connected,
    /// Successful cycle after one or more failed ones.
    Reconnected,
    /// Loop stopped; terminal until the caller re-subscribes.
    Disconnected,
    /// Loop stopped by an unretryable failure.
    UnexpectedDisconnect,
    /// Transport-level failure; the loop is retrying.
    NetworkIssues,
    /// Request timed out; the loop is retrying.
    TimedOut,
    /// Server rejected the credentials.
    AccessDenied,
    /// Response body could not be decoded; the loop is retrying.
    MalformedResponse,
    /// A one-shot operation completed.
    Acknowledgment,
}

impl std::fmt::Display for StatusCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Connected => "connected",
            Self::Reconnected => "reconnected",
            Self::Disconnected => "disconnected",
            Self::UnexpectedDisconnect => "unexpected-disconnect",
            Self::NetworkIssues => "network-issues",
            Self::TimedOut => "timed-out",
            Self::AccessDenied => "access-denied",
            Self::MalformedResponse => "malformed-response",
            Self::Acknowledgment => "acknowledgment",
        };
        write!(f, "{name}")
    }
}

/// Lifecycle notification for listeners.
#[derive(Debug, Clone)]
pub struct StatusEvent {
    pub operation: OperationKind,
    pub category: StatusCategory,
    /// Whether this status reports a failure.
    pub error: bool,
    pub affected_channels: Vec<String>,
    pub affected_channel_groups: Vec<String>,
}

/// A message, signal, or object event delivered on a channel.
#[derive(Debug, Clone)]
pub struct MessageEvent {
    /// Origin channel.
    pub channel: String,
    /// Wildcard or channel-group match, when different from the channel.
    pub subscription: Option<String>,
    /// Publish timetoken.
    pub timetoken: u64,
    pub payload: serde_json::Value,
    /// Publishing client's uuid.
    pub publisher: Option<String>,
}

/// A presence event (join/leave/timeout/state-change/interval) on a channel.
#[derive(Debug, Clone)]
pub struct PresenceEvent {
    /// The channel the event concerns (presence suffix stripped).
    pub channel: String,
    pub action: Option<String>,
    /// The client the event concerns; absent for interval events.
    pub uuid: Option<String>,
    pub occupancy: Option<u64>,
    pub timetoken: u64,
    /// Presence state attached to a state-change.
    pub state: Option<serde_json::Value>,
}

/// Payload shape of presence events on the wire.
#[derive(Debug, Deserialize)]
struct PresencePayload {
    #[serde(default)]
    action: Option<String>,
    #[serde(default)]
    uuid: Option<String>,
    #[serde(default)]
    occupancy: Option<u64>,
    #[serde(default)]
    data: Option<serde_json::Value>,
}

/// Everything the client fans out to listeners.
#[derive(Debug, Clone)]
pub enum RealtimeEvent {
    Status(StatusEvent),
    Message(MessageEvent),
    Signal(MessageEvent),
    Object(MessageEvent),
    Presence(PresenceEvent),
}

/// Decode one envelope entry into a listener event, tagged with its origin
/// channel and publish timetoken.
pub fn decode_wire_message(message: &WireMessage) -> RealtimeEvent {
    let timetoken = message
        .publish_cursor
        .as_ref()
        .and_then(|c| c.timetoken_value())
        .unwrap_or(0);

    if message.is_presence() {
        let channel = strip_presence_suffix(&message.channel);
        let payload: PresencePayload =
            serde_json::from_value(message.payload.clone()).unwrap_or(PresencePayload {
                action: None,
                uuid: None,
                occupancy: None,
                data: None,
            });
        return RealtimeEvent::Presence(PresenceEvent {
            channel,
            action: payload.action,
            uuid: payload.uuid,
            occupancy: payload.occupancy,
            timetoken,
            state: payload.data,
        });
    }

    let event = MessageEvent {
        channel: message.channel.clone(),
        subscription: message.subscription_match.clone(),
        timetoken,
        payload: message.payload.clone(),
        publisher: message.issuer.clone(),
    };

    match message.kind {
        Some(1) => RealtimeEvent::Signal(event),
        Some(2) => RealtimeEvent::Object(event),
        _ => RealtimeEvent::Message(event),
    }
}

fn strip_presence_suffix(channel: &str) -> String {
    channel
        .strip_suffix(constants::PRESENCE_CHANNEL_SUFFIX)
        .unwrap_or(channel)
        .to_string()
}

/// Broadcast-based event dispatcher for decoupled listener handling.
#[derive(Clone)]
pub struct EventDispatcher {
    sender: broadcast::Sender<RealtimeEvent>,
}

impl EventDispatcher {
    /// Create a new EventDispatcher with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to receive events.
    ///
    /// Returns a broadcast receiver. Slow consumers that fall behind
    /// will receive a RecvError::Lagged and may miss events.
    pub fn subscribe(&self) -> broadcast::Receiver<RealtimeEvent> {
        self.sender.subscribe()
    }

    /// Dispatch an event to all active subscribers.
    pub fn emit(&self, event: RealtimeEvent) {
        match self.sender.send(event) {
            Ok(count) => debug!("event dispatched to {count} subscriber(s)"),
            // No active receivers during startup/shutdown is fine
            Err(_) => debug!("no subscribers for event"),
        }
    }

    /// Get the current number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pw_api::models::WireCursor;

    fn wire(channel: &str, payload: serde_json::Value, kind: Option<i64>) -> WireMessage {
        WireMessage {
            channel: channel.into(),
            payload,
            subscription_match: None,
            issuer: Some("client-a".into()),
            publish_cursor: Some(WireCursor {
                timetoken: "15628897667482444".into(),
                region: Some(4),
            }),
            kind,
        }
    }

    #[test]
    fn test_decode_message() {
        let event = decode_wire_message(&wire("room1", serde_json::json!({"text": "hi"}), None));
        match event {
            RealtimeEvent::Message(m) => {
                assert_eq!(m.channel, "room1");
                assert_eq!(m.timetoken, 15628897667482444);
                assert_eq!(m.publisher.as_deref(), Some("client-a"));
            }
            other => panic!("expected message, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_signal_and_object() {
        assert!(matches!(
            decode_wire_message(&wire("room1", serde_json::json!("ping"), Some(1))),
            RealtimeEvent::Signal(_)
        ));
        assert!(matches!(
            decode_wire_message(&wire("room1", serde_json::json!({}), Some(2))),
            RealtimeEvent::Object(_)
        ));
        assert!(matches!(
            decode_wire_message(&wire("room1", serde_json::json!({}), Some(0))),
            RealtimeEvent::Message(_)
        ));
    }

    #[test]
    fn test_decode_presence_event() {
        let payload = serde_json::json!({
            "action": "join",
            "uuid": "client-b",
            "occupancy": 2,
            "timestamp": 1562889766
        });
        let event = decode_wire_message(&wire("room1-pwpres", payload, None));
        match event {
            RealtimeEvent::Presence(p) => {
                assert_eq!(p.channel, "room1");
                assert_eq!(p.action.as_deref(), Some("join"));
                assert_eq!(p.uuid.as_deref(), Some("client-b"));
                assert_eq!(p.occupancy, Some(2));
            }
            other => panic!("expected presence, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_state_change_carries_state() {
        let payload = serde_json::json!({
            "action": "state-change",
            "uuid": "client-b",
            "data": {"mood": "happy"}
        });
        let event = decode_wire_message(&wire("room1-pwpres", payload, None));
        match event {
            RealtimeEvent::Presence(p) => {
                assert_eq!(p.state, Some(serde_json::json!({"mood": "happy"})));
            }
            other => panic!("expected presence, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_presence_with_unexpected_payload() {
        // A payload that is not an object still decodes, with empty fields.
        let event = decode_wire_message(&wire("room1-pwpres", serde_json::json!("???"), None));
        match event {
            RealtimeEvent::Presence(p) => {
                assert_eq!(p.channel, "room1");
                assert!(p.action.is_none());
            }
            other => panic!("expected presence, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_dispatcher_fan_out() {
        let dispatcher = EventDispatcher::new(16);
        let mut rx1 = dispatcher.subscribe();
        let mut rx2 = dispatcher.subscribe();
        assert_eq!(dispatcher.subscriber_count(), 2);

        dispatcher.emit(RealtimeEvent::Status(StatusEvent {
            operation: OperationKind::Subscribe,
            category: StatusCategory::Connected,
            error: false,
            affected_channels: vec!["room1".into()],
            affected_channel_groups: Vec::new(),
        }));

        for rx in [&mut rx1, &mut rx2] {
            match rx.recv().await.unwrap() {
                RealtimeEvent::Status(s) => {
                    assert_eq!(s.category, StatusCategory::Connected);
                    assert!(!s.error);
                }
                other => panic!("expected status, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_emit_without_subscribers_is_fine() {
        let dispatcher = EventDispatcher::new(4);
        dispatcher.emit(RealtimeEvent::Message(MessageEvent {
            channel: "room1".into(),
            subscription: None,
            timetoken: 1,
            payload: serde_json::json!({}),
            publisher: None,
        }));
    }

    #[test]
    fn test_category_display() {
        assert_eq!(StatusCategory::Connected.to_string(), "connected");
        assert_eq!(
            StatusCategory::MalformedResponse.to_string(),
            "malformed-response"
        );
    }
}
