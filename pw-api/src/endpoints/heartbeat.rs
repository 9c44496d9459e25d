//! The presence heartbeat announce operation.

use std::collections::BTreeMap;

use pw_core::config::ClientConfig;
use pw_core::error::{PwError, PwResult};

use crate::endpoint::{channels_csv, Endpoint, OperationKind};
use crate::models::PresenceAck;

/// Announce this client's presence on a channel set.
///
/// The `heartbeat` parameter carries the presence timeout; the server must
/// see another announce (or a subscribe cycle) within that window or it
/// expires the client.
#[derive(Debug, Clone, Default)]
pub struct Heartbeat {
    pub channels: Vec<String>,
    pub channel_groups: Vec<String>,
    /// Per-channel presence state, JSON-encoded into the `state` parameter.
    pub state: Option<serde_json::Value>,
}

impl Endpoint for Heartbeat {
    type Output = ();

    fn operation(&self) -> OperationKind {
        OperationKind::Heartbeat
    }

    fn validate(&self) -> PwResult<()> {
        if self.channels.is_empty() && self.channel_groups.is_empty() {
            return Err(PwError::Validation(
                "channel or channel group missing".into(),
            ));
        }
        Ok(())
    }

    fn affected_channels(&self) -> Vec<String> {
        self.channels.clone()
    }

    fn affected_channel_groups(&self) -> Vec<String> {
        self.channel_groups.clone()
    }

    fn path(&self, config: &ClientConfig) -> String {
        format!(
            "/v2/presence/sub-key/{}/channel/{}/heartbeat",
            config.subscribe_key,
            channels_csv(&self.channels)
        )
    }

    fn build_query(&self, config: &ClientConfig, query: &mut BTreeMap<String, String>) {
        if !self.channel_groups.is_empty() {
            query.insert("channel-group".into(), self.channel_groups.join(","));
        }
        query.insert("heartbeat".into(), config.presence_timeout_secs.to_string());
        if let Some(state) = &self.state {
            query.insert("state".into(), state.to_string());
        }
    }

    fn parse_response(&self, body: &[u8]) -> PwResult<Self::Output> {
        let ack: PresenceAck = serde_json::from_slice(body)?;
        if ack.status != 200 {
            return Err(PwError::Parsing(format!(
                "heartbeat not acknowledged: {} {}",
                ack.status, ack.message
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ClientConfig {
        ClientConfig::new("sub-key").with_presence_timeout(120)
    }

    #[test]
    fn test_requires_channel_or_group() {
        assert!(Heartbeat::default().validate().is_err());
        let hb = Heartbeat {
            channels: vec!["room1".into()],
            ..Default::default()
        };
        hb.validate().unwrap();
    }

    #[test]
    fn test_path_and_heartbeat_param() {
        let hb = Heartbeat {
            channels: vec!["room1".into()],
            ..Default::default()
        };
        assert_eq!(
            hb.path(&config()),
            "/v2/presence/sub-key/sub-key/channel/room1/heartbeat"
        );

        let mut query = BTreeMap::new();
        hb.build_query(&config(), &mut query);
        assert_eq!(query.get("heartbeat").map(String::as_str), Some("120"));
    }

    #[test]
    fn test_group_only_uses_comma_path() {
        let hb = Heartbeat {
            channel_groups: vec!["cg1".into(), "cg2".into()],
            ..Default::default()
        };
        assert_eq!(
            hb.path(&config()),
            "/v2/presence/sub-key/sub-key/channel/,/heartbeat"
        );
        let mut query = BTreeMap::new();
        hb.build_query(&config(), &mut query);
        assert_eq!(
            query.get("channel-group").map(String::as_str),
            Some("cg1,cg2")
        );
    }

    #[test]
    fn test_parse_ack() {
        let hb = Heartbeat {
            channels: vec!["room1".into()],
            ..Default::default()
        };
        hb.parse_response(br#"{"status": 200, "message": "OK", "service": "Presence"}"#)
            .unwrap();
        assert!(hb
            .parse_response(br#"{"status": 400, "message": "Invalid"}"#)
            .is_err());
    }
}
