//! The explicit presence leave operation.

use std::collections::BTreeMap;

use pw_core::config::ClientConfig;
use pw_core::error::{PwError, PwResult};

use crate::endpoint::{channels_csv, Endpoint, OperationKind};
use crate::models::PresenceAck;

/// Announce departure from a channel set.
///
/// Unlike [`super::Heartbeat`] this sends no `heartbeat` parameter; the
/// server drops the client from the named channels immediately.
#[derive(Debug, Clone, Default)]
pub struct Leave {
    pub channels: Vec<String>,
    pub channel_groups: Vec<String>,
}

impl Endpoint for Leave {
    type Output = ();

    fn operation(&self) -> OperationKind {
        OperationKind::Unsubscribe
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
            "/v2/presence/sub-key/{}/channel/{}/leave",
            config.subscribe_key,
            channels_csv(&self.channels)
        )
    }

    fn build_query(&self, _config: &ClientConfig, query: &mut BTreeMap<String, String>) {
        if !self.channel_groups.is_empty() {
            query.insert("channel-group".into(), self.channel_groups.join(","));
        }
    }

    fn parse_response(&self, body: &[u8]) -> PwResult<Self::Output> {
        let ack: PresenceAck = serde_json::from_slice(body)?;
        if ack.status != 200 {
            return Err(PwError::Parsing(format!(
                "leave not acknowledged: {} {}",
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
        ClientConfig::new("sub-key")
    }

    #[test]
    fn test_requires_channel_or_group() {
        assert!(Leave::default().validate().is_err());
    }

    #[test]
    fn test_no_heartbeat_param() {
        let leave = Leave {
            channels: vec!["room1".into()],
            channel_groups: vec!["cg1".into()],
        };
        assert_eq!(
            leave.path(&config()),
            "/v2/presence/sub-key/sub-key/channel/room1/leave"
        );

        let mut query = BTreeMap::new();
        leave.build_query(&config(), &mut query);
        assert!(!query.contains_key("heartbeat"));
        assert_eq!(query.get("channel-group").map(String::as_str), Some("cg1"));
    }

    #[test]
    fn test_parse_ack() {
        let leave = Leave {
            channels: vec!["room1".into()],
            ..Default::default()
        };
        leave
            .parse_response(br#"{"status": 200, "message": "OK"}"#)
            .unwrap();
    }
}
