//! The long-poll subscribe operation.

use std::collections::BTreeMap;

use pw_core::config::ClientConfig;
use pw_core::error::{PwError, PwResult};

use crate::endpoint::{channels_csv, Endpoint, OperationKind};
use crate::models::SubscribeEnvelope;

/// One long-poll subscribe request.
///
/// Built fresh by the subscribe loop every cycle from the current interest
/// set and cursor. The `heartbeat` parameter always announces this client's
/// presence timeout to the server.
#[derive(Debug, Clone, Default)]
pub struct Subscribe {
    pub channels: Vec<String>,
    pub channel_groups: Vec<String>,
    /// Cursor position; None means "from now".
    pub timetoken: Option<u64>,
    /// Region echoed from the previous response.
    pub region: Option<String>,
    /// Per-channel presence state, JSON-encoded into the `state` parameter.
    pub state: Option<serde_json::Value>,
    /// Overrides the configured default filter expression when set.
    pub filter_expression: Option<String>,
}

impl Endpoint for Subscribe {
    type Output = SubscribeEnvelope;

    fn operation(&self) -> OperationKind {
        OperationKind::Subscribe
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
            "/v2/subscribe/{}/{}/0",
            config.subscribe_key,
            channels_csv(&self.channels)
        )
    }

    fn build_query(&self, config: &ClientConfig, query: &mut BTreeMap<String, String>) {
        if !self.channel_groups.is_empty() {
            query.insert("channel-group".into(), self.channel_groups.join(","));
        }

        let filter = self
            .filter_expression
            .as_deref()
            .or(config.filter_expression.as_deref());
        if let Some(expr) = filter {
            if !expr.trim().is_empty() {
                query.insert("filter-expr".into(), expr.to_string());
            }
        }

        if let Some(tt) = self.timetoken {
            query.insert("tt".into(), tt.to_string());
        }
        if let Some(region) = &self.region {
            query.insert("tr".into(), region.clone());
        }

        query.insert("heartbeat".into(), config.presence_timeout_secs.to_string());

        if let Some(state) = &self.state {
            query.insert("state".into(), state.to_string());
        }
    }

    fn parse_response(&self, body: &[u8]) -> PwResult<Self::Output> {
        let envelope: SubscribeEnvelope = serde_json::from_slice(body)?;
        if envelope.cursor.timetoken_value().is_none() {
            return Err(PwError::Parsing(format!(
                "non-numeric timetoken {:?}",
                envelope.cursor.timetoken
            )));
        }
        Ok(envelope)
    }
}
