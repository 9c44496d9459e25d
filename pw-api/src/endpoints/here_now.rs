//! The here-now presence query.

use std::collections::BTreeMap;

use serde_json::Value;

use pw_core::config::ClientConfig;
use pw_core::error::{PwError, PwResult};

use crate::endpoint::{channels_csv, Endpoint, OperationKind};
use crate::models::{HereNowChannel, HereNowResult, Occupant};

/// Query which clients currently occupy a channel set.
///
/// With no channels and no groups this becomes a keyset-wide (global) query.
/// The wire uses two response shapes: a flat one for a single channel and a
/// `payload`-wrapped one for multi-channel and global queries.
#[derive(Debug, Clone)]
pub struct HereNow {
    pub channels: Vec<String>,
    pub channel_groups: Vec<String>,
    /// Include occupant uuids (`disable_uuids=1` when false).
    pub include_uuids: bool,
    /// Include per-occupant presence state.
    pub include_state: bool,
}

impl Default for HereNow {
    fn default() -> Self {
        Self {
            channels: Vec::new(),
            channel_groups: Vec::new(),
            include_uuids: true,
            include_state: false,
        }
    }
}

impl HereNow {
    fn is_global(&self) -> bool {
        self.channels.is_empty() && self.channel_groups.is_empty()
    }

    fn parse_occupants(&self, uuids: &Value) -> PwResult<Vec<Occupant>> {
        let entries = uuids
            .as_array()
            .ok_or_else(|| PwError::Parsing("uuids is not an array".into()))?;

        let mut occupants = Vec::with_capacity(entries.len());
        for entry in entries {
            // Plain string without state, object when state was requested.
            let occupant = match entry {
                Value::String(uuid) => Occupant {
                    uuid: uuid.clone(),
                    state: None,
                },
                Value::Object(map) => Occupant {
                    uuid: map
                        .get("uuid")
                        .and_then(Value::as_str)
                        .ok_or_else(|| PwError::Parsing("occupant missing uuid".into()))?
                        .to_string(),
                    state: if self.include_state {
                        map.get("state").cloned()
                    } else {
                        None
                    },
                },
                other => {
                    return Err(PwError::Parsing(format!(
                        "unexpected occupant entry: {other}"
                    )))
                }
            };
            occupants.push(occupant);
        }
        Ok(occupants)
    }

    fn parse_single_channel(&self, body: &Value) -> PwResult<HereNowResult> {
        let occupancy = body
            .get("occupancy")
            .and_then(Value::as_u64)
            .ok_or_else(|| PwError::Parsing("occupancy missing".into()))?;

        let mut channel = HereNowChannel {
            occupancy,
            occupants: Vec::new(),
        };
        if self.include_uuids {
            if let Some(uuids) = body.get("uuids") {
                channel.occupants = self.parse_occupants(uuids)?;
            }
        }

        let mut result = HereNowResult {
            total_channels: 1,
            total_occupancy: occupancy,
            channels: Default::default(),
        };
        result.channels.insert(self.channels[0].clone(), channel);
        Ok(result)
    }

    fn parse_multi_channel(&self, payload: &Value) -> PwResult<HereNowResult> {
        let mut result = HereNowResult {
            total_channels: payload
                .get("total_channels")
                .and_then(Value::as_u64)
                .unwrap_or(0),
            total_occupancy: payload
                .get("total_occupancy")
                .and_then(Value::as_u64)
                .unwrap_or(0),
            channels: Default::default(),
        };

        let channels = payload
            .get("channels")
            .and_then(Value::as_object)
            .ok_or_else(|| PwError::Parsing("channels object missing".into()))?;

        for (name, data) in channels {
            let mut channel = HereNowChannel {
                occupancy: data.get("occupancy").and_then(Value::as_u64).unwrap_or(0),
                occupants: Vec::new(),
            };
            if self.include_uuids {
                if let Some(uuids) = data.get("uuids") {
                    channel.occupants = self.parse_occupants(uuids)?;
                }
            }
            result.channels.insert(name.clone(), channel);
        }
        Ok(result)
    }
}

impl Endpoint for HereNow {
    type Output = HereNowResult;

    fn operation(&self) -> OperationKind {
        OperationKind::HereNow
    }

    fn affected_channels(&self) -> Vec<String> {
        self.channels.clone()
    }

    fn affected_channel_groups(&self) -> Vec<String> {
        self.channel_groups.clone()
    }

    fn path(&self, config: &ClientConfig) -> String {
        if self.is_global() {
            format!("/v2/presence/sub-key/{}", config.subscribe_key)
        } else {
            format!(
                "/v2/presence/sub-key/{}/channel/{}",
                config.subscribe_key,
                channels_csv(&self.channels)
            )
        }
    }

    fn build_query(&self, _config: &ClientConfig, query: &mut BTreeMap<String, String>) {
        if self.include_state {
            query.insert("state".into(), "1".into());
        }
        if !self.include_uuids {
            query.insert("disable_uuids".into(), "1".into());
        }
        if !self.channel_groups.is_empty() {
            query.insert("channel-group".into(), self.channel_groups.join(","));
        }
    }

    fn parse_response(&self, body: &[u8]) -> PwResult<Self::Output> {
        let body: Value = serde_json::from_slice(body)?;
        let single = !self.is_global() && self.channels.len() == 1 && self.channel_groups.is_empty();
        if single {
            self.parse_single_channel(&body)
        } else {
            let payload = body
                .get("payload")
                .ok_or_else(|| PwError::Parsing("payload missing".into()))?;
            self.parse_multi_channel(payload)
        }
    }
}
