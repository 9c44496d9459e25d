//! Client configuration.
//!
//! Holds the keyset, client identity, presence timing, and request timeouts
//! consumed by the transport and the realtime subsystem. Configuration is
//! read-only once the client is constructed.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants;
use crate::error::{PwError, PwResult};

/// Configuration for a Pulsewire client instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Subscribe key for the keyset. Required.
    pub subscribe_key: String,

    /// Publish key for the keyset. Required only for publish operations.
    #[serde(default)]
    pub publish_key: String,

    /// Optional access-control auth key appended to every request.
    #[serde(default)]
    pub auth_key: Option<String>,

    /// Unique identifier for this client, reported on every request.
    pub user_id: String,

    /// Service origin (host, no scheme).
    #[serde(default = "default_origin")]
    pub origin: String,

    /// Whether to use HTTPS.
    #[serde(default = "default_true")]
    pub secure: bool,

    /// Default filter expression applied to subscribe requests.
    #[serde(default)]
    pub filter_expression: Option<String>,

    /// Presence timeout announced to the server, in seconds. The server
    /// marks this client absent if no heartbeat or subscribe call arrives
    /// within this window.
    #[serde(default = "default_presence_timeout")]
    pub presence_timeout_secs: u64,

    /// Interval between heartbeat announcements, in seconds. Zero disables
    /// the heartbeat task entirely. Must stay strictly below half of
    /// `presence_timeout_secs` so presence cannot expire between beats.
    #[serde(default)]
    pub heartbeat_interval_secs: u64,

    /// Timeout for short (non-subscribe) requests.
    #[serde(default = "default_request_timeout")]
    pub request_timeout: Duration,

    /// Read timeout for the long-poll subscribe request. Strictly greater
    /// than the server-side hold time.
    #[serde(default = "default_subscribe_timeout")]
    pub subscribe_read_timeout: Duration,
}

fn default_origin() -> String {
    constants::DEFAULT_ORIGIN.to_string()
}

fn default_true() -> bool {
    true
}

fn default_presence_timeout() -> u64 {
    constants::DEFAULT_PRESENCE_TIMEOUT_SECS
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(constants::DEFAULT_REQUEST_TIMEOUT_SECS)
}

fn default_subscribe_timeout() -> Duration {
    Duration::from_secs(constants::SUBSCRIBE_READ_TIMEOUT_SECS)
}

impl ClientConfig {
    /// Create a configuration for the given subscribe key with a generated
    /// client identity and default timing.
    pub fn new(subscribe_key: impl Into<String>) -> Self {
        Self {
            subscribe_key: subscribe_key.into(),
            publish_key: String::new(),
            auth_key: None,
            user_id: format!("pw-{}", Uuid::new_v4()),
            origin: default_origin(),
            secure: true,
            filter_expression: None,
            presence_timeout_secs: default_presence_timeout(),
            heartbeat_interval_secs: 0,
            request_timeout: default_request_timeout(),
            subscribe_read_timeout: default_subscribe_timeout(),
        }
    }

    /// Set the publish key.
    pub fn with_publish_key(mut self, key: impl Into<String>) -> Self {
        self.publish_key = key.into();
        self
    }

    /// Set the auth key.
    pub fn with_auth_key(mut self, key: impl Into<String>) -> Self {
        self.auth_key = Some(key.into());
        self
    }

    /// Set the client identity.
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = user_id.into();
        self
    }

    /// Set a default filter expression for subscribe requests.
    pub fn with_filter_expression(mut self, expr: impl Into<String>) -> Self {
        self.filter_expression = Some(expr.into());
        self
    }

    /// Set the presence timeout and derive a matching heartbeat interval
    /// of `timeout / 2 - 1` seconds, keeping the interval strictly below
    /// half the timeout.
    pub fn with_presence_timeout(mut self, timeout_secs: u64) -> Self {
        let timeout_secs = timeout_secs.max(constants::MINIMUM_PRESENCE_TIMEOUT_SECS);
        self.presence_timeout_secs = timeout_secs;
        self.heartbeat_interval_secs = timeout_secs / 2 - 1;
        self
    }

    /// Set the heartbeat interval directly. Zero disables heartbeats.
    pub fn with_heartbeat_interval(mut self, interval_secs: u64) -> Self {
        self.heartbeat_interval_secs = interval_secs;
        self
    }

    /// Base URL for requests, derived from origin and the TLS flag.
    pub fn base_url(&self) -> String {
        let scheme = if self.secure { "https" } else { "http" };
        format!("{scheme}://{}", self.origin)
    }

    /// Validate that required fields are present and timing is coherent.
    pub fn validate(&self) -> PwResult<()> {
        if self.subscribe_key.trim().is_empty() {
            return Err(PwError::MissingConfig("subscribe key".into()));
        }
        if self.user_id.trim().is_empty() {
            return Err(PwError::MissingConfig("user id".into()));
        }
        if self.heartbeat_interval_secs != 0
            && self.heartbeat_interval_secs * 2 >= self.presence_timeout_secs
        {
            return Err(PwError::Config(format!(
                "heartbeat interval {}s must be below half the presence timeout {}s",
                self.heartbeat_interval_secs, self.presence_timeout_secs
            )));
        }
        if self.subscribe_read_timeout.as_secs() <= constants::SUBSCRIBE_HOLD_SECS {
            return Err(PwError::Config(format!(
                "subscribe read timeout must exceed the {}s server hold",
                constants::SUBSCRIBE_HOLD_SECS
            )));
        }
        Ok(())
    }
}
