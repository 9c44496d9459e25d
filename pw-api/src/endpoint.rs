//! The shared request lifecycle every operation implements.
//!
//! Concrete operations describe themselves through the [`Endpoint`] trait
//! (validation, path, query parameters, response parsing) and run through
//! [`execute`], which owns the pipeline shared by every request: validate,
//! merge ambient and telemetry query parameters, fire the HTTP call, record
//! its latency, and parse the body.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use pw_core::config::ClientConfig;
use pw_core::constants;
use pw_core::error::PwResult;

use crate::telemetry::TelemetryStore;
use crate::transport::Transport;

/// Tag identifying an operation across status reporting and telemetry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Subscribe,
    Unsubscribe,
    Heartbeat,
    HereNow,
    WhereNow,
    SetState,
    GetState,
    Publish,
    Signal,
    History,
    MessageCounts,
    DeleteMessages,
    AddChannelGroup,
    RemoveChannelGroup,
    ListChannelGroup,
    DeleteChannelGroup,
    PushAdd,
    PushList,
    PushRemove,
    PushRemoveAll,
    Time,
}

impl OperationKind {
    /// Telemetry bucket key for this operation, or None when the operation
    /// is not tracked.
    pub fn telemetry_key(&self) -> Option<&'static str> {
        match self {
            Self::Subscribe => Some("sub"),
            Self::Unsubscribe
            | Self::Heartbeat
            | Self::HereNow
            | Self::WhereNow
            | Self::SetState
            | Self::GetState => Some("pres"),
            Self::Publish | Self::Signal => Some("pub"),
            Self::History | Self::MessageCounts | Self::DeleteMessages => Some("hist"),
            Self::AddChannelGroup
            | Self::RemoveChannelGroup
            | Self::ListChannelGroup
            | Self::DeleteChannelGroup => Some("cg"),
            Self::PushAdd | Self::PushList | Self::PushRemove | Self::PushRemoveAll => Some("push"),
            Self::Time => None,
        }
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Subscribe => "subscribe",
            Self::Unsubscribe => "unsubscribe",
            Self::Heartbeat => "heartbeat",
            Self::HereNow => "here-now",
            Self::WhereNow => "where-now",
            Self::SetState => "set-state",
            Self::GetState => "get-state",
            Self::Publish => "publish",
            Self::Signal => "signal",
            Self::History => "history",
            Self::MessageCounts => "message-counts",
            Self::DeleteMessages => "delete-messages",
            Self::AddChannelGroup => "add-channel-group",
            Self::RemoveChannelGroup => "remove-channel-group",
            Self::ListChannelGroup => "list-channel-group",
            Self::DeleteChannelGroup => "delete-channel-group",
            Self::PushAdd => "push-add",
            Self::PushList => "push-list",
            Self::PushRemove => "push-remove",
            Self::PushRemoveAll => "push-remove-all",
            Self::Time => "time",
        };
        write!(f, "{name}")
    }
}

/// Contract implemented by every concrete operation.
///
/// Request construction is a pure function of the endpoint's field state
/// plus the ambient configuration; execution lives in [`execute`].
pub trait Endpoint: Send + Sync {
    /// Typed result this operation parses responses into.
    type Output;

    /// Operation tag used for telemetry and status classification.
    fn operation(&self) -> OperationKind;

    /// Check required fields before any network work.
    fn validate(&self) -> PwResult<()> {
        Ok(())
    }

    /// Channels this operation touches, for status reporting only.
    fn affected_channels(&self) -> Vec<String> {
        Vec::new()
    }

    /// Channel groups this operation touches, for status reporting only.
    fn affected_channel_groups(&self) -> Vec<String> {
        Vec::new()
    }

    /// REST path, with the subscribe key and channel list templated in.
    fn path(&self, config: &ClientConfig) -> String;

    /// Append operation-specific query parameters.
    fn build_query(&self, config: &ClientConfig, query: &mut BTreeMap<String, String>);

    /// Parse a raw response body into the typed result.
    fn parse_response(&self, body: &[u8]) -> PwResult<Self::Output>;
}

/// Shared request state: transport, telemetry, and configuration.
#[derive(Clone)]
pub struct RequestContext {
    pub transport: Transport,
    pub telemetry: Arc<TelemetryStore>,
    pub config: ClientConfig,
}

impl RequestContext {
    /// Build a context from configuration, creating the transport and
    /// starting the telemetry sweep.
    pub fn new(config: ClientConfig) -> PwResult<Self> {
        let transport = Transport::new(&config)?;
        Ok(Self {
            transport,
            telemetry: TelemetryStore::new(),
            config,
        })
    }
}

/// Run an endpoint through the shared pipeline.
///
/// Validation and configuration errors surface before any network call.
/// The subscribe operation uses the long-poll read timeout; everything else
/// uses the short default. Latency is recorded only for completed requests.
pub async fn execute<E: Endpoint>(ctx: &RequestContext, endpoint: &E) -> PwResult<E::Output> {
    endpoint.validate()?;
    ctx.config.validate()?;

    let mut query: BTreeMap<String, String> = BTreeMap::new();
    query.insert("uuid".into(), ctx.config.user_id.clone());
    if let Some(auth) = &ctx.config.auth_key {
        query.insert("auth".into(), auth.clone());
    }
    query.insert(
        "pwsdk".into(),
        format!("{}/{}", constants::SDK_NAME, constants::SDK_VERSION),
    );
    for (key, value) in ctx.telemetry.snapshot() {
        query.insert(key, value);
    }
    endpoint.build_query(&ctx.config, &mut query);

    let timeout = match endpoint.operation() {
        OperationKind::Subscribe => ctx.config.subscribe_read_timeout,
        _ => ctx.config.request_timeout,
    };

    let path = endpoint.path(&ctx.config);
    let pairs: Vec<(String, String)> = query.into_iter().collect();

    let started = Instant::now();
    let body = ctx.transport.get(&path, &pairs, timeout).await?;
    ctx.telemetry
        .record_latency(endpoint.operation(), started.elapsed());

    endpoint.parse_response(&body)
}

/// Join channels for a path segment; the wire uses a lone comma for "none".
pub(crate) fn channels_csv(channels: &[String]) -> String {
    if channels.is_empty() {
        ",".to_string()
    } else {
        channels.join(",")
    }
}
