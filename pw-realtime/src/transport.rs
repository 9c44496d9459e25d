//! The seam between the realtime subsystem and the request pipeline.
//!
//! The loop and the heartbeat coordinator talk to the service through
//! [`RealtimeTransport`] rather than the HTTP stack directly, so tests can
//! script responses. The production implementation routes every call through
//! the shared endpoint pipeline in `pw-api`, which attaches telemetry and
//! records latencies.

use async_trait::async_trait;

use pw_api::endpoint::{execute, RequestContext};
use pw_api::endpoints::{Heartbeat, HereNow, Leave, Subscribe};
use pw_api::models::{HereNowResult, SubscribeEnvelope};
use pw_core::config::ClientConfig;
use pw_core::error::PwResult;

/// Network operations the realtime subsystem performs.
#[async_trait]
pub trait RealtimeTransport: Send + Sync + 'static {
    /// Issue one long-poll subscribe request.
    async fn subscribe(&self, request: Subscribe) -> PwResult<SubscribeEnvelope>;

    /// Announce presence on the given channel set.
    async fn heartbeat(&self, request: Heartbeat) -> PwResult<()>;

    /// Announce departure from the given channel set.
    async fn leave(&self, request: Leave) -> PwResult<()>;

    /// Query current channel occupancy.
    async fn here_now(&self, request: HereNow) -> PwResult<HereNowResult>;
}

/// Production transport: the shared endpoint pipeline over HTTP.
pub struct HttpTransport {
    ctx: RequestContext,
}

impl HttpTransport {
    pub fn new(config: ClientConfig) -> PwResult<Self> {
        Ok(Self {
            ctx: RequestContext::new(config)?,
        })
    }

    /// The underlying request context (transport, telemetry, config).
    pub fn context(&self) -> &RequestContext {
        &self.ctx
    }
}

#[async_trait]
impl RealtimeTransport for HttpTransport {
    async fn subscribe(&self, request: Subscribe) -> PwResult<SubscribeEnvelope> {
        execute(&self.ctx, &request).await
    }

    async fn heartbeat(&self, request: Heartbeat) -> PwResult<()> {
        execute(&self.ctx, &request).await
    }

    async fn leave(&self, request: Leave) -> PwResult<()> {
        execute(&self.ctx, &request).await
    }

    async fn here_now(&self, request: HereNow) -> PwResult<HereNowResult> {
        execute(&self.ctx, &request).await
    }
}
