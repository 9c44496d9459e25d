//! HTTP transport for the Pulsewire REST API.
//!
//! Wraps reqwest::Client with Pulsewire-specific URL construction, per-request
//! timeouts (the long-poll subscribe call needs a much longer read timeout
//! than everything else), status handling, and error classification.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use tracing::debug;

use pw_core::config::ClientConfig;
use pw_core::error::{PwError, PwResult};

/// HTTP transport for communicating with the Pulsewire service.
#[derive(Clone)]
pub struct Transport {
    inner: Client,
    /// Base URL for the API (e.g. "https://ps.pulsewire.net").
    base_url: String,
}

impl Transport {
    /// Create a new Transport from client configuration.
    ///
    /// The underlying client carries no default timeout; every request sets
    /// its own, so the long-poll subscribe call can outlive the short
    /// default without a second connection pool.
    pub fn new(config: &ClientConfig) -> PwResult<Self> {
        let inner = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(30))
            .build()
            .map_err(|e| PwError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            inner,
            base_url: config.base_url(),
        })
    }

    /// Get the base URL requests are issued against.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Execute a GET request and return the raw response body.
    ///
    /// Query pairs are appended in the order given. Non-2xx statuses are
    /// converted to errors; 401/403 become `AccessDenied`.
    pub async fn get(
        &self,
        path: &str,
        query: &[(String, String)],
        timeout: Duration,
    ) -> PwResult<Vec<u8>> {
        let url = format!("{}{}", self.base_url, path);
        debug!("GET {}", path);

        let response = self
            .inner
            .get(&url)
            .query(query)
            .timeout(timeout)
            .send()
            .await
            .map_err(classify_error)?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(PwError::AccessDenied(format!("server returned {status}")));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PwError::Server {
                status: status.as_u16(),
                message: body,
            });
        }

        response
            .bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(classify_error)
    }
}

/// Classify a reqwest error into a PwError variant.
fn classify_error(e: reqwest::Error) -> PwError {
    if e.is_timeout() {
        PwError::Timeout(e.to_string())
    } else if e.is_connect() {
        PwError::Network(format!("connection failed: {e}"))
    } else {
        PwError::Network(e.to_string())
    }
}
