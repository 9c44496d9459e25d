//! Global error types for the Pulsewire SDK.
//!
//! All error categories across the SDK are unified into a single `PwError`
//! enum with conversions from underlying library errors.

use thiserror::Error;

/// Convenience type alias for Results using PwError.
pub type PwResult<T> = Result<T, PwError>;

/// Unified error type covering all error categories in Pulsewire.
#[derive(Error, Debug)]
pub enum PwError {
    // -- Pre-network errors --
    /// A required request field is missing or blank.
    #[error("validation error: {0}")]
    Validation(String),

    /// Invalid client configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// A required configuration value is missing.
    #[error("missing configuration: {0}")]
    MissingConfig(String),

    // -- Network errors --
    /// Transport-level failure (connect, DNS, broken stream).
    #[error("network error: {0}")]
    Network(String),

    /// Request timed out.
    #[error("request timeout: {0}")]
    Timeout(String),

    /// Server returned a non-2xx response.
    #[error("server error (status {status}): {message}")]
    Server {
        /// HTTP status code.
        status: u16,
        /// Error body from the server.
        message: String,
    },

    /// Server rejected the request credentials (401/403).
    #[error("access denied: {0}")]
    AccessDenied(String),

    // -- Response errors --
    /// Response body could not be decoded.
    #[error("parsing error: {0}")]
    Parsing(String),

    // -- File/IO errors --
    /// File system operation failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    // -- Generic --
    /// Wrapping anyhow errors for interop.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PwError {
    /// Whether the long-poll loop may transparently retry after this error.
    ///
    /// Network and timeout failures are always retryable. Server responses
    /// are retryable only for 5xx and 429. Access-denied and pre-network
    /// errors are terminal. Parsing failures are handled by the loop as a
    /// single failed cycle and classified separately.
    pub fn is_retryable(&self) -> bool {
        match self {
            PwError::Network(_) | PwError::Timeout(_) => true,
            PwError::Server { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

impl From<serde_json::Error> for PwError {
    fn from(e: serde_json::Error) -> Self {
        PwError::Parsing(e.to_string())
    }
}
