//! Pulsewire Core - Foundation types, error handling, configuration, and logging.
//!
//! This crate provides the shared foundation used by all other Pulsewire crates:
//! - Client configuration (keys, identity, presence timing)
//! - Global error types covering all error categories
//! - Structured logging with tracing
//! - Common constants and type aliases

pub mod config;
pub mod constants;
pub mod error;
pub mod logging;

// Re-export commonly used items at the crate root
pub use config::ClientConfig;
pub use error::{PwError, PwResult};
pub use logging::init_logging;
