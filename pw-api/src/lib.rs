//! Pulsewire API - request pipeline for the Pulsewire REST API.
//!
//! This crate provides the shared request lifecycle every operation goes
//! through (validate, build, execute, parse), the HTTP transport it runs on,
//! the rolling latency telemetry attached to every outbound request, and the
//! wire models and concrete endpoints needed by the realtime subsystem:
//! subscribe, heartbeat, leave, and here-now.

pub mod endpoint;
pub mod endpoints;
pub mod models;
pub mod telemetry;
pub mod transport;

// Re-export key types
pub use endpoint::{execute, Endpoint, OperationKind, RequestContext};
pub use telemetry::TelemetryStore;
pub use transport::Transport;
