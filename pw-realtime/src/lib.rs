//! Pulsewire Realtime - the long-poll subscribe loop and presence coordination.
//!
//! This crate maintains a long-poll connection keyed by the current channel
//! set and a monotonically advancing time cursor, dispatches decoded message
//! and presence events to listeners, announces presence on an independent
//! heartbeat timer, and recovers from failed cycles through a pluggable
//! reconnection policy.

pub mod client;
pub mod events;
pub mod heartbeat;
pub mod retry;
pub mod state;
pub mod transport;

// Re-export key types
pub use client::RealtimeClient;
pub use events::{EventDispatcher, MessageEvent, PresenceEvent, RealtimeEvent, StatusCategory, StatusEvent};
pub use retry::{ReconnectPolicy, RetryDecision};
pub use state::{ConnectionState, InterestSet, SubscriptionCursor};
pub use transport::{HttpTransport, RealtimeTransport};
