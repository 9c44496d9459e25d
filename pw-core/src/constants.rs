//! SDK-wide constants.

/// SDK name reported to the server in the `pwsdk` query parameter.
pub const SDK_NAME: &str = "Pulsewire-Rust";

/// SDK version.
pub const SDK_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default service origin.
pub const DEFAULT_ORIGIN: &str = "ps.pulsewire.net";

/// Default timeout for short (non-subscribe) requests, in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Server-side hold time for a long-poll subscribe request, in seconds.
pub const SUBSCRIBE_HOLD_SECS: u64 = 280;

/// Client read timeout for the long-poll subscribe request, in seconds.
/// Must be strictly greater than [`SUBSCRIBE_HOLD_SECS`].
pub const SUBSCRIBE_READ_TIMEOUT_SECS: u64 = 310;

/// Default presence timeout announced to the server, in seconds.
pub const DEFAULT_PRESENCE_TIMEOUT_SECS: u64 = 300;

/// Minimum presence timeout accepted by the service, in seconds.
pub const MINIMUM_PRESENCE_TIMEOUT_SECS: u64 = 20;

/// Maximum age of a telemetry latency entry before it is pruned, in seconds.
pub const TELEMETRY_MAX_AGE_SECS: f64 = 60.0;

/// Interval between telemetry prune sweeps, in seconds.
pub const TELEMETRY_SWEEP_INTERVAL_SECS: u64 = 1;

/// Suffix identifying presence companion channels on the wire.
pub const PRESENCE_CHANNEL_SUFFIX: &str = "-pwpres";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscribe_read_timeout_exceeds_hold() {
        assert!(SUBSCRIBE_READ_TIMEOUT_SECS > SUBSCRIBE_HOLD_SECS);
    }
}
