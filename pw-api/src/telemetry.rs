//! Rolling latency telemetry.
//!
//! Keeps a thread-safe window of recent per-operation request latencies and
//! exposes them as formatted averages. The request executor merges the
//! snapshot into every outbound request's query parameters so the service can
//! observe client-side performance. Entries older than 60 seconds are pruned
//! by a background sweep so the snapshot reflects recent behaviour only.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::task::JoinHandle;
use tracing::trace;

use pw_core::constants;

use crate::endpoint::OperationKind;

/// One completed request's latency sample.
#[derive(Debug, Clone, Copy)]
struct LatencyEntry {
    /// Unix timestamp of the sample, in seconds.
    timestamp_secs: f64,
    /// Observed request latency, in seconds.
    latency_secs: f64,
}

/// Thread-safe rolling window of per-operation latencies.
///
/// Construction starts the prune sweep; call [`TelemetryStore::shutdown`]
/// at teardown to stop it. Both calls are safe from any task.
pub struct TelemetryStore {
    latencies: Mutex<HashMap<&'static str, Vec<LatencyEntry>>>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl TelemetryStore {
    /// Create a store and start its background prune sweep.
    ///
    /// Must be called within a tokio runtime.
    pub fn new() -> std::sync::Arc<Self> {
        let store = std::sync::Arc::new(Self {
            latencies: Mutex::new(HashMap::new()),
            sweeper: Mutex::new(None),
        });
        store.start_sweep();
        store
    }

    /// Start the background prune sweep if it is not already running.
    ///
    /// Safe to call again after [`TelemetryStore::shutdown`]; a client that
    /// resumes recording restarts the sweep through here.
    pub fn start_sweep(self: &std::sync::Arc<Self>) {
        let mut sweeper = self.sweeper.lock().expect("telemetry lock poisoned");
        if sweeper.as_ref().is_some_and(|h| !h.is_finished()) {
            return;
        }

        let weak = std::sync::Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(
                constants::TELEMETRY_SWEEP_INTERVAL_SECS,
            ));
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match weak.upgrade() {
                    Some(store) => store.prune(now_secs()),
                    None => break,
                }
            }
        });
        *sweeper = Some(handle);
    }

    /// Record the latency of a completed request.
    ///
    /// Samples are ignored when the operation carries no telemetry key or
    /// the elapsed time is zero.
    pub fn record_latency(&self, operation: OperationKind, elapsed: Duration) {
        let Some(key) = operation.telemetry_key() else {
            return;
        };
        if elapsed.is_zero() {
            return;
        }
        self.record_at(key, now_secs(), elapsed.as_secs_f64());
    }

    fn record_at(&self, key: &'static str, timestamp_secs: f64, latency_secs: f64) {
        let mut latencies = self.latencies.lock().expect("telemetry lock poisoned");
        latencies.entry(key).or_default().push(LatencyEntry {
            timestamp_secs,
            latency_secs,
        });
    }

    /// Current formatted averages, keyed `l_<operation>`.
    ///
    /// Buckets whose mean is not strictly positive are omitted.
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        let latencies = self.latencies.lock().expect("telemetry lock poisoned");
        let mut averages = BTreeMap::new();
        for (key, entries) in latencies.iter() {
            if entries.is_empty() {
                continue;
            }
            let total: f64 = entries.iter().map(|e| e.latency_secs).sum();
            let mean = total / entries.len() as f64;
            if mean > 0.0 {
                averages.insert(format!("l_{key}"), format_latency(mean));
            }
        }
        averages
    }

    /// Drop entries older than the retention window relative to `now_secs`
    /// and remove buckets that become empty.
    fn prune(&self, now_secs: f64) {
        let mut latencies = self.latencies.lock().expect("telemetry lock poisoned");
        latencies.retain(|key, entries| {
            entries.retain(|e| now_secs - e.timestamp_secs <= constants::TELEMETRY_MAX_AGE_SECS);
            if entries.is_empty() {
                trace!("telemetry bucket {key} drained");
                false
            } else {
                true
            }
        });
    }

    /// Stop the background sweep. Idempotent.
    pub fn shutdown(&self) {
        if let Some(handle) = self.sweeper.lock().expect("telemetry lock poisoned").take() {
            handle.abort();
        }
    }
}

impl Drop for TelemetryStore {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

/// Format a latency average to exactly three fraction digits, rounding
/// half-up, without grouping separators.
fn format_latency(secs: f64) -> String {
    let millis = (secs * 1000.0).round() as u64;
    format!("{}.{:03}", millis / 1000, millis % 1000)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_average_is_formatted_to_three_digits() {
        let store = TelemetryStore::new();
        store.record_latency(OperationKind::Subscribe, Duration::from_millis(250));
        store.record_latency(OperationKind::Subscribe, Duration::from_millis(350));

        let snapshot = store.snapshot();
        assert_eq!(snapshot.get("l_sub").map(String::as_str), Some("0.300"));
        store.shutdown();
    }

    #[tokio::test]
    async fn test_half_up_rounding() {
        let store = TelemetryStore::new();
        store.record_at("sub", now_secs(), 0.0015);
        assert_eq!(store.snapshot().get("l_sub").map(String::as_str), Some("0.002"));
        store.shutdown();
    }

    #[tokio::test]
    async fn test_zero_latency_ignored() {
        let store = TelemetryStore::new();
        store.record_latency(OperationKind::Heartbeat, Duration::ZERO);
        assert!(store.snapshot().is_empty());
        store.shutdown();
    }

    #[tokio::test]
    async fn test_operations_without_key_ignored() {
        let store = TelemetryStore::new();
        store.record_latency(OperationKind::Time, Duration::from_millis(10));
        assert!(store.snapshot().is_empty());
        store.shutdown();
    }

    #[tokio::test]
    async fn test_prune_drops_stale_buckets() {
        let store = TelemetryStore::new();
        let now = now_secs();
        store.record_at("sub", now - 120.0, 0.2);
        store.record_at("pres", now - 10.0, 0.1);

        store.prune(now);

        let snapshot = store.snapshot();
        assert!(!snapshot.contains_key("l_sub"));
        assert_eq!(snapshot.get("l_pres").map(String::as_str), Some("0.100"));
        store.shutdown();
    }

    #[tokio::test]
    async fn test_prune_keeps_entries_at_boundary() {
        let store = TelemetryStore::new();
        let now = now_secs();
        store.record_at("sub", now - constants::TELEMETRY_MAX_AGE_SECS, 0.2);

        store.prune(now);
        assert!(store.snapshot().contains_key("l_sub"));
        store.shutdown();
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let store = TelemetryStore::new();
        store.shutdown();
        store.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_restarts_after_shutdown() {
        let store = TelemetryStore::new();
        store.shutdown();

        // With the sweep stopped, a stale entry survives indefinitely.
        store.record_at("sub", now_secs() - 120.0, 0.2);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(store.snapshot().contains_key("l_sub"));

        store.start_sweep();
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(store.snapshot().is_empty());
        store.shutdown();
    }

    #[tokio::test]
    async fn test_start_sweep_while_running_is_noop() {
        let store = TelemetryStore::new();
        store.start_sweep();
        store.start_sweep();
        store.shutdown();
    }

    #[tokio::test]
    async fn test_multiple_buckets() {
        let store = TelemetryStore::new();
        store.record_latency(OperationKind::Subscribe, Duration::from_millis(100));
        store.record_latency(OperationKind::Heartbeat, Duration::from_millis(50));

        let snapshot = store.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.get("l_sub").map(String::as_str), Some("0.100"));
        assert_eq!(snapshot.get("l_pres").map(String::as_str), Some("0.050"));
        store.shutdown();
    }
}
