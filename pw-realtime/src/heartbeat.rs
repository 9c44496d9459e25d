//! Presence heartbeat coordination.
//!
//! Runs an independent periodic task, decoupled from the subscribe loop's
//! request cadence. Each (re)start announces immediately, then on a fixed
//! interval; an interval of zero disables the task entirely and presence
//! relies on the long-poll connection alone. Heartbeat and leave failures
//! are logged and swallowed; they never terminate the subscribe loop and a
//! leave never blocks teardown.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use pw_api::endpoints::{Heartbeat, Leave};

use crate::state::InterestSet;
use crate::transport::RealtimeTransport;

/// Periodic presence announcer sharing the client's interest set.
pub struct HeartbeatCoordinator {
    interval_secs: u64,
    interest: Arc<Mutex<InterestSet>>,
    transport: Arc<dyn RealtimeTransport>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl HeartbeatCoordinator {
    pub fn new(
        interval_secs: u64,
        interest: Arc<Mutex<InterestSet>>,
        transport: Arc<dyn RealtimeTransport>,
    ) -> Self {
        Self {
            interval_secs,
            interest,
            transport,
            task: Mutex::new(None),
        }
    }

    /// (Re)start the periodic announce task: one immediate announce, then
    /// one per interval. No-op when heartbeats are disabled.
    pub fn restart(&self) {
        self.stop();
        if self.interval_secs == 0 {
            debug!("heartbeat disabled (interval 0)");
            return;
        }

        let interest = Arc::clone(&self.interest);
        let transport = Arc::clone(&self.transport);
        let interval = Duration::from_secs(self.interval_secs);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                // First tick completes immediately: the announce on
                // interest change happens here.
                ticker.tick().await;
                announce(&interest, transport.as_ref()).await;
            }
        });
        *self.task.lock().expect("heartbeat lock poisoned") = Some(handle);
    }

    /// Stop the periodic task. Idempotent.
    pub fn stop(&self) {
        if let Some(handle) = self.task.lock().expect("heartbeat lock poisoned").take() {
            handle.abort();
        }
    }

    /// Whether the periodic task is currently running.
    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .expect("heartbeat lock poisoned")
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    /// Fire one best-effort leave for the given channel set. Failure is
    /// logged, not retried.
    pub async fn leave_now(&self, channels: Vec<String>, channel_groups: Vec<String>) {
        if channels.is_empty() && channel_groups.is_empty() {
            return;
        }
        let request = Leave {
            channels,
            channel_groups,
        };
        if let Err(e) = self.transport.leave(request).await {
            warn!("leave announce failed: {e}");
        }
    }
}

impl Drop for HeartbeatCoordinator {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Announce presence for the current interest set; skipped when empty.
async fn announce(interest: &Mutex<InterestSet>, transport: &dyn RealtimeTransport) {
    let request = {
        let interest = interest.lock().expect("interest lock poisoned");
        let channels = interest.presence_channels();
        let channel_groups = interest.presence_channel_groups();
        if channels.is_empty() && channel_groups.is_empty() {
            return;
        }
        Heartbeat {
            channels,
            channel_groups,
            state: interest.state_payload(),
        }
    };

    if let Err(e) = transport.heartbeat(request).await {
        warn!("heartbeat announce failed: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pw_api::endpoints::{HereNow, Subscribe};
    use pw_api::models::{HereNowResult, SubscribeEnvelope};
    use pw_core::error::{PwError, PwResult};

    #[derive(Default)]
    struct RecordingTransport {
        heartbeats: Mutex<Vec<Heartbeat>>,
        leaves: Mutex<Vec<Leave>>,
        fail_heartbeats: bool,
    }

    #[async_trait]
    impl RealtimeTransport for RecordingTransport {
        async fn subscribe(&self, _request: Subscribe) -> PwResult<SubscribeEnvelope> {
            std::future::pending().await
        }

        async fn heartbeat(&self, request: Heartbeat) -> PwResult<()> {
            self.heartbeats.lock().unwrap().push(request);
            if self.fail_heartbeats {
                Err(PwError::Network("unreachable".into()))
            } else {
                Ok(())
            }
        }

        async fn leave(&self, request: Leave) -> PwResult<()> {
            self.leaves.lock().unwrap().push(request);
            Ok(())
        }

        async fn here_now(&self, _request: HereNow) -> PwResult<HereNowResult> {
            Ok(HereNowResult::default())
        }
    }

    fn interest_with(channels: &[&str]) -> Arc<Mutex<InterestSet>> {
        let mut set = InterestSet::default();
        set.add_channels(
            &channels.iter().map(|c| c.to_string()).collect::<Vec<_>>(),
            true,
        );
        Arc::new(Mutex::new(set))
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_interval_never_announces() {
        let transport = Arc::new(RecordingTransport::default());
        let coordinator =
            HeartbeatCoordinator::new(0, interest_with(&["room1"]), transport.clone());
        coordinator.restart();
        assert!(!coordinator.is_running());

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert!(transport.heartbeats.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_announces_at_interval_spacing() {
        let transport = Arc::new(RecordingTransport::default());
        let coordinator =
            HeartbeatCoordinator::new(2, interest_with(&["room1"]), transport.clone());
        coordinator.restart();
        assert!(coordinator.is_running());

        // Immediate announce plus one per 2-second tick.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(transport.heartbeats.lock().unwrap().len(), 1);

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(transport.heartbeats.lock().unwrap().len(), 3);

        coordinator.stop();
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(transport.heartbeats.lock().unwrap().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_announce_filters_presence_companions() {
        let transport = Arc::new(RecordingTransport::default());
        let coordinator =
            HeartbeatCoordinator::new(5, interest_with(&["room1"]), transport.clone());
        coordinator.restart();

        tokio::time::sleep(Duration::from_millis(100)).await;
        let heartbeats = transport.heartbeats.lock().unwrap();
        assert_eq!(heartbeats[0].channels, vec!["room1".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_interest_skips_announce() {
        let transport = Arc::new(RecordingTransport::default());
        let interest = Arc::new(Mutex::new(InterestSet::default()));
        let coordinator = HeartbeatCoordinator::new(2, interest, transport.clone());
        coordinator.restart();

        tokio::time::sleep(Duration::from_secs(7)).await;
        assert!(transport.heartbeats.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_are_swallowed() {
        let transport = Arc::new(RecordingTransport {
            fail_heartbeats: true,
            ..Default::default()
        });
        let coordinator =
            HeartbeatCoordinator::new(2, interest_with(&["room1"]), transport.clone());
        coordinator.restart();

        tokio::time::sleep(Duration::from_secs(5)).await;
        // Still ticking despite every announce failing.
        assert!(transport.heartbeats.lock().unwrap().len() >= 2);
        assert!(coordinator.is_running());
    }

    #[tokio::test]
    async fn test_leave_now_skips_empty_set() {
        let transport = Arc::new(RecordingTransport::default());
        let coordinator =
            HeartbeatCoordinator::new(2, interest_with(&["room1"]), transport.clone());
        coordinator.leave_now(Vec::new(), Vec::new()).await;
        assert!(transport.leaves.lock().unwrap().is_empty());

        coordinator
            .leave_now(vec!["room1".into()], Vec::new())
            .await;
        assert_eq!(transport.leaves.lock().unwrap().len(), 1);
    }
}
