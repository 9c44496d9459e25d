//! The realtime client: subscribe loop ownership and caller-facing operations.
//!
//! One client owns one logical long-poll loop, one heartbeat coordinator,
//! and one telemetry sweep. The loop is a sequential request/response chain:
//! each iteration snapshots the interest set, issues a long poll with the
//! current cursor, dispatches decoded events, and immediately reissues. The
//! caller mutates the interest set through subscribe/unsubscribe and the
//! loop picks the change up by abandoning its in-flight request, cursor
//! intact.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use pw_api::endpoint::OperationKind;
use pw_api::endpoints::{HereNow, Leave, Subscribe};
use pw_api::models::HereNowResult;
use pw_api::telemetry::TelemetryStore;
use pw_core::config::ClientConfig;
use pw_core::error::PwResult;

use crate::events::{decode_wire_message, EventDispatcher, RealtimeEvent, StatusCategory, StatusEvent};
use crate::heartbeat::HeartbeatCoordinator;
use crate::retry::{ReconnectPolicy, RetryDecision};
use crate::state::{ConnectionState, InterestSet, SubscriptionCursor};
use crate::transport::{HttpTransport, RealtimeTransport};

/// State shared between the client handle and the loop task.
struct LoopShared {
    transport: Arc<dyn RealtimeTransport>,
    interest: Arc<Mutex<InterestSet>>,
    dispatcher: EventDispatcher,
    state_tx: watch::Sender<ConnectionState>,
    /// Bumped whenever the interest set changes. The loop watches this and
    /// reissues its long poll with the updated set; an idle or disconnected
    /// loop parks on it, so a wakeup is never lost to task teardown.
    interest_gen: watch::Sender<u64>,
    policy: Mutex<ReconnectPolicy>,
}

impl LoopShared {
    fn set_state(&self, new_state: ConnectionState) {
        self.state_tx.send_if_modified(|state| {
            if *state != new_state {
                info!("subscribe loop: {} -> {}", *state, new_state);
                *state = new_state;
                true
            } else {
                false
            }
        });
    }

    fn wake_loop(&self) {
        self.interest_gen.send_modify(|generation| *generation += 1);
    }

    fn emit_status(
        &self,
        category: StatusCategory,
        is_error: bool,
        channels: &[String],
        channel_groups: &[String],
    ) {
        self.dispatcher.emit(RealtimeEvent::Status(StatusEvent {
            operation: OperationKind::Subscribe,
            category,
            error: is_error,
            affected_channels: channels.to_vec(),
            affected_channel_groups: channel_groups.to_vec(),
        }));
    }
}

/// A Pulsewire realtime client.
///
/// Cheap to share behind an `Arc`; all mutation happens through interior
/// synchronization. [`RealtimeClient::stop`] tears down the loop, the
/// heartbeat timer (with a best-effort leave), and the telemetry sweep, in
/// that order, and is safe to call twice.
pub struct RealtimeClient {
    config: ClientConfig,
    shared: Arc<LoopShared>,
    heartbeat: HeartbeatCoordinator,
    telemetry: Option<Arc<TelemetryStore>>,
    loop_task: Mutex<Option<JoinHandle<()>>>,
    stopped: AtomicBool,
}

impl RealtimeClient {
    /// Create a client over HTTP.
    pub fn new(config: ClientConfig) -> PwResult<Self> {
        config.validate()?;
        let http = HttpTransport::new(config.clone())?;
        let telemetry = Arc::clone(&http.context().telemetry);
        Ok(Self::build(config, Arc::new(http), Some(telemetry)))
    }

    /// Create a client over a custom transport. Used by tests and embedding
    /// hosts that bring their own stack.
    pub fn with_transport(config: ClientConfig, transport: Arc<dyn RealtimeTransport>) -> Self {
        Self::build(config, transport, None)
    }

    fn build(
        config: ClientConfig,
        transport: Arc<dyn RealtimeTransport>,
        telemetry: Option<Arc<TelemetryStore>>,
    ) -> Self {
        let interest = Arc::new(Mutex::new(InterestSet::default()));
        let (state_tx, _) = watch::channel(ConnectionState::Idle);
        let (interest_gen, _) = watch::channel(0u64);
        let shared = Arc::new(LoopShared {
            transport: Arc::clone(&transport),
            interest: Arc::clone(&interest),
            dispatcher: EventDispatcher::new(64),
            state_tx,
            interest_gen,
            policy: Mutex::new(ReconnectPolicy::default()),
        });
        let heartbeat = HeartbeatCoordinator::new(
            config.heartbeat_interval_secs,
            interest,
            transport,
        );
        Self {
            config,
            shared,
            heartbeat,
            telemetry,
            loop_task: Mutex::new(None),
            stopped: AtomicBool::new(false),
        }
    }

    /// Override the reconnection policy.
    ///
    /// A long-poll cycle already in its backoff wait keeps its current
    /// delay; the new policy applies from the next failure on.
    pub fn with_reconnect_policy(self, policy: ReconnectPolicy) -> Self {
        *self.shared.policy.lock().expect("policy lock poisoned") = policy;
        self
    }

    /// Subscribe to receive events (messages, presence, status).
    pub fn events(&self) -> tokio::sync::broadcast::Receiver<RealtimeEvent> {
        self.shared.dispatcher.subscribe()
    }

    /// Watch connection state changes.
    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state_tx.subscribe()
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.shared.state_tx.borrow()
    }

    /// Register interest in channels and channel groups and start (or wake)
    /// the long-poll loop. With `with_presence`, presence events for each
    /// entry are delivered too, and the heartbeat coordinator announces
    /// immediately.
    pub fn subscribe(
        &self,
        channels: &[String],
        channel_groups: &[String],
        with_presence: bool,
    ) {
        self.stopped.store(false, Ordering::SeqCst);
        {
            let mut interest = self.shared.interest.lock().expect("interest lock poisoned");
            interest.add_channels(channels, with_presence);
            interest.add_channel_groups(channel_groups, with_presence);
        }
        debug!(
            "subscribed to {} channel(s), {} group(s)",
            channels.len(),
            channel_groups.len()
        );
        if let Some(telemetry) = &self.telemetry {
            telemetry.start_sweep();
        }
        self.heartbeat.restart();
        self.ensure_loop();
        self.shared.wake_loop();
    }

    /// Drop interest in channels and channel groups, announcing a leave for
    /// the removed entries. The in-flight long poll is reissued with the
    /// reduced set, cursor intact; removing the last entry sends the loop
    /// idle.
    pub fn unsubscribe(&self, channels: &[String], channel_groups: &[String]) {
        let now_empty = {
            let mut interest = self.shared.interest.lock().expect("interest lock poisoned");
            interest.remove_channels(channels);
            interest.remove_channel_groups(channel_groups);
            interest.is_empty()
        };

        self.spawn_leave(channels.to_vec(), channel_groups.to_vec());
        self.shared.wake_loop();

        if now_empty {
            self.heartbeat.stop();
        } else {
            self.heartbeat.restart();
        }
    }

    /// Drop all interest, announce one leave for everything, and stop the
    /// heartbeat timer.
    pub fn unsubscribe_all(&self) {
        let (channels, channel_groups) = {
            let mut interest = self.shared.interest.lock().expect("interest lock poisoned");
            let snapshot = (interest.presence_channels(), interest.presence_channel_groups());
            interest.clear();
            snapshot
        };

        self.spawn_leave(channels, channel_groups);
        self.shared.wake_loop();
        self.heartbeat.stop();
    }

    /// Attach presence state to a channel; carried on subsequent subscribe
    /// and heartbeat requests.
    pub fn set_presence_state(&self, channel: &str, state: serde_json::Value) {
        self.shared
            .interest
            .lock()
            .expect("interest lock poisoned")
            .set_state(channel, state);
    }

    /// Query current occupancy.
    pub async fn here_now(&self, request: HereNow) -> PwResult<HereNowResult> {
        self.shared.transport.here_now(request).await
    }

    /// Stop the client: cancel the in-flight long poll, stop the heartbeat
    /// timer with a best-effort leave, and stop the telemetry sweep.
    /// Idempotent.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("stopping realtime client");

        if let Some(handle) = self.loop_task.lock().expect("loop lock poisoned").take() {
            handle.abort();
        }
        self.shared.set_state(ConnectionState::Disconnected);

        let (channels, channel_groups) = {
            let mut interest = self.shared.interest.lock().expect("interest lock poisoned");
            let snapshot = (interest.presence_channels(), interest.presence_channel_groups());
            interest.clear();
            snapshot
        };
        self.shared
            .emit_status(StatusCategory::Disconnected, false, &channels, &channel_groups);

        self.heartbeat.stop();
        self.spawn_leave(channels, channel_groups);

        if let Some(telemetry) = &self.telemetry {
            telemetry.shutdown();
        }
    }

    /// Spawn the loop task if it is not already running.
    fn ensure_loop(&self) {
        let mut task = self.loop_task.lock().expect("loop lock poisoned");
        let running = task.as_ref().is_some_and(|h| !h.is_finished());
        if !running {
            let shared = Arc::clone(&self.shared);
            *task = Some(tokio::spawn(run_loop(shared)));
        }
    }

    /// Fire-and-forget leave announce; failure is logged, never retried,
    /// and never blocks the caller.
    fn spawn_leave(&self, channels: Vec<String>, channel_groups: Vec<String>) {
        if channels.is_empty() && channel_groups.is_empty() {
            return;
        }
        let transport = Arc::clone(&self.shared.transport);
        tokio::spawn(async move {
            let request = Leave {
                channels,
                channel_groups,
            };
            if let Err(e) = transport.leave(request).await {
                warn!("leave announce failed: {e}");
            }
        });
    }

    /// The configuration this client was built with.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }
}

impl Drop for RealtimeClient {
    fn drop(&mut self) {
        if let Some(handle) = self.loop_task.lock().expect("loop lock poisoned").take() {
            handle.abort();
        }
        if let Some(telemetry) = &self.telemetry {
            telemetry.shutdown();
        }
    }
}

/// The long-poll loop. Owns the cursor. When the interest set drains or a
/// failure is classified terminal the loop parks on the interest watch
/// rather than exiting, so a concurrent subscribe call always reaches a
/// live waiter. The task ends only when the client is torn down.
async fn run_loop(shared: Arc<LoopShared>) {
    let mut interest_rx = shared.interest_gen.subscribe();
    let mut cursor = SubscriptionCursor::default();
    let mut attempt: u32 = 0;
    let mut connected = false;
    let mut reconnecting = false;

    loop {
        // Mark the current generation seen before snapshotting, so any
        // mutation after the snapshot is guaranteed to wake the loop.
        interest_rx.borrow_and_update();

        let snapshot = {
            let interest = shared.interest.lock().expect("interest lock poisoned");
            if interest.is_empty() {
                None
            } else {
                Some((
                    interest.subscribe_channels(),
                    interest.subscribe_channel_groups(),
                    interest.state_payload(),
                ))
            }
        };
        let Some((channels, channel_groups, state)) = snapshot else {
            debug!("interest set empty, subscribe loop going idle");
            shared.set_state(ConnectionState::Idle);
            if interest_rx.changed().await.is_err() {
                return;
            }
            cursor = SubscriptionCursor::default();
            attempt = 0;
            connected = false;
            reconnecting = false;
            continue;
        };

        shared.set_state(if reconnecting {
            ConnectionState::Reconnecting
        } else if connected {
            ConnectionState::Connected
        } else {
            ConnectionState::Connecting
        });

        let request = Subscribe {
            channels: channels.clone(),
            channel_groups: channel_groups.clone(),
            timetoken: (!cursor.is_unset()).then_some(cursor.timetoken),
            region: cursor.region.clone(),
            state,
            filter_expression: None,
        };

        tokio::select! {
            // Interest changed mid-poll: abandon the request and reissue
            // with the updated set. The cursor is untouched.
            _ = interest_rx.changed() => {
                debug!("interest changed, reissuing long poll");
                continue;
            }
            result = shared.transport.subscribe(request) => match result {
                Ok(envelope) => {
                    cursor.advance(&envelope.cursor);
                    attempt = 0;
                    if !connected {
                        connected = true;
                        shared.emit_status(StatusCategory::Connected, false, &channels, &channel_groups);
                    } else if reconnecting {
                        shared.emit_status(StatusCategory::Reconnected, false, &channels, &channel_groups);
                    }
                    reconnecting = false;
                    shared.set_state(ConnectionState::Connected);

                    for message in &envelope.messages {
                        shared.dispatcher.emit(decode_wire_message(message));
                    }
                }
                Err(e) => {
                    let policy = shared.policy.lock().expect("policy lock poisoned").clone();
                    match policy.classify(&e) {
                        RetryDecision::Retry(category) => {
                            attempt += 1;
                            if policy.exhausted(attempt) {
                                error!("long poll retries exhausted after {attempt} attempt(s): {e}");
                                shared.emit_status(StatusCategory::Disconnected, true, &channels, &channel_groups);
                                shared.set_state(ConnectionState::Disconnected);
                                if interest_rx.changed().await.is_err() {
                                    return;
                                }
                                cursor = SubscriptionCursor::default();
                                attempt = 0;
                                connected = false;
                                reconnecting = false;
                                continue;
                            }
                            warn!("long poll cycle failed ({e}), retrying");
                            reconnecting = true;
                            shared.set_state(ConnectionState::Reconnecting);
                            shared.emit_status(category, true, &channels, &channel_groups);

                            let delay = policy.delay(attempt - 1);
                            tokio::select! {
                                _ = sleep(delay) => {}
                                _ = interest_rx.changed() => {
                                    debug!("interest changed during backoff");
                                }
                            }
                        }
                        RetryDecision::Terminal(category) => {
                            error!("long poll terminated: {e}");
                            shared.emit_status(category, true, &channels, &channel_groups);
                            shared.set_state(ConnectionState::Disconnected);
                            if interest_rx.changed().await.is_err() {
                                return;
                            }
                            cursor = SubscriptionCursor::default();
                            attempt = 0;
                            connected = false;
                            reconnecting = false;
                            continue;
                        }
                    }
                },
            },
        }
    }
}
