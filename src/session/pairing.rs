//! Pairing handshake and state machine.
//!
//! # States
//!
//! | State | Event | Next |
//! |-------|-------|------|
//! | `Unpaired` | attempt starts, no socket | `AwaitingOpen` |
//! | `AwaitingOpen` | attempt starts | `AwaitingOpen` (no new connect) |
//! | `Unpaired` | attempt starts, socket open | `AwaitingAck` |
//! | `AwaitingOpen` | socket opened, handshake sent | `AwaitingAck` |
//! | `AwaitingOpen` | connect failed | `Unpaired` |
//! | `AwaitingAck` | `registered` reply | `Paired` |
//! | `AwaitingAck` | any other reply | `AwaitingAck` |
//! | `AwaitingAck`, `Paired` | socket closed | `Unpaired` |
//! | not `Paired` | attempts exhausted | `Failed` |
//!
//! The first handshake makes the TV show a confirmation prompt. Attempts
//! made while the prompt is still on screen are expected; the retry loop
//! exists to wait out the user.
//!
//! An attempt's window starts once the connect has settled. A slow connect
//! is waited out (bounded by the transport's connect timeout) instead of
//! being raced by another one.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use parking_lot::RwLock;
use serde_json::Value;
use tokio::sync::{Mutex as AsyncMutex, watch};
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::keystore::KeyStore;
use crate::protocol::{ManifestSource, Reply};
use crate::transport::Transport;
use crate::transport::connection::CONNECT_TIMEOUT;

use super::CommandDispatcher;

// ============================================================================
// Constants
// ============================================================================

/// Default number of handshake attempts.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 7;

/// Default time one attempt waits for the TV to accept.
pub const DEFAULT_ATTEMPT_WINDOW: Duration = Duration::from_secs(5);

/// Default pause between attempts.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_millis(100);

// ============================================================================
// PairingState
// ============================================================================

/// Pairing progress of the current session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PairingState {
    /// No handshake in progress.
    #[default]
    Unpaired,
    /// Connecting; the handshake goes out once the socket opens.
    AwaitingOpen,
    /// Handshake sent, waiting for `registered`.
    AwaitingAck,
    /// The TV accepted this client on the current connection.
    Paired,
    /// Attempts exhausted without the TV accepting.
    Failed,
}

// ============================================================================
// PairingPolicy
// ============================================================================

/// Retry policy for [`PairingController::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PairingPolicy {
    /// Handshake attempts before giving up.
    pub max_attempts: u32,
    /// Time one attempt waits for the TV to accept.
    pub attempt_window: Duration,
    /// Pause between attempts.
    pub retry_interval: Duration,
}

impl Default for PairingPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            attempt_window: DEFAULT_ATTEMPT_WINDOW,
            retry_interval: DEFAULT_RETRY_INTERVAL,
        }
    }
}

impl PairingPolicy {
    /// Sets the number of attempts (at least one).
    #[inline]
    #[must_use]
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Sets how long one attempt waits for the TV.
    #[inline]
    #[must_use]
    pub fn attempt_window(mut self, window: Duration) -> Self {
        self.attempt_window = window;
        self
    }

    /// Sets the pause between attempts.
    #[inline]
    #[must_use]
    pub fn retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }
}

// ============================================================================
// PairingController
// ============================================================================

/// Drives the registration handshake and owns the pairing key.
pub struct PairingController {
    /// Device address, the key store entry name.
    address: String,
    /// Persisted keys.
    keystore: KeyStore,
    /// Handshake manifest, loaded fresh per attempt.
    manifest: ManifestSource,
    /// Retry policy.
    policy: PairingPolicy,
    /// Current pairing key; empty means "never paired".
    key: RwLock<String>,
    /// Current state, observable by the registering caller.
    state: watch::Sender<PairingState>,
    /// Only one registration runs at a time.
    running: AsyncMutex<()>,
}

impl PairingController {
    /// Creates a controller, loading any stored key for `address`.
    ///
    /// An unreadable key store is logged and treated as "not paired".
    #[must_use]
    pub fn new(
        address: impl Into<String>,
        keystore: KeyStore,
        manifest: ManifestSource,
        policy: PairingPolicy,
    ) -> Self {
        let address = address.into();
        let key = keystore.load(&address).unwrap_or_else(|e| {
            warn!(
                path = %keystore.path().display(),
                error = %e,
                "Failed to read key file, proceeding unpaired"
            );
            String::new()
        });

        let (state, _) = watch::channel(PairingState::Unpaired);

        Self {
            address,
            keystore,
            manifest,
            policy,
            key: RwLock::new(key),
            state,
            running: AsyncMutex::new(()),
        }
    }

    /// Returns `true` if a pairing key is known for the device.
    #[inline]
    #[must_use]
    pub fn is_registered(&self) -> bool {
        !self.key.read().is_empty()
    }

    /// Returns the current pairing key (empty if never paired).
    #[must_use]
    pub fn key(&self) -> String {
        self.key.read().clone()
    }

    /// Returns the current state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> PairingState {
        *self.state.borrow()
    }

    /// Returns the retry policy.
    #[inline]
    #[must_use]
    pub fn policy(&self) -> PairingPolicy {
        self.policy
    }

    /// Returns the key store.
    #[inline]
    #[must_use]
    pub fn keystore(&self) -> &KeyStore {
        &self.keystore
    }

    /// Runs handshake attempts until the TV accepts or the policy is spent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PairingFailed`] once all attempts are used up.
    pub async fn register(
        &self,
        transport: &Transport,
        dispatcher: &CommandDispatcher,
        url: &str,
    ) -> Result<()> {
        let _running = self.running.lock().await;

        if self.state() == PairingState::Paired {
            if transport.is_open() {
                debug!(address = %self.address, "Already paired on this connection");
                return Ok(());
            }
            self.state.send_replace(PairingState::Unpaired);
        }

        let mut state_rx = self.state.subscribe();
        let max_attempts = self.policy.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            debug!(address = %self.address, attempt, max_attempts, "Pairing attempt");

            self.start_attempt(transport, dispatcher, url);

            match self.settle(&mut state_rx).await {
                PairingState::Paired => {
                    info!(address = %self.address, attempt, "Successfully paired with TV");
                    return Ok(());
                }
                state => debug!(attempt, ?state, "Pairing attempt failed"),
            }

            if attempt < max_attempts {
                sleep(self.policy.retry_interval).await;
            }
        }

        self.state.send_replace(PairingState::Failed);
        warn!(address = %self.address, max_attempts, "Pairing attempts exhausted");

        Err(Error::pairing_failed(format!(
            "Failed to pair with TV at {} after {} attempts",
            self.address, max_attempts
        )))
    }

    /// Sends the handshake, or connects so `on_open` sends it.
    fn start_attempt(&self, transport: &Transport, dispatcher: &CommandDispatcher, url: &str) {
        if transport.is_open() {
            self.send_handshake(dispatcher);
            return;
        }

        self.state.send_replace(PairingState::AwaitingOpen);
        if transport.is_connecting() {
            debug!(address = %self.address, "Connect already in flight");
            return;
        }

        if let Err(e) = transport.connect(url) {
            warn!(error = %e, "Could not request connection");
            self.state.send_replace(PairingState::Unpaired);
        }
    }

    /// Waits for an attempt to end and returns the state it ended in.
    ///
    /// The connect phase is bounded by the transport's connect timeout; the
    /// attempt window covers the wait for `registered`.
    async fn settle(&self, state_rx: &mut watch::Receiver<PairingState>) -> PairingState {
        let connect_bound = CONNECT_TIMEOUT + self.policy.attempt_window;
        let connected = timeout(
            connect_bound,
            state_rx.wait_for(|s| *s != PairingState::AwaitingOpen),
        )
        .await
        .map(|changed| changed.map(|state| *state));

        match connected {
            Ok(Ok(_)) => {}
            Ok(Err(_)) => return PairingState::Unpaired,
            Err(_) => {
                debug!("Connect did not settle");
                return self.state();
            }
        }

        let outcome = timeout(
            self.policy.attempt_window,
            state_rx.wait_for(|s| matches!(s, PairingState::Paired | PairingState::Unpaired)),
        )
        .await
        .map(|changed| changed.map(|state| *state));

        match outcome {
            Ok(Ok(state)) => state,
            Ok(Err(_)) => PairingState::Unpaired,
            Err(_) => {
                debug!("No pairing answer within window");
                self.state()
            }
        }
    }

    /// Handles the socket opening. Sends the handshake if one is due.
    pub fn on_open(&self, dispatcher: &CommandDispatcher) {
        if self.state() == PairingState::AwaitingOpen {
            self.send_handshake(dispatcher);
        }
    }

    /// Handles a failed connect.
    pub fn on_fail(&self, reason: &str) {
        warn!(address = %self.address, reason, "Failed to connect to TV");
        self.state.send_if_modified(|state| match state {
            PairingState::AwaitingOpen | PairingState::AwaitingAck => {
                *state = PairingState::Unpaired;
                true
            }
            _ => false,
        });
    }

    /// Handles the socket closing. The session is no longer authorized.
    ///
    /// A connect in flight is unaffected; it reports through `on_open` or
    /// `on_fail`.
    pub fn on_closed(&self) {
        self.state.send_if_modified(|state| match state {
            PairingState::AwaitingAck | PairingState::Paired => {
                *state = PairingState::Unpaired;
                true
            }
            _ => false,
        });
    }

    /// Handles an inbound message.
    ///
    /// Returns `true` if the message completed the handshake.
    pub fn on_message(&self, message: &Value) -> bool {
        if self.state() != PairingState::AwaitingAck {
            return false;
        }

        let reply = Reply::new(message);
        if !reply.is_registered() {
            debug!(kind = ?reply.kind(), "Message while awaiting pairing");
            return false;
        }

        match reply.client_key() {
            Some(key) => {
                if let Err(e) = self.keystore.save(&self.address, key) {
                    warn!(
                        path = %self.keystore.path().display(),
                        error = %e,
                        "Failed to save pairing key"
                    );
                }
                *self.key.write() = key.to_string();
                info!(address = %self.address, "Saved pairing key");
            }
            None => debug!("Registered without a client key, keeping current key"),
        }

        self.state.send_replace(PairingState::Paired);
        true
    }

    /// Loads the manifest and sends it with the current key.
    fn send_handshake(&self, dispatcher: &CommandDispatcher) {
        let manifest = match self.manifest.load() {
            Ok(manifest) => manifest,
            Err(e) => {
                warn!(
                    path = ?self.manifest.path(),
                    error = %e,
                    "Failed to load handshake manifest"
                );
                self.state.send_replace(PairingState::Unpaired);
                return;
            }
        };

        let key = self.key();

        // The reply may be handled before send_register returns
        self.state.send_replace(PairingState::AwaitingAck);

        match dispatcher.send_register(manifest, &key) {
            Ok(id) => debug!(request_id = %id, with_key = !key.is_empty(), "Sent register payload"),
            Err(e) => {
                warn!(error = %e, "Failed to send register payload");
                self.state.send_replace(PairingState::Unpaired);
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::{Arc, Weak};

    use serde_json::json;
    use tempfile::{TempDir, tempdir};

    use crate::transport::TransportEvent;
    use crate::transport::mock::{MockDevice, unused_port};

    const FAST: PairingPolicy = PairingPolicy {
        max_attempts: 3,
        attempt_window: Duration::from_millis(500),
        retry_interval: Duration::from_millis(10),
    };

    struct Harness {
        transport: Arc<Transport>,
        dispatcher: CommandDispatcher,
        pairing: PairingController,
    }

    fn manifest() -> ManifestSource {
        ManifestSource::inline(json!({"type": "register", "payload": {"pairingType": "PROMPT"}}))
    }

    fn harness(dir: &TempDir, policy: PairingPolicy) -> Arc<Harness> {
        let transport = Arc::new(Transport::start());
        let harness = Arc::new(Harness {
            dispatcher: CommandDispatcher::new(Arc::clone(&transport)),
            pairing: PairingController::new(
                "127.0.0.1",
                KeyStore::at(dir.path().join("keys.json")),
                manifest(),
                policy,
            ),
            transport,
        });

        let weak: Weak<Harness> = Arc::downgrade(&harness);
        harness.transport.set_event_handler(Box::new(move |event| {
            let Some(h) = weak.upgrade() else {
                return;
            };
            match event {
                TransportEvent::Open => h.pairing.on_open(&h.dispatcher),
                TransportEvent::Fail(reason) => h.pairing.on_fail(&reason),
                TransportEvent::Closed => h.pairing.on_closed(),
                TransportEvent::Message(text) => {
                    if let Ok(value) = serde_json::from_str::<Value>(&text) {
                        h.pairing.on_message(&value);
                    }
                }
            }
        }));

        harness
    }

    #[test]
    fn test_default_policy() {
        let policy = PairingPolicy::default();
        assert_eq!(policy.max_attempts, 7);
        assert_eq!(policy.attempt_window, Duration::from_secs(5));
        assert_eq!(policy.retry_interval, Duration::from_millis(100));
        assert_eq!(PairingPolicy::default().max_attempts(0).max_attempts, 1);
    }

    #[tokio::test]
    async fn test_unpaired_at_construction() {
        let dir = tempdir().expect("tempdir");
        let h = harness(&dir, FAST);

        assert!(!h.pairing.is_registered());
        assert_eq!(h.pairing.key(), "");
        assert_eq!(h.pairing.state(), PairingState::Unpaired);
    }

    #[tokio::test]
    async fn test_corrupt_key_file_proceeds_unpaired() {
        let dir = tempdir().expect("tempdir");
        std::fs::write(dir.path().join("keys.json"), "{broken").expect("seed");

        let h = harness(&dir, FAST);
        assert!(!h.pairing.is_registered());
    }

    #[tokio::test]
    async fn test_registered_reply_pairs_and_persists() {
        let dir = tempdir().expect("tempdir");
        let device = MockDevice::pairing("K").await;
        let h = harness(&dir, FAST);

        h.pairing
            .register(&h.transport, &h.dispatcher, &device.url())
            .await
            .expect("paired");

        assert_eq!(h.pairing.state(), PairingState::Paired);
        assert!(h.pairing.is_registered());
        assert_eq!(h.pairing.key(), "K");
        assert_eq!(
            KeyStore::at(dir.path().join("keys.json"))
                .load("127.0.0.1")
                .expect("load"),
            "K"
        );

        let received = device.received();
        assert_eq!(received[0]["type"], "register");
        assert_eq!(received[0]["id"], "register_0");
        assert_eq!(received[0]["payload"]["client-key"], "");
        assert_eq!(received[0]["payload"]["pairingType"], "PROMPT");

        h.transport.shutdown().await;
    }

    #[tokio::test]
    async fn test_stored_key_is_sent_in_handshake() {
        let dir = tempdir().expect("tempdir");
        KeyStore::at(dir.path().join("keys.json"))
            .save("127.0.0.1", "STORED")
            .expect("seed");

        let device = MockDevice::pairing("STORED").await;
        let h = harness(&dir, FAST);
        assert!(h.pairing.is_registered());

        h.pairing
            .register(&h.transport, &h.dispatcher, &device.url())
            .await
            .expect("paired");

        assert_eq!(device.received()[0]["payload"]["client-key"], "STORED");
        h.transport.shutdown().await;
    }

    #[tokio::test]
    async fn test_always_failing_connect_raises_once() {
        let dir = tempdir().expect("tempdir");
        let port = unused_port().await;
        let h = harness(&dir, FAST);

        let started = tokio::time::Instant::now();
        let err = h
            .pairing
            .register(&h.transport, &h.dispatcher, &format!("ws://127.0.0.1:{port}"))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::PairingFailed { .. }));
        assert_eq!(err.code(), "pairing-failed");
        assert_eq!(h.pairing.state(), PairingState::Failed);
        assert!(!h.pairing.is_registered());
        assert!(started.elapsed() < Duration::from_secs(10));

        h.transport.shutdown().await;
    }

    #[tokio::test]
    async fn test_user_confirms_on_a_later_attempt() {
        let dir = tempdir().expect("tempdir");
        let seen = Arc::new(parking_lot::Mutex::new(0u32));
        let counter = Arc::clone(&seen);

        // Prompt stays on screen for the first two handshakes
        let device = MockDevice::start(move |msg| {
            let mut count = counter.lock();
            *count += 1;
            if *count < 3 {
                vec![json!({"id": msg["id"], "type": "response", "payload": {"pairingType": "PROMPT"}})]
            } else {
                vec![json!({"id": msg["id"], "type": "registered", "payload": {"client-key": "LATE"}})]
            }
        })
        .await;

        let policy = PairingPolicy {
            max_attempts: 5,
            attempt_window: Duration::from_millis(100),
            retry_interval: Duration::from_millis(10),
        };
        let h = harness(&dir, policy);

        h.pairing
            .register(&h.transport, &h.dispatcher, &device.url())
            .await
            .expect("paired");

        assert_eq!(h.pairing.key(), "LATE");
        assert_eq!(*seen.lock(), 3);
        // Handshakes were re-sent on the same connection
        assert_eq!(device.connection_count(), 1);

        let ids: Vec<String> = device
            .received()
            .iter()
            .filter_map(|m| m["id"].as_str().map(str::to_string))
            .collect();
        assert_eq!(ids, vec!["register_0", "register_1", "register_2"]);

        h.transport.shutdown().await;
    }

    #[tokio::test]
    async fn test_user_never_confirms() {
        let dir = tempdir().expect("tempdir");
        let device = MockDevice::start(|_| Vec::new()).await;
        let policy = PairingPolicy {
            max_attempts: 2,
            attempt_window: Duration::from_millis(100),
            retry_interval: Duration::from_millis(10),
        };
        let h = harness(&dir, policy);

        let err = h
            .pairing
            .register(&h.transport, &h.dispatcher, &device.url())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::PairingFailed { .. }));
        assert_eq!(device.received().len(), 2);
        assert!(!dir.path().join("keys.json").exists());

        h.transport.shutdown().await;
    }

    #[tokio::test]
    async fn test_missing_manifest_fails_attempts() {
        let dir = tempdir().expect("tempdir");
        let device = MockDevice::pairing("K").await;
        let transport = Arc::new(Transport::start());
        let dispatcher = CommandDispatcher::new(Arc::clone(&transport));
        let pairing = Arc::new(PairingController::new(
            "127.0.0.1",
            KeyStore::at(dir.path().join("keys.json")),
            ManifestSource::file(dir.path().join("absent.json")),
            FAST,
        ));

        // No event handler: open the socket first so attempts re-send
        transport.connect(&device.url()).expect("queued");
        for _ in 0..200 {
            if transport.is_open() {
                break;
            }
            sleep(Duration::from_millis(10)).await;
        }

        let err = pairing
            .register(&transport, &dispatcher, &device.url())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::PairingFailed { .. }));
        assert!(device.received().is_empty());
        transport.shutdown().await;
    }

    #[tokio::test]
    async fn test_already_paired_returns_immediately() {
        let dir = tempdir().expect("tempdir");
        let device = MockDevice::pairing("K").await;
        let h = harness(&dir, FAST);

        h.pairing
            .register(&h.transport, &h.dispatcher, &device.url())
            .await
            .expect("paired");
        h.pairing
            .register(&h.transport, &h.dispatcher, &device.url())
            .await
            .expect("still paired");

        assert_eq!(device.received().len(), 1);
        h.transport.shutdown().await;
    }

    #[tokio::test]
    async fn test_informational_message_keeps_waiting() {
        let dir = tempdir().expect("tempdir");
        let h = harness(&dir, FAST);

        h.pairing.state.send_replace(PairingState::AwaitingAck);
        assert!(!h.pairing.on_message(&json!({"type": "response", "payload": {"pairingType": "PROMPT"}})));
        assert_eq!(h.pairing.state(), PairingState::AwaitingAck);

        assert!(h.pairing.on_message(&json!({"type": "registered", "payload": {"client-key": "K"}})));
        assert_eq!(h.pairing.state(), PairingState::Paired);
    }

    #[tokio::test]
    async fn test_registered_ignored_when_not_awaiting() {
        let dir = tempdir().expect("tempdir");
        let h = harness(&dir, FAST);

        assert!(!h.pairing.on_message(&json!({"type": "registered", "payload": {"client-key": "K"}})));
        assert!(!h.pairing.is_registered());
    }

    #[tokio::test]
    async fn test_closed_connection_drops_session() {
        let dir = tempdir().expect("tempdir");
        let h = harness(&dir, FAST);

        h.pairing.state.send_replace(PairingState::Paired);
        h.pairing.on_closed();
        assert_eq!(h.pairing.state(), PairingState::Unpaired);

        h.pairing.state.send_replace(PairingState::Failed);
        h.pairing.on_closed();
        assert_eq!(h.pairing.state(), PairingState::Failed);

        // A replaced socket closing does not cancel the connect in flight
        h.pairing.state.send_replace(PairingState::AwaitingOpen);
        h.pairing.on_closed();
        assert_eq!(h.pairing.state(), PairingState::AwaitingOpen);
    }

    #[tokio::test]
    async fn test_slow_upgrade_outlasting_window_still_pairs() {
        let dir = tempdir().expect("tempdir");
        let device = MockDevice::with_upgrade_delay(Duration::from_millis(300), |msg| {
            match msg["type"].as_str() {
                Some("register") => vec![crate::transport::mock::registered(msg, "K")],
                _ => Vec::new(),
            }
        })
        .await;
        let policy = PairingPolicy {
            max_attempts: 5,
            attempt_window: Duration::from_millis(100),
            retry_interval: Duration::from_millis(10),
        };
        let h = harness(&dir, policy);

        h.pairing
            .register(&h.transport, &h.dispatcher, &device.url())
            .await
            .expect("paired");

        assert_eq!(h.pairing.state(), PairingState::Paired);
        assert_eq!(h.pairing.key(), "K");
        assert_eq!(
            KeyStore::at(dir.path().join("keys.json"))
                .load("127.0.0.1")
                .expect("load"),
            "K"
        );
        assert_eq!(device.connection_count(), 1);
        assert_eq!(device.received().len(), 1);
        assert!(h.transport.is_open());

        h.transport.shutdown().await;
    }

    #[tokio::test]
    async fn test_attempt_joins_connect_in_flight() {
        let dir = tempdir().expect("tempdir");
        let device =
            MockDevice::with_upgrade_delay(Duration::from_millis(300), |_| Vec::new()).await;
        let h = harness(&dir, FAST);

        h.transport.connect(&device.url()).expect("queued");
        h.pairing.start_attempt(&h.transport, &h.dispatcher, &device.url());
        assert_eq!(h.pairing.state(), PairingState::AwaitingOpen);

        let mut state_rx = h.pairing.state.subscribe();
        timeout(
            Duration::from_secs(5),
            state_rx.wait_for(|s| *s == PairingState::AwaitingAck),
        )
        .await
        .expect("handshake sent on open")
        .expect("sender alive");

        assert_eq!(device.connection_count(), 1);
        h.transport.shutdown().await;
    }
}
