//! Client facade.
//!
//! The [`Client`] ties together the transport worker, the pairing
//! controller, the command dispatcher and the response bridge.
//!
//! # Call Shapes
//!
//! | Method | Waits for reply | Result |
//! |--------|-----------------|--------|
//! | [`Client::request`] | no | request id |
//! | [`Client::blocking_request`] | yes | reply, or `None` on timeout |
//! | [`Client::call`] | yes | reply payload, timeouts and error replies as [`Error`] |
//!
//! Blocking calls are serialized. Do not issue fire-and-forget requests
//! while a blocking call is waiting on a TV that omits reply ids: its reply
//! could be taken for the blocking call's.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::identifiers::RequestId;
use crate::keystore::KeyStore;
use crate::protocol::{ManifestSource, Reply};
use crate::session::{
    CommandDispatcher, PairingController, PairingPolicy, PairingState, ResponseBridge,
};
use crate::transport::{Transport, TransportEvent};

use super::builder::ClientBuilder;
use super::options::Device;

// ============================================================================
// Constants
// ============================================================================

/// Endpoint for on-screen toast notifications.
const CREATE_TOAST: &str = "system.notifications/createToast";

// ============================================================================
// Types
// ============================================================================

/// Internal shared state for the client.
pub(crate) struct ClientInner {
    /// Target TV.
    device: Device,
    /// WebSocket transport and its worker.
    transport: Arc<Transport>,
    /// Envelope construction and sending.
    dispatcher: CommandDispatcher,
    /// Reply correlation.
    bridge: ResponseBridge,
    /// Pairing state machine and key.
    pairing: PairingController,
    /// Reply timeout for blocking requests.
    request_timeout: Duration,
}

// ============================================================================
// Client
// ============================================================================

/// Client for one webOS TV.
///
/// # Examples
///
/// ```no_run
/// use serde_json::json;
/// use webos_client::Client;
///
/// # async fn example() -> webos_client::Result<()> {
/// let client = Client::builder().address("192.168.1.20").build()?;
///
/// if !client.is_registered() {
///     println!("Accept the prompt on the TV");
/// }
/// client.register_client().await?;
///
/// client.request("audio/volumeUp", json!({}))?;
/// let volume = client.blocking_request("audio/getVolume", json!({})).await?;
/// println!("{volume:?}");
///
/// client.close().await;
/// # Ok(())
/// # }
/// ```
pub struct Client {
    /// Shared inner state.
    pub(crate) inner: Arc<ClientInner>,
}

// ============================================================================
// Client - Display
// ============================================================================

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("device", &self.inner.device)
            .field("registered", &self.is_registered())
            .field("state", &self.pairing_state())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Client - Public API
// ============================================================================

impl Client {
    /// Creates a configuration builder for the client.
    #[inline]
    #[must_use]
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Returns the target TV.
    #[inline]
    #[must_use]
    pub fn device(&self) -> &Device {
        &self.inner.device
    }

    /// Returns `true` if a pairing key is stored for the TV.
    #[inline]
    #[must_use]
    pub fn is_registered(&self) -> bool {
        self.inner.pairing.is_registered()
    }

    /// Returns the pairing key (empty if never paired).
    #[must_use]
    pub fn client_key(&self) -> String {
        self.inner.pairing.key()
    }

    /// Returns the pairing state of the current connection.
    #[inline]
    #[must_use]
    pub fn pairing_state(&self) -> PairingState {
        self.inner.pairing.state()
    }

    /// Returns `true` if the WebSocket is open.
    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inner.transport.is_open()
    }

    /// Returns the most recent message received from the TV.
    #[must_use]
    pub fn last_response(&self) -> Option<Value> {
        self.inner.bridge.last_response()
    }

    /// Connects and runs the registration handshake.
    ///
    /// With a stored key the TV accepts silently; otherwise the user must
    /// confirm the prompt on screen within the pairing policy. Requests are
    /// only accepted by the TV after this succeeds on the connection.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PairingFailed`] when all attempts are used up.
    pub async fn register_client(&self) -> Result<()> {
        let inner = &self.inner;
        inner
            .pairing
            .register(&inner.transport, &inner.dispatcher, &inner.device.url())
            .await
    }

    /// Sends a request without waiting for its reply.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotConnected`] if there is no open connection.
    pub fn request(&self, uri: &str, payload: Value) -> Result<RequestId> {
        self.inner.dispatcher.fire_and_forget(uri, payload)
    }

    /// Sends a request and waits for its reply.
    ///
    /// Returns `Ok(None)` if no reply arrives within the request timeout.
    ///
    /// # Errors
    ///
    /// - [`Error::NotConnected`] if there is no open connection
    /// - [`Error::ConnectionClosed`] if the connection closes while waiting
    pub async fn blocking_request(&self, uri: &str, payload: Value) -> Result<Option<Value>> {
        let inner = &self.inner;
        let _turn = inner.bridge.begin().await;

        let (id, reply) = inner.dispatcher.send_expecting(uri, payload, &inner.bridge)?;
        inner.bridge.wait(&id, reply, inner.request_timeout).await
    }

    /// Sends a request and returns the reply payload.
    ///
    /// # Errors
    ///
    /// - [`Error::ResponseTimeout`] if no reply arrives in time
    /// - [`Error::Device`] if the TV answers with an error
    /// - any error of [`blocking_request`](Self::blocking_request)
    pub async fn call(&self, uri: &str, payload: Value) -> Result<Value> {
        let inner = &self.inner;
        let _turn = inner.bridge.begin().await;

        let (id, reply) = inner.dispatcher.send_expecting(uri, payload, &inner.bridge)?;
        let reply = inner
            .bridge
            .wait(&id, reply, inner.request_timeout)
            .await?
            .ok_or_else(|| {
                Error::response_timeout(id.clone(), inner.request_timeout.as_millis() as u64)
            })?;

        Reply::new(&reply).check()?;
        Ok(reply.get("payload").cloned().unwrap_or(Value::Null))
    }

    /// Shows a toast notification on the TV.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotConnected`] if there is no open connection.
    pub fn show_toast(&self, message: &str) -> Result<RequestId> {
        self.request(
            CREATE_TOAST,
            json!({
                "message": message,
                "iconData": "",
                "iconExtension": "",
            }),
        )
    }

    /// Closes the connection and stops the transport worker.
    ///
    /// An ephemeral key store is deleted once the client is gone.
    pub async fn close(self) {
        self.inner.transport.shutdown().await;
        self.inner.bridge.fail_pending();
        info!(device = %self.inner.device, "Client closed");
    }
}

// ============================================================================
// Client - Internal API
// ============================================================================

impl Client {
    /// Creates a client and starts its transport worker.
    ///
    /// Must be called from within a tokio runtime.
    pub(crate) fn new(
        device: Device,
        keystore: KeyStore,
        manifest: ManifestSource,
        policy: PairingPolicy,
        request_timeout: Duration,
    ) -> Self {
        let transport = Arc::new(Transport::start());
        let pairing = PairingController::new(device.address(), keystore, manifest, policy);

        debug!(
            device = %device,
            registered = pairing.is_registered(),
            key_file = %pairing.keystore().path().display(),
            "Client created"
        );

        let inner = Arc::new(ClientInner {
            device,
            dispatcher: CommandDispatcher::new(Arc::clone(&transport)),
            transport,
            bridge: ResponseBridge::new(),
            pairing,
            request_timeout,
        });

        let weak: Weak<ClientInner> = Arc::downgrade(&inner);
        inner.transport.set_event_handler(Box::new(move |event| {
            if let Some(inner) = weak.upgrade() {
                inner.handle_event(event);
            }
        }));

        Self { inner }
    }
}

impl ClientInner {
    /// Routes a transport event. Runs on the transport worker.
    fn handle_event(&self, event: TransportEvent) {
        match event {
            TransportEvent::Open => self.pairing.on_open(&self.dispatcher),
            TransportEvent::Fail(reason) => self.pairing.on_fail(&reason),
            TransportEvent::Closed => {
                debug!(device = %self.device, "Connection closed");
                self.pairing.on_closed();
                self.bridge.fail_pending();
            }
            TransportEvent::Message(text) => match serde_json::from_str::<Value>(&text) {
                Ok(message) => {
                    if self.pairing.on_message(&message) {
                        self.bridge.record(message);
                    } else {
                        self.bridge.deliver(message);
                    }
                }
                Err(e) => warn!(error = %e, "Ignoring non-JSON frame"),
            },
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
