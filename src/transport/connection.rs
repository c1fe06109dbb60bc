//! WebSocket connection and worker task.
//!
//! This module handles the WebSocket connection to the TV.
//!
//! # Worker
//!
//! [`Transport::start`] spawns one tokio task for the lifetime of the
//! client. The task handles:
//!
//! - Connect requests (replacing any open socket; a request made while a
//!   connect is in flight joins that connect)
//! - Outgoing text frames queued by [`Transport::send`]
//! - Incoming frames, reported as [`TransportEvent::Message`]
//! - Lifecycle events (`Open`, `Fail`, `Closed`) for the event handler
//!
//! Events are delivered on the worker task, never synchronously with the
//! call that caused them.

// ============================================================================
// Imports
// ============================================================================

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, trace, warn};

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Timeout for establishing the TCP connection and WebSocket upgrade.
pub(crate) const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// Types
// ============================================================================

/// WebSocket stream to the TV.
type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Write half of the socket.
type WsWrite = SplitSink<WsStream, Message>;

/// Read half of the socket.
type WsRead = SplitStream<WsStream>;

/// Connect running alongside the worker loop, yielding the URL and outcome.
type PendingConnect = Pin<Box<dyn Future<Output = (String, Result<WsStream>)> + Send>>;

/// Event handler callback type.
///
/// Called on the worker task for every [`TransportEvent`].
/// Must not block and must not call [`Transport::set_event_handler`].
pub type EventHandler = Box<dyn Fn(TransportEvent) + Send + Sync>;

// ============================================================================
// TransportEvent
// ============================================================================

/// Lifecycle and data events reported by the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The socket is open and frames can be sent.
    Open,
    /// A connect request failed.
    Fail(String),
    /// A text frame arrived.
    Message(String),
    /// The open socket was closed, locally or by the TV.
    Closed,
}

// ============================================================================
// TransportCommand
// ============================================================================

/// Internal commands for the worker.
enum TransportCommand {
    /// Open a socket to the URL, replacing the current one.
    Connect(String),
    /// Send a text frame on the open socket.
    Send(String),
    /// Close the socket but keep the worker running.
    Disconnect,
    /// Close the socket and stop the worker.
    Shutdown,
}

// ============================================================================
// Transport
// ============================================================================

/// Owner of the WebSocket connection to the TV.
///
/// # Thread Safety
///
/// `Transport` is `Send + Sync`. Sending only queues work for the worker, so
/// it is safe to call from any task, including from inside the event handler.
pub struct Transport {
    /// Channel for sending commands to the worker.
    command_tx: mpsc::UnboundedSender<TransportCommand>,
    /// Event handler (shared with the worker).
    event_handler: Arc<Mutex<Option<EventHandler>>>,
    /// Whether a socket is currently open (written by the worker).
    open: Arc<AtomicBool>,
    /// Whether a connect is queued or in flight.
    connecting: Arc<AtomicBool>,
    /// Worker task handle, taken on shutdown.
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Transport {
    /// Spawns the worker task.
    ///
    /// Must be called from within a tokio runtime.
    pub(crate) fn start() -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let event_handler: Arc<Mutex<Option<EventHandler>>> = Arc::new(Mutex::new(None));
        let open = Arc::new(AtomicBool::new(false));
        let connecting = Arc::new(AtomicBool::new(false));

        let worker = tokio::spawn(Self::run_worker(
            command_rx,
            Arc::clone(&event_handler),
            Arc::clone(&open),
            Arc::clone(&connecting),
        ));

        debug!("Transport worker started");

        Self {
            command_tx,
            event_handler,
            open,
            connecting,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Sets the event handler callback.
    pub fn set_event_handler(&self, handler: EventHandler) {
        let mut guard = self.event_handler.lock();
        *guard = Some(handler);
    }

    /// Clears the event handler.
    pub fn clear_event_handler(&self) {
        let mut guard = self.event_handler.lock();
        *guard = None;
    }

    /// Returns `true` if a socket is open.
    #[inline]
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Returns `true` while a connect is queued or in flight.
    ///
    /// Cleared before the matching [`TransportEvent::Open`] or
    /// [`TransportEvent::Fail`] is delivered.
    #[inline]
    #[must_use]
    pub fn is_connecting(&self) -> bool {
        self.connecting.load(Ordering::Acquire)
    }

    /// Asks the worker to open a socket to `url`.
    ///
    /// Returns once the request is queued; the outcome is reported later as
    /// [`TransportEvent::Open`] or [`TransportEvent::Fail`]. An open socket
    /// is closed first and reported as [`TransportEvent::Closed`]. While a
    /// connect is in flight, further requests join it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] if the worker has stopped.
    pub fn connect(&self, url: &str) -> Result<()> {
        debug!(url, "Connect requested");
        self.connecting.store(true, Ordering::Release);
        self.command_tx
            .send(TransportCommand::Connect(url.to_string()))
            .map_err(|_| {
                self.connecting.store(false, Ordering::Release);
                Error::ConnectionClosed
            })
    }

    /// Queues a text frame on the open socket.
    ///
    /// # Errors
    ///
    /// - [`Error::NotConnected`] if no socket is open
    /// - [`Error::ConnectionClosed`] if the worker has stopped
    pub fn send(&self, text: String) -> Result<()> {
        if !self.is_open() {
            return Err(Error::NotConnected);
        }

        self.command_tx
            .send(TransportCommand::Send(text))
            .map_err(|_| Error::ConnectionClosed)
    }

    /// Closes the open socket, keeping the worker alive for reconnects.
    ///
    /// A connect in flight is abandoned and reported as
    /// [`TransportEvent::Fail`].
    pub fn disconnect(&self) {
        let _ = self.command_tx.send(TransportCommand::Disconnect);
    }

    /// Closes the socket and waits for the worker to finish.
    ///
    /// Safe to call more than once.
    pub async fn shutdown(&self) {
        let _ = self.command_tx.send(TransportCommand::Shutdown);

        let worker = self.worker.lock().take();
        if let Some(worker) = worker
            && let Err(e) = worker.await
        {
            warn!(error = %e, "Transport worker ended abnormally");
        }

        self.clear_event_handler();
        debug!("Transport worker joined");
    }

    /// Worker loop that owns the socket.
    async fn run_worker(
        mut command_rx: mpsc::UnboundedReceiver<TransportCommand>,
        event_handler: Arc<Mutex<Option<EventHandler>>>,
        open: Arc<AtomicBool>,
        connecting: Arc<AtomicBool>,
    ) {
        let mut writer: Option<WsWrite> = None;
        let mut reader: Option<WsRead> = None;
        let mut pending: Option<PendingConnect> = None;

        loop {
            tokio::select! {
                // Connect in flight
                (url, outcome) = Self::connect_outcome(&mut pending) => {
                    pending = None;
                    connecting.store(false, Ordering::Release);

                    match outcome {
                        Ok(stream) => {
                            let (write, read) = stream.split();
                            writer = Some(write);
                            reader = Some(read);
                            open.store(true, Ordering::Release);
                            info!(url = %url, "WebSocket connection established");
                            Self::emit(&event_handler, TransportEvent::Open);
                        }
                        Err(e) => {
                            warn!(url = %url, error = %e, "Failed to connect to TV");
                            Self::emit(&event_handler, TransportEvent::Fail(e.to_string()));
                        }
                    }
                }

                // Incoming frames from the TV
                frame = Self::next_frame(&mut reader) => {
                    match frame {
                        Some(Ok(Message::Text(text))) => {
                            trace!(len = text.len(), "Frame received");
                            Self::emit(&event_handler, TransportEvent::Message(text.as_str().to_owned()));
                        }

                        Some(Ok(Message::Close(_))) => {
                            debug!("WebSocket closed by remote");
                            Self::drop_socket(&mut writer, &mut reader, &open);
                            Self::emit(&event_handler, TransportEvent::Closed);
                        }

                        Some(Err(e)) => {
                            warn!(error = %e, "WebSocket error");
                            Self::drop_socket(&mut writer, &mut reader, &open);
                            Self::emit(&event_handler, TransportEvent::Closed);
                        }

                        None => {
                            debug!("WebSocket stream ended");
                            Self::drop_socket(&mut writer, &mut reader, &open);
                            Self::emit(&event_handler, TransportEvent::Closed);
                        }

                        // Ignore Binary, Ping, Pong
                        _ => {}
                    }
                }

                // Commands from the client
                command = command_rx.recv() => {
                    match command {
                        Some(TransportCommand::Connect(url)) => {
                            if pending.is_some() {
                                debug!(url = %url, "Connect already in flight");
                            } else {
                                if writer.is_some() {
                                    debug!("Replacing open socket");
                                    Self::close_socket(&mut writer, &mut reader, &open).await;
                                    Self::emit(&event_handler, TransportEvent::Closed);
                                }

                                connecting.store(true, Ordering::Release);
                                pending = Some(Box::pin(async move {
                                    let outcome = Self::open_socket(&url).await;
                                    (url, outcome)
                                }));
                            }
                        }

                        Some(TransportCommand::Send(text)) => {
                            let sent = match writer.as_mut() {
                                Some(write) => write.send(Message::Text(text.into())).await,
                                None => {
                                    warn!("Dropping frame, socket not open");
                                    Ok(())
                                }
                            };

                            if let Err(e) = sent {
                                warn!(error = %e, "Failed to send frame");
                                Self::drop_socket(&mut writer, &mut reader, &open);
                                Self::emit(&event_handler, TransportEvent::Closed);
                            }
                        }

                        Some(TransportCommand::Disconnect) => {
                            if pending.take().is_some() {
                                connecting.store(false, Ordering::Release);
                                debug!("Connect abandoned");
                                Self::emit(&event_handler, TransportEvent::Fail("connect cancelled".to_string()));
                            }
                            if writer.is_some() {
                                Self::close_socket(&mut writer, &mut reader, &open).await;
                                Self::emit(&event_handler, TransportEvent::Closed);
                            }
                        }

                        Some(TransportCommand::Shutdown) => {
                            debug!("Shutdown command received");
                            connecting.store(false, Ordering::Release);
                            Self::close_socket(&mut writer, &mut reader, &open).await;
                            break;
                        }

                        None => {
                            debug!("Command channel closed");
                            Self::close_socket(&mut writer, &mut reader, &open).await;
                            break;
                        }
                    }
                }
            }
        }

        debug!("Transport worker terminated");
    }

    /// Connects with a bounded wait.
    async fn open_socket(url: &str) -> Result<WsStream> {
        match timeout(CONNECT_TIMEOUT, connect_async(url)).await {
            Ok(Ok((stream, _response))) => Ok(stream),
            Ok(Err(e)) => Err(Self::connect_error(e)),
            Err(_) => Err(Error::connection(format!(
                "timed out after {}ms",
                CONNECT_TIMEOUT.as_millis()
            ))),
        }
    }

    /// Maps a handshake error to [`Error::Connection`].
    fn connect_error(e: WsError) -> Error {
        Error::connection(e.to_string())
    }

    /// Completes the connect in flight, or waits forever when there is none.
    async fn connect_outcome(pending: &mut Option<PendingConnect>) -> (String, Result<WsStream>) {
        match pending {
            Some(connect) => connect.as_mut().await,
            None => std::future::pending().await,
        }
    }

    /// Reads the next frame, or waits forever when no socket is open.
    async fn next_frame(reader: &mut Option<WsRead>) -> Option<std::result::Result<Message, WsError>> {
        match reader {
            Some(read) => read.next().await,
            None => std::future::pending().await,
        }
    }

    /// Sends a close frame and forgets the socket.
    async fn close_socket(
        writer: &mut Option<WsWrite>,
        reader: &mut Option<WsRead>,
        open: &AtomicBool,
    ) {
        if let Some(mut write) = writer.take() {
            let _ = write.close().await;
        }
        *reader = None;
        open.store(false, Ordering::Release);
    }

    /// Forgets a socket that is already dead.
    fn drop_socket(writer: &mut Option<WsWrite>, reader: &mut Option<WsRead>, open: &AtomicBool) {
        *writer = None;
        *reader = None;
        open.store(false, Ordering::Release);
    }

    /// Delivers an event to the handler, if one is set.
    fn emit(event_handler: &Mutex<Option<EventHandler>>, event: TransportEvent) {
        let handler = event_handler.lock();
        if let Some(ref handler) = *handler {
            handler(event);
        }
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        // Never leak the worker when the owner skipped shutdown()
        if let Some(worker) = self.worker.get_mut().take() {
            worker.abort();
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::sync::mpsc::UnboundedReceiver;
    use tokio::time::sleep;

    use crate::transport::mock::{MockDevice, unused_port};

    fn recording_transport() -> (Transport, UnboundedReceiver<TransportEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let transport = Transport::start();
        transport.set_event_handler(Box::new(move |event| {
            let _ = tx.send(event);
        }));
        (transport, rx)
    }

    async fn next_event(rx: &mut UnboundedReceiver<TransportEvent>) -> TransportEvent {
        timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("event in time")
            .expect("channel open")
    }

    #[test]
    fn test_constants() {
        assert_eq!(CONNECT_TIMEOUT.as_secs(), 5);
    }

    #[tokio::test]
    async fn test_send_before_open_is_rejected() {
        let transport = Transport::start();
        assert!(!transport.is_open());
        assert!(matches!(
            transport.send("{}".to_string()),
            Err(Error::NotConnected)
        ));
        transport.shutdown().await;
    }

    #[tokio::test]
    async fn test_connect_refused_reports_fail() {
        let (transport, mut rx) = recording_transport();
        let port = unused_port().await;

        transport
            .connect(&format!("ws://127.0.0.1:{port}"))
            .expect("queued");

        assert!(matches!(next_event(&mut rx).await, TransportEvent::Fail(_)));
        assert!(!transport.is_open());
        transport.shutdown().await;
    }

    #[tokio::test]
    async fn test_open_send_and_receive() {
        let device = MockDevice::start(|msg| vec![serde_json::json!({"echo": msg["id"]})]).await;
        let (transport, mut rx) = recording_transport();

        transport.connect(&device.url()).expect("queued");
        assert_eq!(next_event(&mut rx).await, TransportEvent::Open);
        assert!(transport.is_open());

        transport
            .send(r#"{"id":"request_0"}"#.to_string())
            .expect("send");

        match next_event(&mut rx).await {
            TransportEvent::Message(text) => assert_eq!(text, r#"{"echo":"request_0"}"#),
            other => panic!("unexpected event: {other:?}"),
        }

        transport.shutdown().await;
        assert!(!transport.is_open());
    }

    #[tokio::test]
    async fn test_disconnect_reports_closed() {
        let device = MockDevice::start(|_| Vec::new()).await;
        let (transport, mut rx) = recording_transport();

        transport.connect(&device.url()).expect("queued");
        assert_eq!(next_event(&mut rx).await, TransportEvent::Open);

        transport.disconnect();
        assert_eq!(next_event(&mut rx).await, TransportEvent::Closed);
        assert!(!transport.is_open());

        transport.shutdown().await;
    }

    #[tokio::test]
    async fn test_reconnect_replaces_socket() {
        let device = MockDevice::start(|_| Vec::new()).await;
        let (transport, mut rx) = recording_transport();

        transport.connect(&device.url()).expect("queued");
        assert_eq!(next_event(&mut rx).await, TransportEvent::Open);

        transport.connect(&device.url()).expect("queued");
        assert_eq!(next_event(&mut rx).await, TransportEvent::Closed);
        assert_eq!(next_event(&mut rx).await, TransportEvent::Open);
        assert!(transport.is_open());
        assert_eq!(device.connection_count(), 2);

        transport.shutdown().await;
    }

    #[tokio::test]
    async fn test_connect_while_connecting_joins_in_flight_connect() {
        let device =
            MockDevice::with_upgrade_delay(Duration::from_millis(300), |_| Vec::new()).await;
        let (transport, mut rx) = recording_transport();

        transport.connect(&device.url()).expect("queued");
        assert!(transport.is_connecting());
        sleep(Duration::from_millis(50)).await;
        transport.connect(&device.url()).expect("queued");
        transport.connect(&device.url()).expect("queued");

        assert_eq!(next_event(&mut rx).await, TransportEvent::Open);
        assert!(!transport.is_connecting());

        // No further events: the socket stays up
        assert!(timeout(Duration::from_millis(200), rx.recv()).await.is_err());
        assert!(transport.is_open());
        assert_eq!(device.connection_count(), 1);

        transport.shutdown().await;
    }

    #[tokio::test]
    async fn test_slow_connect_does_not_block_worker() {
        let device =
            MockDevice::with_upgrade_delay(Duration::from_secs(3), |_| Vec::new()).await;
        let (transport, mut rx) = recording_transport();

        transport.connect(&device.url()).expect("queued");
        sleep(Duration::from_millis(50)).await;

        let started = tokio::time::Instant::now();
        transport.disconnect();
        assert!(matches!(next_event(&mut rx).await, TransportEvent::Fail(_)));
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(!transport.is_connecting());
        assert!(!transport.is_open());

        transport.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let transport = Transport::start();
        transport.shutdown().await;
        transport.shutdown().await;

        assert!(matches!(
            transport.connect("ws://127.0.0.1:1"),
            Err(Error::ConnectionClosed)
        ));
    }
}
