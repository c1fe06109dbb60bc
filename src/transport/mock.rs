//! Scripted TV for tests.
//!
//! Binds a WebSocket server on `127.0.0.1:0`, records every JSON message it
//! receives and answers through a responder closure.

// ============================================================================
// Imports
// ============================================================================

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_tungstenite::tungstenite::Message;

// ============================================================================
// Types
// ============================================================================

/// Maps one received message to the replies sent back.
pub(crate) type Responder = Arc<dyn Fn(&Value) -> Vec<Value> + Send + Sync>;

// ============================================================================
// MockDevice
// ============================================================================

/// In-process stand-in for a TV.
pub(crate) struct MockDevice {
    port: u16,
    received: Arc<Mutex<Vec<Value>>>,
    connections: Arc<AtomicUsize>,
    accept_task: JoinHandle<()>,
}

impl MockDevice {
    /// Starts a device that answers with `responder`.
    pub(crate) async fn start<F>(responder: F) -> Self
    where
        F: Fn(&Value) -> Vec<Value> + Send + Sync + 'static,
    {
        Self::with_upgrade_delay(Duration::ZERO, responder).await
    }

    /// Starts a device that holds every WebSocket upgrade for `delay`.
    ///
    /// TCP connections are accepted (and counted) at once.
    pub(crate) async fn with_upgrade_delay<F>(delay: Duration, responder: F) -> Self
    where
        F: Fn(&Value) -> Vec<Value> + Send + Sync + 'static,
    {
        let listener = TcpListener::bind(SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0))
            .await
            .expect("bind mock device");
        let port = listener.local_addr().expect("local addr").port();

        let received = Arc::new(Mutex::new(Vec::new()));
        let connections = Arc::new(AtomicUsize::new(0));
        let responder: Responder = Arc::new(responder);

        let accept_task = tokio::spawn(Self::accept_loop(
            listener,
            delay,
            responder,
            Arc::clone(&received),
            Arc::clone(&connections),
        ));

        Self {
            port,
            received,
            connections,
            accept_task,
        }
    }

    /// A TV that accepts pairing with `key` and answers every request.
    ///
    /// Replies echo the request id and carry the request URI.
    pub(crate) async fn pairing(key: &'static str) -> Self {
        Self::start(move |msg| match msg["type"].as_str() {
            Some("register") => vec![registered(msg, key)],
            Some("request") => vec![json!({
                "id": msg["id"],
                "type": "response",
                "payload": {"returnValue": true, "uri": msg["uri"]}
            })],
            _ => Vec::new(),
        })
        .await
    }

    /// A TV that accepts pairing but never answers requests.
    pub(crate) async fn silent(key: &'static str) -> Self {
        Self::start(move |msg| match msg["type"].as_str() {
            Some("register") => vec![registered(msg, key)],
            _ => Vec::new(),
        })
        .await
    }

    /// Returns the bound port.
    pub(crate) fn port(&self) -> u16 {
        self.port
    }

    /// Returns the WebSocket URL of the device.
    pub(crate) fn url(&self) -> String {
        format!("ws://127.0.0.1:{}", self.port)
    }

    /// Returns every message received so far.
    pub(crate) fn received(&self) -> Vec<Value> {
        self.received.lock().clone()
    }

    /// Returns the number of accepted TCP connections.
    pub(crate) fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    async fn accept_loop(
        listener: TcpListener,
        delay: Duration,
        responder: Responder,
        received: Arc<Mutex<Vec<Value>>>,
        connections: Arc<AtomicUsize>,
    ) {
        while let Ok((stream, _addr)) = listener.accept().await {
            connections.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(Self::serve(
                stream,
                delay,
                Arc::clone(&responder),
                Arc::clone(&received),
            ));
        }
    }

    async fn serve(
        stream: TcpStream,
        delay: Duration,
        responder: Responder,
        received: Arc<Mutex<Vec<Value>>>,
    ) {
        if !delay.is_zero() {
            sleep(delay).await;
        }
        let Ok(ws) = tokio_tungstenite::accept_async(stream).await else {
            return;
        };
        let (mut write, mut read) = ws.split();

        while let Some(Ok(frame)) = read.next().await {
            let Message::Text(text) = frame else {
                continue;
            };
            let Ok(msg) = serde_json::from_str::<Value>(text.as_str()) else {
                continue;
            };

            received.lock().push(msg.clone());

            for reply in responder(&msg) {
                if write.send(Message::Text(reply.to_string().into())).await.is_err() {
                    return;
                }
            }
        }
    }
}

impl Drop for MockDevice {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

/// Builds the pairing acceptance for a register message.
pub(crate) fn registered(msg: &Value, key: &str) -> Value {
    json!({
        "id": msg["id"],
        "type": "registered",
        "payload": {"client-key": key}
    })
}

/// Returns a localhost port with nothing listening on it.
pub(crate) async fn unused_port() -> u16 {
    let listener = TcpListener::bind(SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0))
        .await
        .expect("bind probe");
    listener.local_addr().expect("local addr").port()
}
