//! Reply correlation and waiting.
//!
//! The TV does not reliably echo request ids, so correlation works in two
//! tiers:
//!
//! 1. A reply whose `id` matches a pending request completes that request.
//! 2. A reply without an `id` completes the one blocking call in flight.
//!
//! Blocking calls take a turn (an async mutex) around the whole
//! clear → send → wait → read sequence, so at most one is in flight and the
//! second tier is unambiguous. Replies whose `id` matches nothing (answers
//! to fire-and-forget requests, notifications) wake nobody.
//!
//! Every inbound message is also kept in a "last response" slot. The slot
//! and the pending map share one lock, so a message is recorded and routed
//! in one step.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tokio::sync::{Mutex as AsyncMutex, MutexGuard as AsyncMutexGuard, oneshot};
use tokio::time::timeout;
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::RequestId;
use crate::protocol::Reply;

// ============================================================================
// Types
// ============================================================================

/// Map of request ids to completion handles.
type PendingMap = FxHashMap<RequestId, oneshot::Sender<Value>>;

/// Exclusive right to run one blocking call.
pub type BridgeTurn<'a> = AsyncMutexGuard<'a, ()>;

/// State guarded by the bridge lock.
#[derive(Debug, Default)]
struct Slots {
    /// Completion handles of in-flight blocking calls.
    pending: PendingMap,
    /// Most recent inbound message.
    last_response: Option<Value>,
}

// ============================================================================
// ResponseBridge
// ============================================================================

/// Hands inbound replies to callers awaiting them.
#[derive(Debug, Default)]
pub struct ResponseBridge {
    /// Pending calls and the last response.
    slots: Mutex<Slots>,
    /// Serializes blocking calls.
    turn: AsyncMutex<()>,
}

impl ResponseBridge {
    /// Creates an empty bridge.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for the exclusive right to run a blocking call.
    pub async fn begin(&self) -> BridgeTurn<'_> {
        self.turn.lock().await
    }

    /// Clears the slot and registers interest in the reply to `id`.
    ///
    /// Must be called before the request is sent.
    pub fn expect(&self, id: RequestId) -> oneshot::Receiver<Value> {
        let (tx, rx) = oneshot::channel();
        let mut slots = self.slots.lock();
        slots.last_response = None;
        slots.pending.insert(id, tx);
        rx
    }

    /// Drops interest in the reply to `id`.
    pub fn forget(&self, id: &RequestId) {
        self.slots.lock().pending.remove(id);
    }

    /// Waits up to `limit` for the reply registered with [`expect`](Self::expect).
    ///
    /// Returns `Ok(None)` on timeout; the connection stays up.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] if the connection closed first.
    pub async fn wait(
        &self,
        id: &RequestId,
        reply: oneshot::Receiver<Value>,
        limit: Duration,
    ) -> Result<Option<Value>> {
        match timeout(limit, reply).await {
            Ok(Ok(value)) => Ok(Some(value)),
            Ok(Err(_)) => Err(Error::ConnectionClosed),
            Err(_) => {
                self.forget(id);
                debug!(
                    request_id = %id,
                    timeout_ms = limit.as_millis() as u64,
                    "No reply within timeout"
                );
                Ok(None)
            }
        }
    }

    /// Routes an inbound message to its waiter and stores it in the slot.
    ///
    /// Called on the transport worker.
    pub fn deliver(&self, value: Value) {
        let tx = {
            let mut slots = self.slots.lock();
            slots.last_response = Some(value.clone());

            let pending = &mut slots.pending;
            match Reply::new(&value).id() {
                Some(id) => pending.remove(&id),
                None if pending.len() == 1 => pending.drain().next().map(|(_, tx)| tx),
                None => None,
            }
        };

        match tx {
            Some(tx) => {
                if tx.send(value).is_err() {
                    debug!("Waiter gone before reply arrived");
                }
            }
            None => trace!("Unsolicited message"),
        }
    }

    /// Stores a message in the slot without waking anyone.
    pub fn record(&self, value: Value) {
        self.slots.lock().last_response = Some(value);
    }

    /// Returns a copy of the most recent inbound message.
    #[must_use]
    pub fn last_response(&self) -> Option<Value> {
        self.slots.lock().last_response.clone()
    }

    /// Returns the number of calls awaiting a reply.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.slots.lock().pending.len()
    }

    /// Fails every waiting call with [`Error::ConnectionClosed`].
    pub fn fail_pending(&self) {
        let count = {
            let mut slots = self.slots.lock();
            let count = slots.pending.len();
            slots.pending.clear();
            count
        };

        if count > 0 {
            warn!(count, "Failed pending requests on close");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
