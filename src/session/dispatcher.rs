//! Envelope construction and sending.
//!
//! Ids come from one per-client sequence starting at 0 and shared by
//! requests and pairing messages. Id allocation and queueing on the
//! transport happen under one lock, so ids leave the client in strictly
//! increasing order even with concurrent callers.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::trace;

use crate::error::Result;
use crate::identifiers::RequestId;
use crate::protocol::{EnvelopeType, HandshakeManifest, RequestEnvelope};
use crate::transport::Transport;

use super::ResponseBridge;

// ============================================================================
// CommandDispatcher
// ============================================================================

/// Builds envelopes and sends them through the transport.
pub struct CommandDispatcher {
    /// Transport the frames are queued on.
    transport: Arc<Transport>,
    /// Next sequence number; the lock also orders sends.
    sequence: Mutex<u64>,
}

impl CommandDispatcher {
    /// Creates a dispatcher whose sequence starts at 0.
    #[must_use]
    pub fn new(transport: Arc<Transport>) -> Self {
        Self {
            transport,
            sequence: Mutex::new(0),
        }
    }

    /// Builds an envelope with the next id.
    #[must_use]
    pub fn build_envelope(
        &self,
        envelope_type: EnvelopeType,
        uri: &str,
        payload: Value,
    ) -> RequestEnvelope {
        let mut sequence = self.sequence.lock();
        Self::envelope(&mut sequence, envelope_type, uri, payload)
    }

    /// Serializes an envelope and queues it on the transport.
    ///
    /// # Errors
    ///
    /// - [`Error::NotConnected`](crate::Error::NotConnected) if no socket is open
    /// - [`Error::Json`](crate::Error::Json) if serialization fails
    pub fn send(&self, envelope: &RequestEnvelope) -> Result<()> {
        let text = serde_json::to_string(envelope)?;
        self.transport.send(text)?;
        trace!(request_id = %envelope.id, uri = %envelope.uri, "Envelope sent");
        Ok(())
    }

    /// Sends a request without waiting for its reply.
    ///
    /// # Errors
    ///
    /// Returns an error if the envelope cannot be queued.
    pub fn fire_and_forget(&self, uri: &str, payload: Value) -> Result<RequestId> {
        let mut sequence = self.sequence.lock();
        let envelope = Self::envelope(&mut sequence, EnvelopeType::Request, uri, payload);
        self.send(&envelope)?;
        Ok(envelope.id)
    }

    /// Sends a request after registering interest in its reply.
    ///
    /// # Errors
    ///
    /// Returns an error if the envelope cannot be queued; the registration
    /// is withdrawn in that case.
    pub fn send_expecting(
        &self,
        uri: &str,
        payload: Value,
        bridge: &ResponseBridge,
    ) -> Result<(RequestId, oneshot::Receiver<Value>)> {
        let mut sequence = self.sequence.lock();
        let envelope = Self::envelope(&mut sequence, EnvelopeType::Request, uri, payload);
        let reply = bridge.expect(envelope.id.clone());

        if let Err(e) = self.send(&envelope) {
            bridge.forget(&envelope.id);
            return Err(e);
        }

        Ok((envelope.id, reply))
    }

    /// Sends a handshake manifest carrying `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the message cannot be queued.
    pub fn send_register(&self, manifest: HandshakeManifest, key: &str) -> Result<RequestId> {
        let mut sequence = self.sequence.lock();
        let id = Self::next_id(&mut sequence, EnvelopeType::Register);
        let text = serde_json::to_string(&manifest.into_envelope(&id, key))?;
        self.transport.send(text)?;
        trace!(request_id = %id, "Register message sent");
        Ok(id)
    }

    /// Returns the sequence number the next envelope will use.
    #[must_use]
    pub fn next_sequence(&self) -> u64 {
        *self.sequence.lock()
    }

    fn envelope(
        sequence: &mut u64,
        envelope_type: EnvelopeType,
        uri: &str,
        payload: Value,
    ) -> RequestEnvelope {
        let id = Self::next_id(sequence, envelope_type);
        RequestEnvelope::new(id, envelope_type, uri, payload)
    }

    fn next_id(sequence: &mut u64, envelope_type: EnvelopeType) -> RequestId {
        let id = RequestId::new(envelope_type.as_str(), *sequence);
        *sequence += 1;
        id
    }
}

// ============================================================================
// Tests
// ============================================================================
