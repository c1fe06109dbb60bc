//! Inbound reply accessors.
//!
//! Replies are arbitrary JSON. The fields this client relies on are:
//!
//! Success:
//! ```json
//! { "id": "request_3", "type": "response", "payload": { "returnValue": true } }
//! ```
//!
//! Pairing accepted:
//! ```json
//! { "id": "register_0", "type": "registered", "payload": { "client-key": "..." } }
//! ```
//!
//! Error:
//! ```json
//! { "id": "request_4", "type": "error", "error": "404 no such service or method" }
//! ```

// ============================================================================
// Imports
// ============================================================================

use serde_json::Value;

use crate::error::{Error, Result};
use crate::identifiers::RequestId;

use super::manifest::CLIENT_KEY_FIELD;

// ============================================================================
// Constants
// ============================================================================

/// Reply type that marks pairing success.
const REGISTERED: &str = "registered";

/// Reply type that marks a failed request.
const ERROR: &str = "error";

// ============================================================================
// Reply
// ============================================================================

/// Borrowed view over an inbound message.
#[derive(Debug, Clone, Copy)]
pub struct Reply<'a> {
    value: &'a Value,
}

impl<'a> Reply<'a> {
    /// Wraps an inbound JSON value.
    #[inline]
    #[must_use]
    pub fn new(value: &'a Value) -> Self {
        Self { value }
    }

    /// Returns the `type` field, if present.
    #[inline]
    #[must_use]
    pub fn kind(&self) -> Option<&'a str> {
        self.value.get("type").and_then(Value::as_str)
    }

    /// Returns the echoed request id, if present.
    #[inline]
    #[must_use]
    pub fn id(&self) -> Option<RequestId> {
        self.value
            .get("id")
            .and_then(Value::as_str)
            .map(RequestId::from_wire)
    }

    /// Returns the `payload` field, if present.
    #[inline]
    #[must_use]
    pub fn payload(&self) -> Option<&'a Value> {
        self.value.get("payload")
    }

    /// Returns `true` if this reply reports pairing success.
    #[inline]
    #[must_use]
    pub fn is_registered(&self) -> bool {
        self.kind() == Some(REGISTERED)
    }

    /// Returns the non-empty `payload["client-key"]`, if present.
    #[must_use]
    pub fn client_key(&self) -> Option<&'a str> {
        self.payload()
            .and_then(|p| p.get(CLIENT_KEY_FIELD))
            .and_then(Value::as_str)
            .filter(|key| !key.is_empty())
    }

    /// Returns `true` if this reply reports a failed request.
    #[inline]
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.kind() == Some(ERROR)
    }

    /// Returns the error text of an error reply.
    #[must_use]
    pub fn error_message(&self) -> Option<&'a str> {
        self.value.get("error").and_then(Value::as_str)
    }

    /// Converts an error reply into [`Error::Device`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Device`] if the reply has `type == "error"`.
    pub fn check(&self) -> Result<()> {
        if self.is_error() {
            let message = self.error_message().unwrap_or("unknown error");
            return Err(Error::device(message));
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
