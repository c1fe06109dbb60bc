//! Type-safe identifiers.
//!
//! Envelope ids have the form `<type>_<sequence>`, e.g. `request_4` or
//! `register_0`. The sequence is per client and shared by every envelope
//! type, so ids are unique and strictly increasing in send order.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::{Deserialize, Serialize};

// ============================================================================
// RequestId
// ============================================================================

/// Correlation id of an outbound envelope.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    /// Creates an id from an envelope type and its sequence number.
    #[inline]
    #[must_use]
    pub fn new(kind: &str, sequence: u64) -> Self {
        Self(format!("{kind}_{sequence}"))
    }

    /// Wraps an id received on the wire.
    #[inline]
    #[must_use]
    pub fn from_wire(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the sequence number, if the id follows `<type>_<sequence>`.
    #[must_use]
    pub fn sequence(&self) -> Option<u64> {
        self.0.rsplit_once('_').and_then(|(_, seq)| seq.parse().ok())
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Tests
// ============================================================================
