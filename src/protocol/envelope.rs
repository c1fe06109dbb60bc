//! Outbound request envelope.
//!
//! Every command sent to the TV is wrapped in the same envelope:
//!
//! ```json
//! {
//!   "id": "request_3",
//!   "type": "request",
//!   "uri": "ssap://audio/volumeUp",
//!   "payload": {}
//! }
//! ```

// ============================================================================
// Imports
// ============================================================================

use serde::Serialize;
use serde_json::Value;

use crate::identifiers::RequestId;

// ============================================================================
// Constants
// ============================================================================

/// URI scheme prefix for SSAP endpoints.
pub const SSAP_SCHEME: &str = "ssap://";

// ============================================================================
// EnvelopeType
// ============================================================================

/// Envelope type discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvelopeType {
    /// Command request.
    Request,
    /// Pairing request.
    Register,
}

impl EnvelopeType {
    /// Returns the wire name, also used as the id prefix.
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Request => "request",
            Self::Register => "register",
        }
    }
}

// ============================================================================
// RequestEnvelope
// ============================================================================

/// A command envelope from client to TV.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestEnvelope {
    /// Correlation id, `<type>_<sequence>`.
    pub id: RequestId,

    /// Envelope type.
    #[serde(rename = "type")]
    pub envelope_type: EnvelopeType,

    /// Endpoint URI including the `ssap://` scheme.
    pub uri: String,

    /// Command arguments, copied verbatim.
    pub payload: Value,
}

impl RequestEnvelope {
    /// Creates an envelope, prefixing `uri` with the SSAP scheme.
    #[must_use]
    pub fn new(id: RequestId, envelope_type: EnvelopeType, uri: &str, payload: Value) -> Self {
        Self {
            id,
            envelope_type,
            uri: ssap_uri(uri),
            payload,
        }
    }
}

/// Prefixes an endpoint with `ssap://` unless it already carries the scheme.
#[must_use]
pub fn ssap_uri(endpoint: &str) -> String {
    if endpoint.starts_with(SSAP_SCHEME) {
        endpoint.to_string()
    } else {
        format!("{SSAP_SCHEME}{endpoint}")
    }
}

// ============================================================================
// Tests
// ============================================================================
