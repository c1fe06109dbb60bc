//! Error types for the webOS client.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use webos_client::{Client, Result};
//!
//! async fn example(client: &Client) -> Result<()> {
//!     client.register_client().await?;
//!     client.request("audio/volumeUp", serde_json::json!({}))?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`] |
//! | Connection | [`Error::Connection`], [`Error::NotConnected`], [`Error::ConnectionClosed`] |
//! | Pairing | [`Error::PairingFailed`] |
//! | Protocol | [`Error::Protocol`], [`Error::Device`] |
//! | Execution | [`Error::ResponseTimeout`] |
//! | External | [`Error::Io`], [`Error::Json`], [`Error::WebSocket`] |

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::result::Result as StdResult;

use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::identifiers::RequestId;

// ============================================================================
// Constants
// ============================================================================

/// Stable code carried by [`Error::PairingFailed`].
pub const PAIRING_FAILED_CODE: &str = "pairing-failed";

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when client configuration is invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// WebSocket connection failed.
    ///
    /// Returned when the TV cannot be reached or the upgrade is refused.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// No open connection to send on.
    #[error("Not connected")]
    NotConnected,

    /// WebSocket connection closed unexpectedly.
    ///
    /// Returned when the connection is lost while a reply is awaited.
    #[error("Connection closed")]
    ConnectionClosed,

    // ========================================================================
    // Pairing Errors
    // ========================================================================
    /// Pairing retries exhausted without the TV accepting the client.
    #[error("Pairing failed ({code}): {message}")]
    PairingFailed {
        /// Stable machine-readable code.
        code: &'static str,
        /// Human-readable description.
        message: String,
    },

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// Protocol violation or malformed message.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    /// The TV answered a request with an error reply.
    #[error("Device error: {message}")]
    Device {
        /// Error text reported by the TV.
        message: String,
    },

    // ========================================================================
    // Execution Errors
    // ========================================================================
    /// No reply arrived for a request within the timeout.
    #[error("Request {request_id} timed out after {timeout_ms}ms")]
    ResponseTimeout {
        /// The request ID that timed out.
        request_id: RequestId,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a pairing failure with the stable `pairing-failed` code.
    #[inline]
    pub fn pairing_failed(message: impl Into<String>) -> Self {
        Self::PairingFailed {
            code: PAIRING_FAILED_CODE,
            message: message.into(),
        }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates a device error.
    #[inline]
    pub fn device(message: impl Into<String>) -> Self {
        Self::Device {
            message: message.into(),
        }
    }

    /// Creates a response timeout error.
    #[inline]
    pub fn response_timeout(request_id: RequestId, timeout_ms: u64) -> Self {
        Self::ResponseTimeout {
            request_id,
            timeout_ms,
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns a stable code identifying the error kind.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Config { .. } => "config",
            Self::Connection { .. } => "connect-error",
            Self::NotConnected => "not-connected",
            Self::ConnectionClosed => "connection-closed",
            Self::PairingFailed { code, .. } => code,
            Self::Protocol { .. } => "protocol",
            Self::Device { .. } => "device-error",
            Self::ResponseTimeout { .. } => "response-timeout",
            Self::Io(_) => "io-error",
            Self::Json(_) => "json-error",
            Self::WebSocket(_) => "websocket-error",
        }
    }

    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::ResponseTimeout { .. })
    }

    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. }
                | Self::NotConnected
                | Self::ConnectionClosed
                | Self::WebSocket(_)
        )
    }

    /// Returns `true` if this error is recoverable.
    ///
    /// Recoverable errors may succeed on retry.
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. } | Self::ConnectionClosed | Self::ResponseTimeout { .. }
        )
    }
}

// ============================================================================
// Tests
// ============================================================================
