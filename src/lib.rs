//! webOS Client - Async remote control for LG webOS TVs.
//!
//! This library talks to a TV over the SSAP (Simple Service Access
//! Protocol) WebSocket API on port 3000: it pairs with the TV, persists the
//! pairing key, and sends JSON requests to `ssap://` endpoints.
//!
//! # Architecture
//!
//! - **Transport**: one background task per client owns the WebSocket and
//!   reports open/fail/message/close events
//! - **Session**: pairing state machine, id sequencing and reply correlation
//! - **Client**: the public facade ([`Client`])
//!
//! Key design principles:
//!
//! - Requests are only honored by the TV after a successful registration on
//!   the current connection
//! - Pairing keys are stored per device address in a JSON file
//! - Blocking requests wait a bounded time and never tear down the
//!   connection on timeout
//!
//! # Quick Start
//!
//! ```no_run
//! use webos_client::{Client, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let client = Client::builder().address("192.168.1.20").build()?;
//!
//!     // First run: accept the prompt on the TV
//!     client.register_client().await?;
//!
//!     client.show_toast("Hello, World!")?;
//!
//!     client.close().await;
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`client`] | Client facade and configuration |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Envelope id type |
//! | [`keystore`] | Persistent pairing key store |
//! | [`protocol`] | SSAP message types |
//! | [`session`] | Pairing, dispatch and reply correlation (internal) |
//! | [`transport`] | WebSocket transport layer (internal) |

// ============================================================================
// Modules
// ============================================================================

/// Client facade and configuration.
///
/// Use [`Client::builder()`] to create a configured client.
pub mod client;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe envelope identifiers.
pub mod identifiers;

/// Persistent pairing key store.
pub mod keystore;

/// SSAP protocol message types.
pub mod protocol;

/// Session layer: pairing, dispatch and reply correlation.
pub mod session;

/// WebSocket transport layer.
///
/// Internal module owning the connection and its worker task.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Client types
pub use client::{Client, ClientBuilder, Device};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::RequestId;

// Key storage
pub use keystore::KeyStore;

// Protocol types
pub use protocol::ManifestSource;

// Session types
pub use session::{PairingPolicy, PairingState};
