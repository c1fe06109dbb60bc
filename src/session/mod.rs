//! Session layer between the client facade and the transport.
//!
//! # Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`PairingController`] | Registration handshake and pairing state machine |
//! | [`CommandDispatcher`] | Envelope construction, id sequencing and sending |
//! | [`ResponseBridge`] | Turns asynchronous replies into awaitable results |
//!
//! # Data Flow
//!
//! ```text
//! caller ──► CommandDispatcher ──► Transport ──► TV
//!   ▲                                              │
//!   └──────── ResponseBridge ◄── worker event ◄────┘
//! ```
//!
//! `PairingController` uses the same dispatcher and transport during the
//! handshake and consumes the `registered` reply.

// ============================================================================
// Submodules
// ============================================================================

/// Reply correlation and waiting.
pub mod bridge;

/// Envelope construction and sending.
pub mod dispatcher;

/// Pairing handshake and state machine.
pub mod pairing;

// ============================================================================
// Re-exports
// ============================================================================

pub use bridge::ResponseBridge;
pub use dispatcher::CommandDispatcher;
pub use pairing::{PairingController, PairingPolicy, PairingState};
