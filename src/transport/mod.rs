//! WebSocket transport layer.
//!
//! This module owns the single WebSocket connection to the TV and the
//! background task that drives its I/O.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐                              ┌─────────────────┐
//! │  Client (Rust)  │                              │  webOS TV       │
//! │                 │         WebSocket            │                 │
//! │  Transport      │─────────────────────────────►│  SSAP server    │
//! │  → worker task  │        <address>:3000        │                 │
//! └─────────────────┘                              └─────────────────┘
//! ```
//!
//! # Connection Lifecycle
//!
//! 1. `Transport::start` - Spawn the worker task (once per client)
//! 2. `Transport::connect` - Ask the worker to open a socket
//! 3. `TransportEvent::Open` / `TransportEvent::Fail` - Reported by the worker
//! 4. `Transport::send` - Queue text frames for the worker
//! 5. `Transport::shutdown` - Close the socket and join the worker
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `connection` | Worker task, commands and events |
//! | `mock` | Scripted TV for tests |

// ============================================================================
// Submodules
// ============================================================================

/// Worker task, commands and events.
pub mod connection;

/// Scripted TV used by the test suites.
#[cfg(test)]
pub(crate) mod mock;

// ============================================================================
// Re-exports
// ============================================================================

pub use connection::{EventHandler, Transport, TransportEvent};
