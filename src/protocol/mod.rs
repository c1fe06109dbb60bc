//! SSAP protocol message types.
//!
//! This module defines the JSON messages exchanged with the TV over the
//! WebSocket connection.
//!
//! # Protocol Overview
//!
//! | Message | Direction | Purpose |
//! |---------|-----------|---------|
//! | [`RequestEnvelope`] | Client → TV | Command request (`type: "request"`) |
//! | [`HandshakeManifest`] | Client → TV | Pairing request (`type: "register"`) |
//! | [`Reply`] | TV → Client | Command reply, error or pairing result |
//!
//! # Endpoint Naming
//!
//! Endpoints are addressed with the `ssap://` scheme:
//!
//! - `ssap://audio/volumeUp`
//! - `ssap://system.notifications/createToast`
//! - `ssap://system.launcher/launch`
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `envelope` | Outbound request envelope |
//! | `manifest` | Pairing handshake manifest |
//! | `reply` | Inbound reply accessors |

// ============================================================================
// Submodules
// ============================================================================

/// Outbound request envelope.
pub mod envelope;

/// Pairing handshake manifest.
pub mod manifest;

/// Inbound reply accessors.
pub mod reply;

// ============================================================================
// Re-exports
// ============================================================================

pub use envelope::{EnvelopeType, RequestEnvelope, SSAP_SCHEME, ssap_uri};
pub use manifest::{HandshakeManifest, ManifestSource};
pub use reply::Reply;
