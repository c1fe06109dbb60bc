//! Client facade.
//!
//! This module provides the main entry point for talking to a TV.
//!
//! # Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Client`] | Connection, pairing and request API |
//! | [`ClientBuilder`] | Fluent configuration builder |
//! | [`Device`] | Target TV address |
//!
//! # Example
//!
//! ```no_run
//! use webos_client::{Client, Result};
//!
//! # async fn example() -> Result<()> {
//! let client = Client::builder().address("192.168.1.20").build()?;
//!
//! client.register_client().await?;
//! client.show_toast("Hello, World!")?;
//!
//! client.close().await;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Submodules
// ============================================================================

/// Fluent builder pattern for client configuration.
pub mod builder;

/// Client facade implementation.
pub mod core;

/// Device addressing and client defaults.
pub mod options;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::ClientBuilder;
pub use core::Client;
pub use options::Device;
