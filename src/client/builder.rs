//! Builder pattern for client configuration.
//!
//! Provides a fluent API for configuring and creating [`Client`] instances.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use webos_client::{Client, PairingPolicy};
//!
//! # fn example() -> webos_client::Result<()> {
//! let client = Client::builder()
//!     .address("192.168.1.20")
//!     .key_file("/var/lib/tv/keys.json")
//!     .handshake_file("/etc/tv/handshake.json")
//!     .request_timeout(Duration::from_secs(3))
//!     .pairing(PairingPolicy::default().max_attempts(10))
//!     .build()?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::path::PathBuf;
use std::time::Duration;

use serde_json::Value;
use tokio::runtime::Handle;

use crate::error::{Error, Result};
use crate::keystore::KeyStore;
use crate::protocol::ManifestSource;
use crate::session::PairingPolicy;

use super::core::Client;
use super::options::{DEFAULT_REQUEST_TIMEOUT, DEVICE_PORT, Device};

// ============================================================================
// KeyLocation
// ============================================================================

/// Where pairing keys are persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
enum KeyLocation {
    /// `$HOME/.pylgtv`.
    #[default]
    UserDefault,
    /// Explicit key file.
    File(PathBuf),
    /// Temporary directory removed on teardown.
    Ephemeral,
}

// ============================================================================
// ClientBuilder
// ============================================================================

/// Builder for configuring a [`Client`] instance.
///
/// Use [`Client::builder()`] to create a new builder.
#[derive(Debug, Clone)]
pub struct ClientBuilder {
    /// TV host name or IP address.
    address: Option<String>,
    /// WebSocket port; only tests point clients elsewhere.
    port: u16,
    /// Key store location.
    keys: KeyLocation,
    /// Handshake manifest source.
    manifest: Option<ManifestSource>,
    /// Reply timeout for blocking requests.
    request_timeout: Duration,
    /// Pairing retry policy.
    pairing: PairingPolicy,
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self {
            address: None,
            port: DEVICE_PORT,
            keys: KeyLocation::default(),
            manifest: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            pairing: PairingPolicy::default(),
        }
    }
}

// ============================================================================
// ClientBuilder Implementation
// ============================================================================

impl ClientBuilder {
    /// Creates a new builder with default settings.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the TV host name or IP address.
    #[inline]
    #[must_use]
    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    /// Stores pairing keys in `path` instead of `$HOME/.pylgtv`.
    #[inline]
    #[must_use]
    pub fn key_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.keys = KeyLocation::File(path.into());
        self
    }

    /// Keeps pairing keys in a temporary directory removed on teardown.
    ///
    /// Replaces any earlier [`key_file`](Self::key_file).
    #[inline]
    #[must_use]
    pub fn ephemeral(mut self) -> Self {
        self.keys = KeyLocation::Ephemeral;
        self
    }

    /// Reads the handshake manifest from `path` on every attempt.
    #[inline]
    #[must_use]
    pub fn handshake_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.manifest = Some(ManifestSource::file(path));
        self
    }

    /// Uses an in-memory handshake manifest.
    #[inline]
    #[must_use]
    pub fn handshake(mut self, manifest: Value) -> Self {
        self.manifest = Some(ManifestSource::inline(manifest));
        self
    }

    /// Sets how long blocking requests wait for a reply.
    #[inline]
    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the pairing retry policy.
    #[inline]
    #[must_use]
    pub fn pairing(mut self, policy: PairingPolicy) -> Self {
        self.pairing = policy;
        self
    }

    /// Points the client at a non-standard port.
    #[cfg(test)]
    #[must_use]
    pub(crate) fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Builds the client and starts its transport worker.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the address is missing or invalid
    /// - [`Error::Config`] if called outside a tokio runtime
    /// - [`Error::Io`] if an ephemeral key store cannot be created
    pub fn build(self) -> Result<Client> {
        let device = self.validate_device()?;

        if Handle::try_current().is_err() {
            return Err(Error::config(
                "Client::build() must be called from within a tokio runtime",
            ));
        }

        let keystore = match self.keys {
            KeyLocation::UserDefault => KeyStore::user_default(),
            KeyLocation::File(path) => KeyStore::at(path),
            KeyLocation::Ephemeral => KeyStore::new_temp()?,
        };
        let manifest = self.manifest.unwrap_or_default();

        Ok(Client::new(
            device,
            keystore,
            manifest,
            self.pairing,
            self.request_timeout,
        ))
    }
}

// ============================================================================
// Validation
// ============================================================================

impl ClientBuilder {
    /// Validates the device address.
    fn validate_device(&self) -> Result<Device> {
        let address = self.address.clone().ok_or_else(|| {
            Error::config(
                "Device address is required. Use .address() to set it.\n\
                 Example: Client::builder().address(\"192.168.1.20\")",
            )
        })?;

        Device::with_port(address, self.port)
    }
}

// ============================================================================
// Tests
// ============================================================================
