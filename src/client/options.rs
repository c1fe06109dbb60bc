//! Device addressing and client defaults.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::time::Duration;

use url::Url;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Port of the SSAP WebSocket server on the TV.
pub const DEVICE_PORT: u16 = 3000;

/// Default time a blocking request waits for its reply.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// Device
// ============================================================================

/// The TV a client talks to. Immutable once the client is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    /// Host name or IP address.
    address: String,
    /// WebSocket port.
    port: u16,
}

impl Device {
    /// Creates a device on the standard port.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `address` is empty or not a bare host.
    pub fn new(address: impl Into<String>) -> Result<Self> {
        Self::with_port(address, DEVICE_PORT)
    }

    /// Creates a device on a non-standard port.
    pub(crate) fn with_port(address: impl Into<String>, port: u16) -> Result<Self> {
        let address = address.into().trim().to_string();

        if address.is_empty() {
            return Err(Error::config(
                "Device address is required. Use .address() to set it.\n\
                 Example: Client::builder().address(\"192.168.1.20\")",
            ));
        }

        if address.contains('/') {
            return Err(Error::config(format!(
                "Device address must be a bare host, got: {address}"
            )));
        }

        let url = Url::parse(&format!("ws://{address}:{port}"))
            .map_err(|e| Error::config(format!("Invalid device address {address}: {e}")))?;

        if url.host_str().is_none() || url.port() != Some(port) {
            return Err(Error::config(format!(
                "Device address must be a bare host, got: {address}"
            )));
        }

        Ok(Self { address, port })
    }

    /// Returns the host name or IP address.
    #[inline]
    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Returns the WebSocket port.
    #[inline]
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Returns the WebSocket URL, `ws://<address>:<port>`.
    #[inline]
    #[must_use]
    pub fn url(&self) -> String {
        format!("ws://{}:{}", self.address, self.port)
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.address, self.port)
    }
}

// ============================================================================
// Tests
// ============================================================================
