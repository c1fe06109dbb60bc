//! Pairing handshake manifest.
//!
//! The TV expects a `register` message describing the client: manufacturer,
//! requested permissions and a signed identity. That document is supplied
//! externally and treated as opaque, except for `payload["client-key"]`,
//! which carries the stored pairing key (empty on first pairing).
//!
//! Manifests can be provided in two forms:
//!
//! | Form | Description |
//! |------|-------------|
//! | File | JSON file, re-read on every handshake attempt |
//! | Inline | JSON value held in memory |
//!
//! # Example
//!
//! ```
//! use webos_client::protocol::ManifestSource;
//!
//! let from_file = ManifestSource::file("/home/me/handshake.json");
//! let inline = ManifestSource::inline(serde_json::json!({
//!     "type": "register",
//!     "payload": { "manifest": {} }
//! }));
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{Error, Result};
use crate::identifiers::RequestId;

use super::EnvelopeType;

// ============================================================================
// Constants
// ============================================================================

/// File name of the handshake manifest in the user's home directory.
pub const HANDSHAKE_FILE_NAME: &str = "handshake.json";

/// Payload field that carries the pairing key.
pub const CLIENT_KEY_FIELD: &str = "client-key";

// ============================================================================
// ManifestSource
// ============================================================================

/// Where the handshake manifest comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum ManifestSource {
    /// Path to a JSON manifest file.
    File(PathBuf),

    /// Manifest held in memory.
    Inline(Value),
}

impl ManifestSource {
    /// Creates a file-based manifest source.
    #[inline]
    #[must_use]
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::File(path.into())
    }

    /// Creates an in-memory manifest source.
    #[inline]
    #[must_use]
    pub fn inline(manifest: Value) -> Self {
        Self::Inline(manifest)
    }

    /// Returns `$HOME/handshake.json`, or `./handshake.json` without a home.
    #[must_use]
    pub fn default_path() -> PathBuf {
        match dirs::home_dir() {
            Some(home) => home.join(HANDSHAKE_FILE_NAME),
            None => PathBuf::from(".").join(HANDSHAKE_FILE_NAME),
        }
    }

    /// Returns the path if this is a file-based source.
    #[inline]
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::File(path) => Some(path),
            Self::Inline(_) => None,
        }
    }

    /// Loads a fresh copy of the manifest.
    ///
    /// # Errors
    ///
    /// - [`Error::Io`] if the file cannot be read
    /// - [`Error::Json`] if the file is not valid JSON
    /// - [`Error::Protocol`] if the manifest is not a JSON object
    pub fn load(&self) -> Result<HandshakeManifest> {
        let value = match self {
            Self::File(path) => {
                let content = fs::read_to_string(path)?;
                debug!(path = %path.display(), "Loaded handshake manifest");
                serde_json::from_str(&content)?
            }
            Self::Inline(value) => value.clone(),
        };

        HandshakeManifest::from_value(value)
    }
}

impl Default for ManifestSource {
    fn default() -> Self {
        Self::File(Self::default_path())
    }
}

// ============================================================================
// HandshakeManifest
// ============================================================================

/// A loaded handshake manifest ready for key injection.
#[derive(Debug, Clone, PartialEq)]
pub struct HandshakeManifest {
    /// Top-level manifest object.
    document: Map<String, Value>,
}

impl HandshakeManifest {
    /// Wraps a manifest value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if `value` is not a JSON object.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(document) => Ok(Self { document }),
            _ => Err(Error::protocol("Handshake manifest must be a JSON object")),
        }
    }

    /// Builds the register message for one handshake attempt.
    ///
    /// Sets `id`, injects `key` at `payload["client-key"]` (creating the
    /// payload object when missing) and defaults `type` to `"register"`.
    #[must_use]
    pub fn into_envelope(self, id: &RequestId, key: &str) -> Value {
        let mut document = self.document;

        document.insert("id".to_string(), Value::String(id.to_string()));
        document
            .entry("type")
            .or_insert_with(|| Value::String(EnvelopeType::Register.as_str().to_string()));

        let payload = document
            .entry("payload")
            .or_insert_with(|| Value::Object(Map::new()));
        if !payload.is_object() {
            *payload = Value::Object(Map::new());
        }
        if let Value::Object(payload) = payload {
            payload.insert(
                CLIENT_KEY_FIELD.to_string(),
                Value::String(key.to_string()),
            );
        }

        Value::Object(document)
    }
}

// ============================================================================
// Tests
// ============================================================================
