//! Persistent store for pairing keys.
//!
//! The TV hands out a client key when the user accepts the pairing prompt.
//! Keys are kept in a small JSON object mapping device address to key:
//!
//! ```json
//! { "192.168.1.20": "a1b2c3...", "10.0.0.7": "f00d..." }
//! ```
//!
//! Every save is a read-modify-write of the whole file, so keys for other
//! devices are preserved.
//!
//! # Example
//!
//! ```no_run
//! use webos_client::KeyStore;
//!
//! # fn example() -> webos_client::Result<()> {
//! let store = KeyStore::at("/tmp/tv-keys.json");
//! store.save("192.168.1.20", "a1b2c3")?;
//! assert_eq!(store.load("192.168.1.20")?, "a1b2c3");
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tempfile::TempDir;
use tracing::debug;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// File name of the key store in the user's home directory.
pub const KEY_FILE_NAME: &str = ".pylgtv";

// ============================================================================
// KeyStore
// ============================================================================

/// On-disk map of device address to pairing key.
///
/// Stores created with [`KeyStore::new_temp()`] live in a temporary
/// directory that is deleted when the store is dropped.
#[derive(Debug)]
pub struct KeyStore {
    /// Keeps the temporary directory alive for ephemeral stores.
    _temp_dir: Option<TempDir>,

    /// Path to the JSON key file.
    path: PathBuf,
}

// ============================================================================
// KeyStore - Constructors
// ============================================================================

impl KeyStore {
    /// Uses the key file at `path`. The file need not exist yet.
    #[inline]
    #[must_use]
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            _temp_dir: None,
            path: path.into(),
        }
    }

    /// Uses the default per-user key file.
    #[inline]
    #[must_use]
    pub fn user_default() -> Self {
        Self::at(Self::default_path())
    }

    /// Creates a store in a fresh temporary directory.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the temporary directory cannot be created.
    pub fn new_temp() -> Result<Self> {
        let temp_dir = TempDir::with_prefix("webos-client-")?;
        let path = temp_dir.path().join(KEY_FILE_NAME);
        debug!(path = %path.display(), "Created ephemeral key store");

        Ok(Self {
            _temp_dir: Some(temp_dir),
            path,
        })
    }

    /// Returns `$HOME/.pylgtv`, or `./.pylgtv` when no home directory is known.
    #[must_use]
    pub fn default_path() -> PathBuf {
        match dirs::home_dir() {
            Some(home) => home.join(KEY_FILE_NAME),
            None => PathBuf::from(".").join(KEY_FILE_NAME),
        }
    }
}

// ============================================================================
// KeyStore - Operations
// ============================================================================

impl KeyStore {
    /// Returns the path of the key file.
    #[inline]
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns `true` if the store is deleted on drop.
    #[inline]
    #[must_use]
    pub fn is_ephemeral(&self) -> bool {
        self._temp_dir.is_some()
    }

    /// Loads the key stored for `address`.
    ///
    /// Returns an empty string when the device has never been paired or the
    /// file does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] or [`Error::Json`] if the file exists but cannot
    /// be read or parsed.
    pub fn load(&self, address: &str) -> Result<String> {
        let keys = self.read_map()?;
        let key = keys
            .get(address)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        debug!(address, found = !key.is_empty(), "Loaded pairing key");
        Ok(key)
    }

    /// Stores `key` for `address`, keeping entries for other devices.
    ///
    /// An empty key is never written: it would read back as "not paired".
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] or [`Error::Json`] if the file cannot be read,
    /// parsed or rewritten.
    pub fn save(&self, address: &str, key: &str) -> Result<()> {
        if key.is_empty() {
            debug!(address, "Skipping save of empty pairing key");
            return Ok(());
        }

        let mut keys = self.read_map()?;
        keys.insert(address.to_string(), Value::String(key.to_string()));

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_string(&Value::Object(keys))?)?;

        debug!(address, path = %self.path.display(), "Saved pairing key");
        Ok(())
    }

    /// Reads the whole key map. A missing file is an empty map.
    fn read_map(&self) -> Result<Map<String, Value>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Map::new()),
            Err(e) => return Err(e.into()),
        };

        if content.trim().is_empty() {
            return Ok(Map::new());
        }

        match serde_json::from_str(&content)? {
            Value::Object(map) => Ok(map),
            other => Err(Error::protocol(format!(
                "Key file {} holds {} instead of an object",
                self.path.display(),
                json_kind(&other)
            ))),
        }
    }
}

/// Names the JSON type of a value for error messages.
fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::tempdir;

    #[test]
    fn test_load_missing_file_is_unpaired() {
        let dir = tempdir().expect("tempdir");
        let store = KeyStore::at(dir.path().join("keys.json"));

        assert_eq!(store.load("192.168.1.20").expect("load"), "");
        assert!(!store.path().exists());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempdir().expect("tempdir");
        let store = KeyStore::at(dir.path().join("keys.json"));

        store.save("192.168.1.20", "K").expect("save");
        assert_eq!(store.load("192.168.1.20").expect("load"), "K");
        assert_eq!(store.load("192.168.1.21").expect("load"), "");
    }

    #[test]
    fn test_save_preserves_other_devices() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("keys.json");
        fs::write(&path, r#"{"10.0.0.7":"old"}"#).expect("seed");

        let store = KeyStore::at(&path);
        store.save("192.168.1.20", "new").expect("save");

        assert_eq!(store.load("10.0.0.7").expect("load"), "old");
        assert_eq!(store.load("192.168.1.20").expect("load"), "new");
    }

    #[test]
    fn test_save_empty_key_is_noop() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("keys.json");
        fs::write(&path, r#"{"10.0.0.7":"old"}"#).expect("seed");

        let store = KeyStore::at(&path);
        store.save("10.0.0.7", "").expect("save");
        store.save("192.168.1.20", "").expect("save");

        let content = fs::read_to_string(&path).expect("read");
        assert_eq!(content, r#"{"10.0.0.7":"old"}"#);
    }

    #[test]
    fn test_save_empty_key_does_not_create_file() {
        let dir = tempdir().expect("tempdir");
        let store = KeyStore::at(dir.path().join("keys.json"));

        store.save("192.168.1.20", "").expect("save");
        assert!(!store.path().exists());
    }

    #[test]
    fn test_save_overwrites_existing_key() {
        let dir = tempdir().expect("tempdir");
        let store = KeyStore::at(dir.path().join("keys.json"));

        store.save("192.168.1.20", "first").expect("save");
        store.save("192.168.1.20", "second").expect("save");
        assert_eq!(store.load("192.168.1.20").expect("load"), "second");
    }

    #[test]
    fn test_corrupt_file_is_reported() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("keys.json");
        fs::write(&path, "{not json").expect("seed");

        let store = KeyStore::at(&path);
        assert!(matches!(store.load("192.168.1.20"), Err(Error::Json(_))));
        assert!(store.save("192.168.1.20", "K").is_err());

        // Existing content is left untouched
        assert_eq!(fs::read_to_string(&path).expect("read"), "{not json");
    }

    #[test]
    fn test_non_object_file_is_reported() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("keys.json");
        fs::write(&path, "[1, 2]").expect("seed");

        let err = KeyStore::at(&path).load("x").unwrap_err();
        assert!(err.to_string().contains("an array"));
    }

    #[test]
    fn test_temp_store_is_removed_on_drop() {
        let store = KeyStore::new_temp().expect("temp store");
        assert!(store.is_ephemeral());

        store.save("192.168.1.20", "K").expect("save");
        let path = store.path().to_path_buf();
        assert!(path.exists());

        drop(store);
        assert!(!path.exists());
    }

    #[test]
    fn test_default_path_uses_key_file_name() {
        let path = KeyStore::default_path();
        assert!(path.ends_with(KEY_FILE_NAME));
    }
}
