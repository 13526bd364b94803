//! Fast synchronous string store.
//!
//! The lightweight tier next to the durable catalog store: a handful of string
//! keys (device identity, API override, session token) that must be readable
//! without awaiting anything. The file-backed variant keeps the whole map in
//! memory and rewrites the file on every change.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::warn;

use crate::db::StoreError;

/// File name of the ephemeral store inside the data directory.
pub const EPHEMERAL_FILE_NAME: &str = "local-storage.json";

/// Keys used in the ephemeral store.
pub mod keys {
    /// Device identity mirror.
    pub const DEVICE_UUID: &str = "uuid";

    /// Locally persisted backend base URL override.
    pub const API_URL: &str = "api_url";

    /// Bearer session token.
    pub const SESSION_TOKEN: &str = "token";
}

/// Synchronous string key/value storage.
pub trait EphemeralStore: Send + Sync {
    /// Read a value.
    fn get(&self, key: &str) -> Option<String>;

    /// Write a value.
    ///
    /// # Errors
    ///
    /// Returns an error if the value could not be persisted.
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Delete a value. Deleting a missing key is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the change could not be persisted.
    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

impl<T: EphemeralStore + ?Sized> EphemeralStore for Arc<T> {
    fn get(&self, key: &str) -> Option<String> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        (**self).remove(key)
    }
}

/// JSON-file-backed store.
pub struct FileEphemeralStore {
    path: PathBuf,
    entries: RwLock<BTreeMap<String, String>>,
}

impl FileEphemeralStore {
    /// Load the store from `path`.
    ///
    /// A missing file starts empty. An unreadable or corrupt file is logged and
    /// also starts empty; the durable tier repairs the identity afterwards.
    #[must_use]
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match std::fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "Ephemeral store is corrupt, starting empty");
                BTreeMap::new()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ephemeral store unreadable, starting empty");
                BTreeMap::new()
            }
        };

        Self {
            path,
            entries: RwLock::new(entries),
        }
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, entries: &BTreeMap<String, String>) -> Result<(), StoreError> {
        let unavailable =
            |e: &dyn std::fmt::Display| StoreError::StorageUnavailable(format!("{}: {e}", self.path.display()));

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| unavailable(&e))?;
        }

        let json = serde_json::to_vec_pretty(entries).map_err(|e| unavailable(&e))?;

        // Write-then-rename so a crash never leaves a half-written file
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(|e| unavailable(&e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| unavailable(&e))
    }
}

impl EphemeralStore for FileEphemeralStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let previous = entries.insert(key.to_owned(), value.to_owned());

        if let Err(e) = self.persist(&entries) {
            // Keep memory in step with disk
            match previous {
                Some(old) => entries.insert(key.to_owned(), old),
                None => entries.remove(key),
            };
            return Err(e);
        }
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let Some(previous) = entries.remove(key) else {
            return Ok(());
        };

        if let Err(e) = self.persist(&entries) {
            entries.insert(key.to_owned(), previous);
            return Err(e);
        }
        Ok(())
    }
}

/// Process-local store, used by tests and dry runs.
#[derive(Default)]
pub struct MemoryEphemeralStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryEphemeralStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl EphemeralStore for MemoryEphemeralStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        Ok(())
    }
}
