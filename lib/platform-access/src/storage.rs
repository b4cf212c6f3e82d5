//! Key/value storage scopes backing the token store.
//!
//! Two scopes are used:
//! - a primary scope that lives as long as the process (`MemoryStorage`)
//! - a durable scope that survives restarts (`FileStorage`)
//!
//! Storage operations never fail from the caller's point of view. Missing
//! keys read as `None` and write failures are logged and dropped.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError, RwLock};

use tempfile::NamedTempFile;
use tracing::warn;

/// A synchronous string key/value scope.
pub trait StorageScope: Send + Sync {
    /// Returns the value stored under `key`.
    fn get(&self, key: &str) -> Option<String>;

    /// Stores `value` under `key`, replacing any previous value.
    fn set(&self, key: &str, value: &str);

    /// Removes `key` if present.
    fn remove(&self, key: &str);

    /// Stores every entry in one write.
    ///
    /// Readers never observe a partial update.
    fn set_all(&self, entries: &[(&str, &str)]) {
        for (key, value) in entries {
            self.set(key, value);
        }
    }

    /// Removes every listed key in one write.
    fn remove_all(&self, keys: &[&str]) {
        for key in keys {
            self.remove(key);
        }
    }
}

/// Process-scoped storage. Cleared when the process exits.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStorage {
    /// Creates an empty scope.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops every key, as a browser does when a tab-scoped store is reset.
    pub fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl StorageScope for MemoryStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: &str) {
        self.set_all(&[(key, value)]);
    }

    fn remove(&self, key: &str) {
        self.remove_all(&[key]);
    }

    fn set_all(&self, entries: &[(&str, &str)]) {
        let mut map = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        for (key, value) in entries {
            map.insert((*key).to_string(), (*value).to_string());
        }
    }

    fn remove_all(&self, keys: &[&str]) {
        let mut map = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        for key in keys {
            map.remove(*key);
        }
    }
}

/// Durable storage kept as a JSON object in a single file.
///
/// Every write rewrites the file through a temporary sibling and a rename,
/// so a crash leaves either the old or the new contents. The file is readable
/// by its owner only.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStorage {
    /// Opens (lazily) the store at `path`. The file is created on first write.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Returns the backing file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_entries(&self) -> HashMap<String, String> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return HashMap::new(),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "failed to read durable storage");
                return HashMap::new();
            }
        };

        serde_json::from_str(&contents).unwrap_or_else(|e| {
            warn!(path = %self.path.display(), error = %e, "durable storage is corrupt, ignoring it");
            HashMap::new()
        })
    }

    fn write_entries(&self, entries: &HashMap<String, String>) -> std::io::Result<()> {
        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(parent)?;

        let json = serde_json::to_vec_pretty(entries)?;
        // NamedTempFile is created owner-only (0600 on unix).
        let mut file = NamedTempFile::new_in(parent)?;
        file.write_all(&json)?;
        file.as_file().sync_all()?;
        file.persist(&self.path)?;
        Ok(())
    }

    fn update(&self, apply: impl FnOnce(&mut HashMap<String, String>)) {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut entries = self.read_entries();
        apply(&mut entries);
        if let Err(e) = self.write_entries(&entries) {
            warn!(path = %self.path.display(), error = %e, "failed to write durable storage");
        }
    }
}

impl StorageScope for FileStorage {
    fn get(&self, key: &str) -> Option<String> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.read_entries().remove(key)
    }

    fn set(&self, key: &str, value: &str) {
        self.set_all(&[(key, value)]);
    }

    fn remove(&self, key: &str) {
        self.remove_all(&[key]);
    }

    fn set_all(&self, entries: &[(&str, &str)]) {
        self.update(|map| {
            for (key, value) in entries {
                map.insert((*key).to_string(), (*value).to_string());
            }
        });
    }

    fn remove_all(&self, keys: &[&str]) {
        self.update(|map| {
            for key in keys {
                map.remove(*key);
            }
        });
    }
}
