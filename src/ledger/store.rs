//! Key-value storage behind the version ledger.
//!
//! The host application normally supplies its own store (preferences,
//! keychain, ...). [`MemoryStore`] backs tests, and [`JsonFileStore`] backs the
//! CLI with a single JSON document rewritten atomically on every change.

use crate::core::Result;
use crate::utils::fs::atomic_write_json;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::warn;

/// String key-value storage.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;

    fn set(&self, key: &str, value: &str) -> Result<()>;

    fn remove(&self, key: &str) -> Result<()>;

    /// Applies `updates` in order; `None` removes the key.
    ///
    /// Stores that can write several keys in one step should override this so
    /// the batch becomes visible at once. The default applies each update
    /// individually, in order.
    fn apply(&self, updates: &[(&str, Option<&str>)]) -> Result<()> {
        for (key, value) in updates {
            match value {
                Some(value) => self.set(key, value)?,
                None => self.remove(key)?,
            }
        }
        Ok(())
    }

    /// Removes every key.
    fn clear(&self) -> Result<()>;
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// In-process store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all keys, for assertions.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        lock(&self.values).clone()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(lock(&self.values).get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        lock(&self.values).insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        lock(&self.values).remove(key);
        Ok(())
    }

    fn apply(&self, updates: &[(&str, Option<&str>)]) -> Result<()> {
        let mut values = lock(&self.values);
        for (key, value) in updates {
            match value {
                Some(value) => values.insert((*key).to_string(), (*value).to_string()),
                None => values.remove(*key),
            };
        }
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        lock(&self.values).clear();
        Ok(())
    }
}

/// Store persisted as one JSON object on disk.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    values: Mutex<BTreeMap<String, String>>,
}

impl JsonFileStore {
    /// Opens the store at `path`. A missing file is an empty store.
    ///
    /// # Errors
    ///
    /// [`crate::core::AbuError::IoError`] if the file exists but cannot be read or parsed.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let values = match std::fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path,
            values: Mutex::new(values),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Applies `change` to a copy and persists it; memory is only updated after
    /// the write succeeded.
    fn update(&self, change: impl FnOnce(&mut BTreeMap<String, String>)) -> Result<()> {
        let mut values = lock(&self.values);
        let mut next = values.clone();
        change(&mut next);
        if let Err(e) = atomic_write_json(&self.path, &next) {
            warn!("Failed to persist {}: {}", self.path.display(), e);
            return Err(e);
        }
        *values = next;
        Ok(())
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(lock(&self.values).get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.update(|values| {
            values.insert(key.to_string(), value.to_string());
        })
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.update(|values| {
            values.remove(key);
        })
    }

    fn apply(&self, updates: &[(&str, Option<&str>)]) -> Result<()> {
        self.update(|values| {
            for (key, value) in updates {
                match value {
                    Some(value) => values.insert((*key).to_string(), (*value).to_string()),
                    None => values.remove(*key),
                };
            }
        })
    }

    fn clear(&self) -> Result<()> {
        self.update(BTreeMap::clear)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_memory_store_apply_in_order() {
        let store = MemoryStore::new();
        store.set("stale", "1").unwrap();

        store.apply(&[("a", Some("1")), ("stale", None), ("a", Some("2"))]).unwrap();

        assert_eq!(store.get("a").unwrap().as_deref(), Some("2"));
        assert_eq!(store.get("stale").unwrap(), None);
    }

    #[test]
    fn test_json_store_persists_across_reopen() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("ledger.json");

        let store = JsonFileStore::open(&path).unwrap();
        store.apply(&[("nativeVersion", Some("1.0")), ("currentBundleVersion", Some("1.0-3"))]).unwrap();
        drop(store);

        let reopened = JsonFileStore::open(&path).unwrap();
        assert_eq!(reopened.get("currentBundleVersion").unwrap().as_deref(), Some("1.0-3"));

        reopened.clear().unwrap();
        assert_eq!(JsonFileStore::open(&path).unwrap().get("nativeVersion").unwrap(), None);
    }

    #[test]
    fn test_json_store_rejects_corrupt_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("ledger.json");
        std::fs::write(&path, "{not json").unwrap();

        assert!(JsonFileStore::open(&path).is_err());
    }
}
