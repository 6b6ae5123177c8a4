//! Local persistent key-value store.
//!
//! Holds the consent flag, the fallback credential and the resend-cooldown
//! timestamp. `MemoryStore` is used in tests and when no storage path is
//! configured; `FileStore` keeps the map in one JSON file, rewritten on
//! every change.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use crate::error::StorageError;

pub const AUTH_TOKEN_KEY: &str = "authToken";
pub const COOKIES_ACCEPTED_KEY: &str = "cookiesAccepted";
pub const EMAIL_VALIDATION_LAST_REQUEST_KEY: &str = "emailValidationLastRequest";

/// String key-value storage with no expiry.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        lock(&self.entries).get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        lock(&self.entries).insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        lock(&self.entries).remove(key);
        Ok(())
    }
}

/// A `KeyValueStore` persisted as a JSON object in a single file.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl FileStore {
    /// Open the store at `path`, starting empty if the file does not exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        let entries = match fs::read_to_string(&path) {
            Ok(text) if text.trim().is_empty() => BTreeMap::new(),
            Ok(text) => {
                serde_json::from_str(&text).map_err(|e| StorageError::Corrupt(e.to_string()))?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, entries: &BTreeMap<String, String>) -> Result<(), StorageError> {
        let text = serde_json::to_string_pretty(entries)
            .map_err(|e| StorageError::Corrupt(e.to_string()))?;
        fs::write(&self.path, text)?;
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        lock(&self.entries).get(key).cloned()
    }

    /// Memory only changes once the file write succeeds.
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut entries = lock(&self.entries);
        let mut next = entries.clone();
        next.insert(key.to_string(), value.to_string());
        self.flush(&next)?;
        *entries = next;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut entries = lock(&self.entries);
        if !entries.contains_key(key) {
            return Ok(());
        }
        let mut next = entries.clone();
        next.remove(key);
        self.flush(&next)?;
        *entries = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_set_get_remove() {
        let store = MemoryStore::new();
        assert_eq!(store.get("k"), None);
        store.set("k", "v").unwrap();
        assert_eq!(store.get("k").as_deref(), Some("v"));
        store.remove("k").unwrap();
        assert_eq!(store.get("k"), None);
    }

    #[test]
    fn file_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("local.json");

        let store = FileStore::open(&path).unwrap();
        store.set(COOKIES_ACCEPTED_KEY, "true").unwrap();
        store.set(AUTH_TOKEN_KEY, "abc").unwrap();
        store.remove(AUTH_TOKEN_KEY).unwrap();
        drop(store);

        let reopened = FileStore::open(&path).unwrap();
        assert_eq!(reopened.get(COOKIES_ACCEPTED_KEY).as_deref(), Some("true"));
        assert_eq!(reopened.get(AUTH_TOKEN_KEY), None);
    }

    #[test]
    fn file_store_rejects_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("local.json");
        fs::write(&path, "not json").unwrap();
        assert!(matches!(FileStore::open(&path), Err(StorageError::Corrupt(_))));
    }

    #[test]
    fn failed_write_leaves_store_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("local.json");
        fs::create_dir(path.parent().unwrap()).unwrap();

        let store = FileStore::open(&path).unwrap();
        store.set(AUTH_TOKEN_KEY, "old").unwrap();
        fs::remove_dir_all(path.parent().unwrap()).unwrap();

        assert!(matches!(store.set(AUTH_TOKEN_KEY, "new"), Err(StorageError::Io(_))));
        assert_eq!(store.get(AUTH_TOKEN_KEY).as_deref(), Some("old"));
        assert!(store.remove(AUTH_TOKEN_KEY).is_err());
        assert_eq!(store.get(AUTH_TOKEN_KEY).as_deref(), Some("old"));
    }
}
