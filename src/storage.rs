//! Durable key-value persistence
//!
//! Every collection is stored as one serialized record under a fixed key, so a
//! write always replaces the whole record.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::StorageError;

pub const PLAYLISTS_KEY: &str = "iptv-playlists";
pub const FAVORITES_KEY: &str = "iptv-favorites";
pub const RECENTLY_WATCHED_KEY: &str = "iptv-recently-watched";
pub const UPDATE_INTERVAL_KEY: &str = "update_interval";
pub const LAST_UPDATE_CHECK_KEY: &str = "last_update_check";

/// Generic durable string store
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// Read a JSON record, `None` if the key was never written
pub fn load_json<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    key: &str,
) -> Result<Option<T>, StorageError> {
    match store.get(key)? {
        Some(content) if !content.trim().is_empty() => Ok(Some(serde_json::from_str(&content)?)),
        _ => Ok(None),
    }
}

/// Serialize and write a JSON record as one unit
pub fn save_json<T: Serialize + ?Sized>(
    store: &dyn KeyValueStore,
    key: &str,
    value: &T,
) -> Result<(), StorageError> {
    let content = serde_json::to_string(value)?;
    store.set(key, &content)
}

/// One `<key>.json` file per key inside a directory
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| StorageError::Io {
            key: dir.display().to_string(),
            source,
        })?;
        Ok(Self { dir })
    }

    /// Store under the platform config directory
    pub fn default_location() -> Result<Self, StorageError> {
        let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push("iptv_playlists");
        path.push("store");
        Self::new(path)
    }

    fn key_path(&self, key: &str) -> PathBuf {
        let file_name: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{}.json", file_name))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        match fs::read_to_string(self.key_path(key)) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StorageError::Io { key: key.to_string(), source }),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let path = self.key_path(key);
        let tmp = path.with_extension("json.tmp");
        let io_err = |source: std::io::Error| StorageError::Io { key: key.to_string(), source };

        // Readers only ever see the old or the new file
        fs::write(&tmp, value).map_err(io_err)?;
        fs::rename(&tmp, &path).map_err(io_err)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        match fs::remove_file(self.key_path(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StorageError::Io { key: key.to_string(), source }),
        }
    }
}

/// Process-local store, used for tests and throwaway sessions
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_store_round_trip_and_missing_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("nested")).unwrap();

        assert_eq!(store.get(PLAYLISTS_KEY).unwrap(), None);
        store.set(PLAYLISTS_KEY, "[]").unwrap();
        assert_eq!(store.get(PLAYLISTS_KEY).unwrap().as_deref(), Some("[]"));
        assert!(dir.path().join("nested").join("iptv-playlists.json").exists());

        store.set(PLAYLISTS_KEY, "[1]").unwrap();
        assert_eq!(store.get(PLAYLISTS_KEY).unwrap().as_deref(), Some("[1]"));
        assert!(!dir.path().join("nested").join("iptv-playlists.json.tmp").exists());

        store.remove(PLAYLISTS_KEY).unwrap();
        store.remove(PLAYLISTS_KEY).unwrap();
        assert_eq!(store.get(PLAYLISTS_KEY).unwrap(), None);
    }

    #[test]
    fn test_file_store_sanitizes_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path()).unwrap();
        store.set("../escape", "x").unwrap();
        assert!(dir.path().join("___escape.json").exists());
    }

    #[test]
    fn test_json_helpers() {
        let store = MemoryStore::new();
        assert_eq!(load_json::<Vec<String>>(&store, FAVORITES_KEY).unwrap(), None);

        save_json(&store, FAVORITES_KEY, &vec!["a".to_string()]).unwrap();
        let ids: Vec<String> = load_json(&store, FAVORITES_KEY).unwrap().unwrap();
        assert_eq!(ids, vec!["a".to_string()]);

        store.set(FAVORITES_KEY, "{broken").unwrap();
        assert!(load_json::<Vec<String>>(&store, FAVORITES_KEY).is_err());
    }
}
