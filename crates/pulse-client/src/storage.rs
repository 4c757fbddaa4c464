//! Durable key-value persistence
//!
//! Values are JSON strings. [`FileStore`] keeps one file per key and
//! replaces it with an atomic rename, so a crash mid-write leaves either the
//! old or the new value, never a torn one.

use crate::error::StorageError;
use dashmap::DashMap;
use parking_lot::Mutex;
use pulse_model::OfficeId;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::{ErrorKind, Write};
use tempfile::NamedTempFile;
use std::path::{Path, PathBuf};

/// Synchronous string store
pub trait KeyValueStore: Send + Sync + 'static {
    /// Value for `key`, if present
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Replace the value for `key`
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Delete `key`; deleting a missing key is not an error
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// Read and decode a JSON value
///
/// # Errors
/// `Corrupt` when the stored text is not valid JSON for `T`
pub fn read_json<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    key: &str,
) -> Result<Option<T>, StorageError> {
    let Some(raw) = store.get(key)? else {
        return Ok(None);
    };
    serde_json::from_str(&raw)
        .map(Some)
        .map_err(|e| StorageError::Corrupt {
            key: key.to_string(),
            message: e.to_string(),
        })
}

/// Encode and write a JSON value
///
/// # Errors
/// `Encode` or any write failure
pub fn write_json<T: Serialize + ?Sized>(
    store: &dyn KeyValueStore,
    key: &str,
    value: &T,
) -> Result<(), StorageError> {
    let raw = serde_json::to_string(value).map_err(|e| StorageError::Encode(e.to_string()))?;
    store.set(key, &raw)
}

/// Storage keys under one namespace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageKeys {
    namespace: String,
}

impl StorageKeys {
    /// Keys prefixed with `namespace`
    #[inline]
    #[must_use]
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    fn key(&self, name: &str) -> String {
        format!("{}.{name}", self.namespace)
    }

    /// Local preference list
    #[must_use]
    pub fn preferences(&self) -> String {
        self.key("preferences")
    }

    /// Outbox list
    #[must_use]
    pub fn outbox(&self) -> String {
        self.key("outbox")
    }

    /// Last known user
    #[must_use]
    pub fn user(&self) -> String {
        self.key("user")
    }

    /// Session token
    #[must_use]
    pub fn session(&self) -> String {
        self.key("session")
    }

    /// Cached offices
    #[must_use]
    pub fn offices(&self) -> String {
        self.key("offices")
    }

    /// Cached candidates for one office
    #[must_use]
    pub fn candidates(&self, office_id: &OfficeId) -> String {
        self.key(&format!("candidates.{office_id}"))
    }
}

/// Process-local store
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, String>,
}

impl MemoryStore {
    /// Empty store
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no key is set
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.get(key).map(|v| v.value().clone()))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.entries.remove(key);
        Ok(())
    }
}

/// One JSON file per key under a directory
#[derive(Debug)]
pub struct FileStore {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStore {
    /// Open (creating if needed) a store rooted at `root`
    ///
    /// # Errors
    /// `Io` if the directory cannot be created
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| StorageError::io(&root, &e))?;
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    /// Store directory
    #[inline]
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.root.join(format!("{name}.json"))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.path_for(key);
        match fs::read_to_string(&path) {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::io(&path, &e)),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let path = self.path_for(key);

        let _guard = self.write_lock.lock();
        let mut staging =
            NamedTempFile::new_in(&self.root).map_err(|e| StorageError::io(&self.root, &e))?;
        staging
            .write_all(value.as_bytes())
            .map_err(|e| StorageError::io(staging.path(), &e))?;
        staging
            .persist(&path)
            .map_err(|e| StorageError::io(&path, &e.error))?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let path = self.path_for(key);
        let _guard = self.write_lock.lock();
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::io(&path, &e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn memory_store_roundtrip() {
        let store = MemoryStore::new();
        assert_eq!(store.get("k").unwrap(), None);
        store.set("k", "v").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("v"));
        store.remove("k").unwrap();
        store.remove("k").unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = FileStore::open(dir.path()).unwrap();
            store.set("pulse.outbox", "[1,2]").unwrap();
        }
        let reopened = FileStore::open(dir.path()).unwrap();
        assert_eq!(reopened.get("pulse.outbox").unwrap().as_deref(), Some("[1,2]"));
    }

    #[test]
    fn file_store_leaves_no_staging_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        store.set("a", "1").unwrap();
        store.set("a", "2").unwrap();

        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.json".to_string()]);
        assert_eq!(store.get("a").unwrap().as_deref(), Some("2"));
    }

    #[test]
    fn stores_sharing_a_directory_do_not_collide() {
        let dir = tempfile::tempdir().unwrap();
        let writers: Vec<_> = (0..4)
            .map(|n| {
                let root = dir.path().to_path_buf();
                std::thread::spawn(move || {
                    let store = FileStore::open(root).unwrap();
                    for i in 0..25 {
                        store.set("vp.outbox", &format!("[{n},{i}]")).unwrap();
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }

        let store = FileStore::open(dir.path()).unwrap();
        let last: Vec<u32> = read_json(&store, "vp.outbox").unwrap().unwrap();
        assert_eq!(last[1], 24);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn keys_are_sanitized() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        store.set("ns.candidates.../etc", "x").unwrap();
        assert!(store.path_for("ns.candidates.../etc").starts_with(dir.path()));
        assert_eq!(store.get("ns.candidates.../etc").unwrap().as_deref(), Some("x"));
    }

    #[test]
    fn corrupt_json_is_reported() {
        let store = MemoryStore::new();
        store.set("k", "{not json").unwrap();
        let err = read_json::<Vec<u32>>(&store, "k").unwrap_err();
        assert!(matches!(err, StorageError::Corrupt { .. }));
    }

    #[test]
    fn namespaced_keys() {
        let keys = StorageKeys::new("vp");
        assert_eq!(keys.outbox(), "vp.outbox");
        assert_eq!(keys.candidates(&OfficeId::new("gov")), "vp.candidates.gov");
    }
}
