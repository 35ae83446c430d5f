//! Key-value persistence medium and the identity store adapter on top of it.
//!
//! [`KvStore`] is the synchronous get/set string store the identity lives in.
//! Two backends:
//! - [`MemoryKvStore`] — process memory, discarded on exit.
//! - [`FileKvStore`]   — one JSON object file, `{ "<key>": "<value>", ... }`.
//!
//! [`IdentityStore`] pins a single well-known key and never fails a load:
//! unreadable state is logged and reported as absent.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use crate::error::AppError;

/// Synchronous string key-value store. Writes are last-write-wins.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, AppError>;

    fn set(&self, key: &str, value: &str) -> Result<(), AppError>;
}

// ── MemoryKvStore ────────────────────────────────────────────────────────────

/// Ephemeral in-memory store.
#[derive(Default)]
pub struct MemoryKvStore {
    data: Mutex<BTreeMap<String, String>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvStore for MemoryKvStore {
    fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        let data = self
            .data
            .lock()
            .map_err(|_| AppError::Store("memory store lock poisoned".into()))?;
        Ok(data.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), AppError> {
        let mut data = self
            .data
            .lock()
            .map_err(|_| AppError::Store("memory store lock poisoned".into()))?;
        data.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

// ── FileKvStore ──────────────────────────────────────────────────────────────

/// Durable store backed by a single JSON object file.
///
/// A missing file reads as empty. A malformed file also reads as empty and
/// is replaced wholesale on the next write.
pub struct FileKvStore {
    path: PathBuf,
    // Serialises read-modify-write cycles within this process.
    lock: Mutex<()>,
}

impl FileKvStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), lock: Mutex::new(()) }
    }

    fn read_map(&self) -> Result<BTreeMap<String, String>, AppError> {
        let data = match fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => {
                return Err(AppError::Store(format!(
                    "cannot read {}: {e}",
                    self.path.display()
                )));
            }
        };
        match serde_json::from_str(&data) {
            Ok(map) => Ok(map),
            Err(e) => {
                warn!(path = %self.path.display(), "malformed store file, treating as empty: {e}");
                Ok(BTreeMap::new())
            }
        }
    }

    fn write_map(&self, map: &BTreeMap<String, String>) -> Result<(), AppError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| {
                    AppError::Store(format!("cannot create {}: {e}", parent.display()))
                })?;
            }
        }
        let data = serde_json::to_string_pretty(map)
            .map_err(|e| AppError::Store(format!("serialise store: {e}")))?;
        fs::write(&self.path, data)
            .map_err(|e| AppError::Store(format!("cannot write {}: {e}", self.path.display())))
    }
}

impl KvStore for FileKvStore {
    fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| AppError::Store("file store lock poisoned".into()))?;
        Ok(self.read_map()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), AppError> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| AppError::Store("file store lock poisoned".into()))?;
        let mut map = self.read_map()?;
        map.insert(key.to_string(), value.to_string());
        self.write_map(&map)
    }
}

// ── IdentityStore ────────────────────────────────────────────────────────────

/// Identity store adapter — one fixed key over a shared [`KvStore`].
///
/// Cheaply cloneable; the bootstrapper, the profile gate, and the
/// write-back task each hold a clone.
#[derive(Clone)]
pub struct IdentityStore {
    kv: Arc<dyn KvStore>,
    key: String,
}

impl IdentityStore {
    pub fn new(kv: Arc<dyn KvStore>, key: impl Into<String>) -> Self {
        Self { kv, key: key.into() }
    }

    /// Raw stored value, or `None` when missing, empty, or unreadable.
    pub fn load(&self) -> Option<String> {
        match self.kv.get(&self.key) {
            Ok(Some(raw)) if !raw.is_empty() => Some(raw),
            Ok(_) => {
                debug!(key = %self.key, "no stored identity");
                None
            }
            Err(e) => {
                warn!(key = %self.key, "identity load failed, treating as absent: {e}");
                None
            }
        }
    }

    /// Overwrite the stored value.
    pub fn save(&self, raw: &str) -> Result<(), AppError> {
        self.kv.set(&self.key, raw)?;
        debug!(key = %self.key, bytes = raw.len(), "identity saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn memory_store_set_get_overwrite() {
        let store = MemoryKvStore::new();
        assert_eq!(store.get("user").unwrap(), None);
        store.set("user", "a").unwrap();
        store.set("user", "b").unwrap();
        assert_eq!(store.get("user").unwrap(), Some("b".into()));
    }

    #[test]
    fn file_store_missing_file_is_empty() {
        let tmp = TempDir::new().unwrap();
        let store = FileKvStore::new(tmp.path().join("identity.json"));
        assert_eq!(store.get("user").unwrap(), None);
    }

    #[test]
    fn file_store_persists_across_instances() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("identity.json");
        FileKvStore::new(&path).set("user", "{\"name\":\"x\"}").unwrap();

        let reopened = FileKvStore::new(&path);
        assert_eq!(reopened.get("user").unwrap(), Some("{\"name\":\"x\"}".into()));
    }

    #[test]
    fn file_store_keeps_other_keys() {
        let tmp = TempDir::new().unwrap();
        let store = FileKvStore::new(tmp.path().join("kv.json"));
        store.set("theme", "dark").unwrap();
        store.set("user", "u1").unwrap();
        store.set("user", "u2").unwrap();
        assert_eq!(store.get("theme").unwrap(), Some("dark".into()));
        assert_eq!(store.get("user").unwrap(), Some("u2".into()));
    }

    #[test]
    fn file_store_malformed_file_reads_empty_and_recovers() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("kv.json");
        fs::write(&path, "not json at all").unwrap();
        let store = FileKvStore::new(&path);
        assert_eq!(store.get("user").unwrap(), None);
        store.set("user", "fresh").unwrap();
        assert_eq!(store.get("user").unwrap(), Some("fresh".into()));
    }

    #[test]
    fn identity_store_treats_empty_value_as_absent() {
        let kv = Arc::new(MemoryKvStore::new());
        kv.set("user", "").unwrap();
        let store = IdentityStore::new(kv, "user");
        assert_eq!(store.load(), None);
    }

    #[test]
    fn identity_store_load_swallows_read_errors() {
        struct FailingKv;
        impl KvStore for FailingKv {
            fn get(&self, _key: &str) -> Result<Option<String>, AppError> {
                Err(AppError::Store("disk on fire".into()))
            }
            fn set(&self, _key: &str, _value: &str) -> Result<(), AppError> {
                Err(AppError::Store("disk on fire".into()))
            }
        }
        let store = IdentityStore::new(Arc::new(FailingKv), "user");
        assert_eq!(store.load(), None);
        assert!(store.save("x").is_err());
    }

    #[test]
    fn identity_store_uses_its_key_only() {
        let kv = Arc::new(MemoryKvStore::new());
        let store = IdentityStore::new(kv.clone(), "user");
        store.save("raw").unwrap();
        assert_eq!(kv.get("user").unwrap(), Some("raw".into()));
        assert_eq!(kv.get("other").unwrap(), None);
        assert_eq!(store.load(), Some("raw".into()));
    }
}
