//! Key-value persistence for the ledger.
//!
//! Each key holds an independent string (plain text or a JSON blob). There is
//! no schema versioning; readers fail closed on anything they can't parse.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::StorageError;

pub const TASKS_KEY: &str = "tasks";
pub const DAY_PLAN_KEY: &str = "day_plan";
pub const AI_ADVICE_KEY: &str = "ai_advice";
pub const LANGUAGE_KEY: &str = "selected_language";
pub const MEMORY_BANK_KEY: &str = "memory_bank";
pub const REPORTS_KEY: &str = "reports";
pub const UNDO_KEY: &str = "last_deleted";

pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&mut self, key: &str) -> Result<(), StorageError>;
}

impl<S: KeyValueStore + ?Sized> KeyValueStore for Box<S> {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        (**self).get(key)
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        (**self).set(key, value)
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        (**self).remove(key)
    }
}

/// Read a JSON blob, treating a missing, unreadable or corrupt value as `None`.
pub fn load_json<T: DeserializeOwned>(kv: &dyn KeyValueStore, key: &str) -> Option<T> {
    let raw = match kv.get(key) {
        Ok(Some(raw)) => raw,
        Ok(None) => return None,
        Err(e) => {
            tracing::warn!(key, error = %e, "failed to read stored value");
            return None;
        }
    };
    match serde_json::from_str(&raw) {
        Ok(v) => Some(v),
        Err(e) => {
            tracing::warn!(key, error = %e, "discarding corrupt stored value");
            None
        }
    }
}

pub fn save_json<T: Serialize + ?Sized>(
    kv: &mut dyn KeyValueStore,
    key: &str,
    value: &T,
) -> Result<(), StorageError> {
    let raw = serde_json::to_string(value)?;
    kv.set(key, &raw)
}

/// Write `value`, or remove the key when it is empty.
pub fn set_or_clear(kv: &mut dyn KeyValueStore, key: &str, value: &str) -> Result<(), StorageError> {
    if value.is_empty() {
        kv.remove(key)
    } else {
        kv.set(key, value)
    }
}

#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    entries: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        self.entries.remove(key);
        Ok(())
    }
}

/// One file per key under `root`. Writes go through a temp file + rename.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|source| StorageError::Io {
            key: root.display().to_string(),
            source,
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        let ok = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !ok {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(key))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let p = self.path_for(key)?;
        match fs::read_to_string(&p) {
            Ok(s) => Ok(Some(s)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StorageError::Io {
                key: key.to_string(),
                source,
            }),
        }
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        let p = self.path_for(key)?;
        let tmp = p.with_extension("tmp");
        let io = |source| StorageError::Io {
            key: key.to_string(),
            source,
        };
        fs::write(&tmp, value).map_err(io)?;
        fs::rename(&tmp, &p).map_err(io)
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        let p = self.path_for(key)?;
        match fs::remove_file(&p) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StorageError::Io {
                key: key.to_string(),
                source,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_store_round_trips_and_removes() {
        let dir = tempfile::tempdir().unwrap();
        let mut fs_store = FileStore::open(dir.path().join("store")).unwrap();

        assert_eq!(fs_store.get(DAY_PLAN_KEY).unwrap(), None);
        fs_store.set(DAY_PLAN_KEY, "[09:00] >> Gym || go").unwrap();
        assert_eq!(
            fs_store.get(DAY_PLAN_KEY).unwrap().as_deref(),
            Some("[09:00] >> Gym || go")
        );

        fs_store.remove(DAY_PLAN_KEY).unwrap();
        assert_eq!(fs_store.get(DAY_PLAN_KEY).unwrap(), None);
        // removing twice is fine
        fs_store.remove(DAY_PLAN_KEY).unwrap();
    }

    #[test]
    fn file_store_rejects_path_like_keys() {
        let dir = tempfile::tempdir().unwrap();
        let mut fs_store = FileStore::open(dir.path()).unwrap();
        assert!(matches!(
            fs_store.set("../escape", "x"),
            Err(StorageError::InvalidKey(_))
        ));
    }

    #[test]
    fn corrupt_json_loads_as_none() {
        let mut kv = MemoryStore::new();
        kv.set(REPORTS_KEY, "{not json").unwrap();
        let out: Option<Vec<String>> = load_json(&kv, REPORTS_KEY);
        assert!(out.is_none());
    }

    #[test]
    fn empty_value_clears_key() {
        let mut kv = MemoryStore::new();
        kv.set(AI_ADVICE_KEY, "stay sharp").unwrap();
        set_or_clear(&mut kv, AI_ADVICE_KEY, "").unwrap();
        assert!(kv.is_empty());
    }
}
