use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("storage serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Synchronous string key/value persistence, shaped like browser local storage.
///
/// Batch writes are all-or-nothing from a reader's point of view.
pub trait KeyValueStore: Send + Sync {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError>;

    fn set_items(&self, entries: &[(&str, String)]) -> Result<(), StorageError>;

    fn remove_items(&self, keys: &[&str]) -> Result<(), StorageError>;

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.set_items(&[(key, value.to_string())])
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        self.remove_items(&[key])
    }
}

fn lock(entries: &Mutex<BTreeMap<String, String>>) -> MutexGuard<'_, BTreeMap<String, String>> {
    entries
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(lock(&self.entries).get(key).cloned())
    }

    fn set_items(&self, entries: &[(&str, String)]) -> Result<(), StorageError> {
        let mut map = lock(&self.entries);
        for (key, value) in entries {
            map.insert((*key).to_string(), value.clone());
        }
        Ok(())
    }

    fn remove_items(&self, keys: &[&str]) -> Result<(), StorageError> {
        let mut map = lock(&self.entries);
        for key in keys {
            map.remove(*key);
        }
        Ok(())
    }
}

/// Key/value entries kept as one JSON object on disk.
///
/// Every write replaces the file through a sibling temp file and a rename, so
/// the file on disk is always a complete snapshot.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl FileStorage {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        let entries = match fs::read_to_string(&path) {
            Ok(raw) if raw.trim().is_empty() => BTreeMap::new(),
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|err| {
                tracing::warn!(path = %path.display(), error = %err, "Discarding malformed session file");
                BTreeMap::new()
            }),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(err) => return Err(err.into()),
        };
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, entries: &BTreeMap<String, String>) -> Result<(), StorageError> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        let body = serde_json::to_vec_pretty(entries)?;
        let tmp = dir.join(format!(
            ".{}.tmp",
            self.path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| "session".to_string())
        ));
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(&body)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn update<F>(&self, apply: F) -> Result<(), StorageError>
    where
        F: FnOnce(&mut BTreeMap<String, String>),
    {
        let mut current = lock(&self.entries);
        let mut next = current.clone();
        apply(&mut next);
        self.persist(&next)?;
        *current = next;
        Ok(())
    }
}

impl KeyValueStore for FileStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(lock(&self.entries).get(key).cloned())
    }

    fn set_items(&self, entries: &[(&str, String)]) -> Result<(), StorageError> {
        self.update(|map| {
            for (key, value) in entries {
                map.insert((*key).to_string(), value.clone());
            }
        })
    }

    fn remove_items(&self, keys: &[&str]) -> Result<(), StorageError> {
        self.update(|map| {
            for key in keys {
                map.remove(*key);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_storage_sets_reads_and_removes() {
        let storage = MemoryStorage::new();
        storage
            .set_items(&[("a", "1".into()), ("b", "2".into())])
            .unwrap();
        assert_eq!(storage.get_item("a").unwrap().as_deref(), Some("1"));
        storage.remove_item("a").unwrap();
        assert_eq!(storage.get_item("a").unwrap(), None);
        assert_eq!(storage.get_item("b").unwrap().as_deref(), Some("2"));
    }

    #[test]
    fn file_storage_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("session.json");

        let storage = FileStorage::open(&path).unwrap();
        storage.set_item("deviceId", "device-abc").unwrap();
        storage
            .set_items(&[("accessToken", "t1".into()), ("tokenExpiry", "10".into())])
            .unwrap();
        storage.remove_item("tokenExpiry").unwrap();
        drop(storage);

        let reopened = FileStorage::open(&path).unwrap();
        assert_eq!(
            reopened.get_item("deviceId").unwrap().as_deref(),
            Some("device-abc")
        );
        assert_eq!(reopened.get_item("accessToken").unwrap().as_deref(), Some("t1"));
        assert_eq!(reopened.get_item("tokenExpiry").unwrap(), None);
        assert_eq!(reopened.path(), path.as_path());
    }

    #[test]
    fn file_storage_treats_malformed_file_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        fs::write(&path, "{not json").unwrap();

        let storage = FileStorage::open(&path).unwrap();
        assert_eq!(storage.get_item("accessToken").unwrap(), None);

        storage.set_item("accessToken", "fresh").unwrap();
        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.contains("fresh"));
    }
}
