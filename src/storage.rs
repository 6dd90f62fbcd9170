use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use crate::error::{Error, Result};

/// Fixed logical keys of the key-value store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKey {
    Projects,
    CurrentProject,
    Sessions,
    CustomPrompt,
    FontFamily,
    FontSize,
}

impl StorageKey {
    pub fn as_str(self) -> &'static str {
        match self {
            StorageKey::Projects => "projects",
            StorageKey::CurrentProject => "current-project",
            StorageKey::Sessions => "sessions",
            StorageKey::CustomPrompt => "custom-prompt",
            StorageKey::FontFamily => "font-family",
            StorageKey::FontSize => "font-size",
        }
    }
}

/// Raw string storage. Implementations hold their own synchronization so a
/// single store can be shared by every component.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> io::Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> io::Result<()>;
    fn remove(&self, key: &str) -> io::Result<()>;
}

/// One `<key>.json` file per key inside a directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        FileStore { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> io::Result<Option<String>> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn set(&self, key: &str, value: &str) -> io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        // Write to a sibling file first so a crash never leaves half a value.
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value)?;
        fs::rename(&tmp, &path)
    }

    fn remove(&self, key: &str) -> io::Result<()> {
        match fs::remove_file(self.path_for(key)) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}

/// Process-local store, used by tests and when no data directory exists.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail, like a full quota would.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> io::Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::Other, "storage quota exceeded"));
        }
        Ok(())
    }

    fn values(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        // A poisoned map is still a valid map.
        self.values.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> io::Result<Option<String>> {
        Ok(self.values().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> io::Result<()> {
        self.check_writable()?;
        self.values().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> io::Result<()> {
        self.check_writable()?;
        self.values().remove(key);
        Ok(())
    }
}

/// Backend key holding the last value of `key` that could not be read.
pub fn unreadable_key(key: StorageKey) -> String {
    format!("{}.unreadable", key.as_str())
}

/// Typed JSON access on top of a shared [`KeyValueStore`].
///
/// Reads never fail: a value that is missing, unreadable or unparsable is
/// reported as absent. Writes return an error the caller can surface.
#[derive(Clone)]
pub struct Storage {
    backend: Arc<dyn KeyValueStore>,
}

impl Storage {
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Storage { backend }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    pub fn load<T: DeserializeOwned>(&self, key: StorageKey) -> Option<T> {
        let raw = self.read(key)?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key = key.as_str(), error = %e, "ignoring unparsable stored value");
                self.keep_unreadable(key, &raw);
                None
            }
        }
    }

    /// Load a JSON array element by element. Elements that do not parse are
    /// skipped; a value that is not an array at all reads as absent.
    pub fn load_list<T: DeserializeOwned>(&self, key: StorageKey) -> Option<Vec<T>> {
        let raw = self.read(key)?;
        let elements: Vec<serde_json::Value> = match serde_json::from_str(&raw) {
            Ok(elements) => elements,
            Err(e) => {
                warn!(key = key.as_str(), error = %e, "ignoring unparsable stored list");
                self.keep_unreadable(key, &raw);
                return None;
            }
        };

        let total = elements.len();
        let items: Vec<T> = elements
            .into_iter()
            .filter_map(|element| {
                serde_json::from_value(element)
                    .inspect_err(|e| warn!(key = key.as_str(), error = %e, "skipping unreadable element"))
                    .ok()
            })
            .collect();
        if items.len() < total {
            self.keep_unreadable(key, &raw);
        }
        Some(items)
    }

    fn read(&self, key: StorageKey) -> Option<String> {
        match self.backend.get(key.as_str()) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(key = key.as_str(), error = %e, "failed to read stored value");
                None
            }
        }
    }

    /// Copy a value that could not be read in full to `<key>.unreadable`,
    /// so the next save under `key` does not destroy it.
    fn keep_unreadable(&self, key: StorageKey, raw: &str) {
        let backup = unreadable_key(key);
        match self.backend.set(&backup, raw) {
            Ok(()) => warn!(key = key.as_str(), backup = %backup, "kept a copy of the unreadable value"),
            Err(e) => warn!(key = key.as_str(), error = %e, "could not keep a copy of the unreadable value"),
        }
    }

    pub fn save<T: Serialize + ?Sized>(&self, key: StorageKey, value: &T) -> Result<()> {
        let json = serde_json::to_string(value)?;
        self.backend
            .set(key.as_str(), &json)
            .map_err(|source| Error::Persistence {
                key: key.as_str().to_string(),
                source,
            })
            .inspect_err(|e| warn!(error = %e, "failed to persist value"))
    }

    pub fn remove(&self, key: StorageKey) -> Result<()> {
        self.backend
            .remove(key.as_str())
            .map_err(|source| Error::Persistence {
                key: key.as_str().to_string(),
                source,
            })
    }
}
