//! Per-tab persisted storage.
//!
//! The token, PIN-verified flag, and session start time live in storage
//! scoped to one tab. No cross-tab coordination is attempted: a second tab
//! may still present a challenge after the first tab cleared it. That is
//! documented behavior, not a defect.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::StorageError;

/// Storage keys used by the session gate.
pub mod keys {
    pub const TOKEN: &str = "token";
    pub const EMAIL: &str = "email";
    pub const SESSION_START_TIME: &str = "session_start_time";
    pub const PIN_VERIFIED: &str = "pin_verified";
}

/// Key/value storage with per-tab lifetime.
pub trait TabStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&self, key: &str) -> Result<(), StorageError>;
    /// Remove every key. Used by logout.
    fn clear(&self) -> Result<(), StorageError>;
}

/// In-memory store for tests and embedders that manage persistence
/// themselves.
#[derive(Debug, Default)]
pub struct MemoryTabStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryTabStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TabStore for MemoryTabStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.values.lock().expect("store poisoned").get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.values
            .lock()
            .expect("store poisoned")
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.values.lock().expect("store poisoned").remove(key);
        Ok(())
    }

    fn clear(&self) -> Result<(), StorageError> {
        self.values.lock().expect("store poisoned").clear();
        Ok(())
    }
}

/// File-backed store: a flat JSON map in `<state_dir>/session.json`.
///
/// The file contains the session token, so it is written with 0600
/// permissions on unix.
#[derive(Debug)]
pub struct FileTabStore {
    path: PathBuf,
    cache: Mutex<HashMap<String, String>>,
}

impl FileTabStore {
    pub fn open(state_dir: &Path) -> Result<Self, StorageError> {
        let path = state_dir.join("session.json");
        let cache = match std::fs::read_to_string(&path) {
            Ok(data) => {
                serde_json::from_str(&data).map_err(|e| StorageError::Corrupt {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                })?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => {
                return Err(StorageError::Read {
                    path: path.display().to_string(),
                    source: e,
                });
            }
        };
        Ok(Self {
            path,
            cache: Mutex::new(cache),
        })
    }

    fn flush(&self, snapshot: &HashMap<String, String>) -> Result<(), StorageError> {
        let write_err = |e: std::io::Error| StorageError::Write {
            path: self.path.display().to_string(),
            source: e,
        };

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }

        let json = serde_json::to_string_pretty(snapshot).map_err(|e| StorageError::Corrupt {
            path: self.path.display().to_string(),
            reason: e.to_string(),
        })?;
        std::fs::write(&self.path, json).map_err(write_err)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            std::fs::set_permissions(&self.path, perms).map_err(write_err)?;
        }

        Ok(())
    }
}

impl TabStore for FileTabStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.cache.lock().expect("store poisoned").get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut cache = self.cache.lock().expect("store poisoned");
        cache.insert(key.to_string(), value.to_string());
        self.flush(&cache)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut cache = self.cache.lock().expect("store poisoned");
        if cache.remove(key).is_some() {
            self.flush(&cache)?;
        }
        Ok(())
    }

    fn clear(&self) -> Result<(), StorageError> {
        let mut cache = self.cache.lock().expect("store poisoned");
        cache.clear();
        self.flush(&cache)
    }
}
