//! Remote key-value mirror.
//!
//! The remote side is best-effort: callers treat any error as "remote unavailable" and
//! carry on with the local result. Payloads are JSON values addressed by the logical
//! keys in [`crate::core::schemas`].

use crate::core::error::SpaceError;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub trait RemoteMirror {
    fn get(&self, key: &str) -> Result<Option<JsonValue>, SpaceError>;
    fn set(&self, key: &str, payload: &JsonValue) -> Result<(), SpaceError>;
    fn clear(&self, key: &str) -> Result<(), SpaceError>;
}

/// In-process mirror. Clones share the same map, so a host can keep a handle for
/// inspection while the store owns another.
#[derive(Debug, Clone, Default)]
pub struct MemoryMirror {
    entries: Arc<Mutex<BTreeMap<String, JsonValue>>>,
    offline: Arc<AtomicBool>,
    set_calls: Arc<AtomicUsize>,
}

impl MemoryMirror {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an outage: every call fails with `RemoteUnavailable` while set.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn set_calls(&self) -> usize {
        self.set_calls.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> BTreeMap<String, JsonValue> {
        self.entries.lock().map(|map| map.clone()).unwrap_or_default()
    }

    pub fn insert(&self, key: &str, payload: JsonValue) {
        if let Ok(mut map) = self.entries.lock() {
            map.insert(key.to_string(), payload);
        }
    }

    fn check_online(&self) -> Result<(), SpaceError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(SpaceError::RemoteUnavailable("memory mirror offline".to_string()));
        }
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, JsonValue>>, SpaceError> {
        self.entries
            .lock()
            .map_err(|_| SpaceError::RemoteUnavailable("memory mirror lock poisoned".to_string()))
    }
}

impl RemoteMirror for MemoryMirror {
    fn get(&self, key: &str) -> Result<Option<JsonValue>, SpaceError> {
        self.check_online()?;
        Ok(self.lock()?.get(key).cloned())
    }

    fn set(&self, key: &str, payload: &JsonValue) -> Result<(), SpaceError> {
        self.check_online()?;
        self.set_calls.fetch_add(1, Ordering::SeqCst);
        self.lock()?.insert(key.to_string(), payload.clone());
        Ok(())
    }

    fn clear(&self, key: &str) -> Result<(), SpaceError> {
        self.check_online()?;
        self.lock()?.remove(key);
        Ok(())
    }
}

/// Mirror backed by a directory of JSON files, one per key. Useful as a shared-folder
/// sync target.
#[derive(Debug, Clone)]
pub struct DirMirror {
    root: PathBuf,
}

impl DirMirror {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let file: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '.' { c } else { '_' })
            .collect();
        self.root.join(format!("{}.json", file))
    }

    fn unavailable(err: impl std::fmt::Display) -> SpaceError {
        SpaceError::RemoteUnavailable(err.to_string())
    }
}

impl RemoteMirror for DirMirror {
    fn get(&self, key: &str) -> Result<Option<JsonValue>, SpaceError> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&path).map_err(Self::unavailable)?;
        if raw.trim().is_empty() {
            return Ok(None);
        }
        serde_json::from_str(&raw).map(Some).map_err(Self::unavailable)
    }

    fn set(&self, key: &str, payload: &JsonValue) -> Result<(), SpaceError> {
        fs::create_dir_all(&self.root).map_err(Self::unavailable)?;
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        let body = serde_json::to_string(payload).map_err(Self::unavailable)?;
        fs::write(&tmp, body).map_err(Self::unavailable)?;
        fs::rename(&tmp, &path).map_err(Self::unavailable)?;
        Ok(())
    }

    fn clear(&self, key: &str) -> Result<(), SpaceError> {
        let path = self.path_for(key);
        if path.exists() {
            fs::remove_file(&path).map_err(Self::unavailable)?;
        }
        Ok(())
    }
}
