//! String key/value storage abstraction.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Default quota for the in-memory storage backend (5 MiB, mirroring the
/// per-origin budget of typical browser local storage).
pub const DEFAULT_QUOTA_BYTES: usize = 5 * 1024 * 1024;

/// Storage-level errors.
///
/// These never cross the cache store's public contract; the store swallows
/// them and the caller observes a no-op write.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    /// The write would exceed the storage medium's size quota
    #[error("storage quota exceeded: {attempted} bytes over a {quota} byte quota")]
    QuotaExceeded {
        /// Total bytes the write would have brought the store to
        attempted: usize,
        /// Configured quota in bytes
        quota: usize,
    },

    /// The payload could not be serialized
    #[error("serialization failed: {0}")]
    Serialization(String),
}

/// A string-keyed storage medium with a finite quota.
///
/// Mirrors the minimal contract of browser local storage: get/set/remove
/// plus key enumeration for prefix cleanup. Writes may fail; reads and
/// removes never do.
pub trait Storage: Send + Sync {
    /// Returns the value stored under `key`, if any.
    fn get(&self, key: &str) -> Option<String>;

    /// Stores `value` under `key`, replacing any previous value.
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Removes the value stored under `key`, if any.
    fn remove(&self, key: &str);

    /// Returns every key currently present.
    fn keys(&self) -> Vec<String>;
}

impl<S: Storage + ?Sized> Storage for Arc<S> {
    fn get(&self, key: &str) -> Option<String> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) {
        (**self).remove(key)
    }

    fn keys(&self) -> Vec<String> {
        (**self).keys()
    }
}

/// In-memory storage backend with a byte quota.
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
    quota_bytes: usize,
}

impl MemoryStorage {
    /// Creates a store with the default 5 MiB quota.
    pub fn new() -> Self {
        Self::with_quota(DEFAULT_QUOTA_BYTES)
    }

    /// Creates a store with a custom byte quota.
    pub fn with_quota(quota_bytes: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            quota_bytes,
        }
    }

    /// Returns the total stored size in bytes (keys plus values).
    pub fn size_bytes(&self) -> usize {
        let entries = self.entries.lock().expect("storage lock poisoned");
        entries.iter().map(|(k, v)| k.len() + v.len()).sum()
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Option<String> {
        let entries = self.entries.lock().expect("storage lock poisoned");
        entries.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().expect("storage lock poisoned");

        let current: usize = entries.iter().map(|(k, v)| k.len() + v.len()).sum();
        let replaced = entries.get(key).map(|v| key.len() + v.len()).unwrap_or(0);
        let attempted = current - replaced + key.len() + value.len();
        if attempted > self.quota_bytes {
            return Err(StorageError::QuotaExceeded {
                attempted,
                quota: self.quota_bytes,
            });
        }

        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) {
        let mut entries = self.entries.lock().expect("storage lock poisoned");
        entries.remove(key);
    }

    fn keys(&self) -> Vec<String> {
        let entries = self.entries.lock().expect("storage lock poisoned");
        entries.keys().cloned().collect()
    }
}
