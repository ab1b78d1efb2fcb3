//! TTL-stamped cache store for catalog and isochrone records.

use super::{Storage, StorageError};
use crate::entity::{Entity, IsochroneResult};
use crate::time::{Clock, SystemClock};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Storage key for the singleton entity catalog record.
pub const ENTITIES_KEY: &str = "entities";

/// Storage key prefix for isochrone-set records; the full key is
/// `isochrones:{travelMode}:{timeBudgetMinutes}`.
pub const ISOCHRONES_KEY_PREFIX: &str = "isochrones";

/// A cached payload together with the wall-clock time it was written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheRecord<T> {
    /// Write time in milliseconds since the Unix epoch
    pub timestamp: u64,
    /// The cached payload
    pub payload: T,
}

/// Stored wire form: either the timestamp envelope or the legacy bare
/// payload written by earlier versions. Resolved once at deserialization
/// time.
#[derive(Deserialize)]
#[serde(untagged)]
enum StoredRecord<T> {
    Enveloped(CacheRecord<T>),
    Legacy(T),
}

/// Borrowing mirror of [`CacheRecord`] for serialization without cloning.
#[derive(Serialize)]
struct CacheRecordRef<'a, T> {
    timestamp: u64,
    payload: &'a T,
}

/// TTL-aware cache over a string key/value [`Storage`] medium.
///
/// Holds two record kinds: the singleton entity catalog and one isochrone
/// set per parameter key. Expired records are deleted on read and never
/// served; write failures are swallowed.
pub struct CacheStore<S, K = SystemClock> {
    storage: S,
    clock: K,
}

impl<S: Storage> CacheStore<S> {
    /// Creates a cache store using the system wall clock.
    pub fn new(storage: S) -> Self {
        Self {
            storage,
            clock: SystemClock,
        }
    }
}

impl<S: Storage, K: Clock> CacheStore<S, K> {
    /// Creates a cache store with an injected clock (used by tests to
    /// drive TTL expiry deterministically).
    pub fn with_clock(storage: S, clock: K) -> Self {
        Self { storage, clock }
    }

    /// Persists the entity catalog under the singleton key.
    pub fn save_entities(&self, entities: &[Entity]) {
        self.save_record(ENTITIES_KEY, &entities);
    }

    /// Loads the entity catalog, discarding it when older than `ttl`.
    pub fn load_entities(&self, ttl: Option<Duration>) -> Option<Vec<Entity>> {
        self.load_record(ENTITIES_KEY, ttl).map(|r| r.payload)
    }

    /// Like [`CacheStore::load_entities`] but also exposes the write
    /// timestamp, for cache-provenance display.
    pub fn load_entities_entry(&self, ttl: Option<Duration>) -> Option<CacheRecord<Vec<Entity>>> {
        self.load_record(ENTITIES_KEY, ttl)
    }

    /// Persists an isochrone set under `isochrones:{parameter_key}`.
    pub fn save_isochrones(&self, parameter_key: &str, results: &[IsochroneResult]) {
        self.save_record(&Self::isochrones_key(parameter_key), &results);
    }

    /// Loads the isochrone set for `parameter_key`, discarding it when
    /// older than `ttl`.
    pub fn load_isochrones(
        &self,
        parameter_key: &str,
        ttl: Option<Duration>,
    ) -> Option<Vec<IsochroneResult>> {
        self.load_record(&Self::isochrones_key(parameter_key), ttl)
            .map(|r| r.payload)
    }

    /// Like [`CacheStore::load_isochrones`] but also exposes the write
    /// timestamp.
    pub fn load_isochrones_entry(
        &self,
        parameter_key: &str,
        ttl: Option<Duration>,
    ) -> Option<CacheRecord<Vec<IsochroneResult>>> {
        self.load_record(&Self::isochrones_key(parameter_key), ttl)
    }

    /// Deletes the catalog record and every isochrone record regardless of
    /// parameter key.
    pub fn clear_all(&self) {
        self.storage.remove(ENTITIES_KEY);
        for key in self.storage.keys() {
            if key == ISOCHRONES_KEY_PREFIX
                || key.starts_with(&format!("{ISOCHRONES_KEY_PREFIX}:"))
            {
                self.storage.remove(&key);
            }
        }
    }

    fn isochrones_key(parameter_key: &str) -> String {
        format!("{ISOCHRONES_KEY_PREFIX}:{parameter_key}")
    }

    /// Serializes and writes a timestamped record. Quota and serialization
    /// failures are logged and swallowed; the caller observes no effect.
    fn save_record<T: Serialize>(&self, key: &str, payload: &T) {
        let record = CacheRecordRef {
            timestamp: self.clock.now_millis(),
            payload,
        };
        let json = match serde_json::to_string(&record) {
            Ok(json) => json,
            Err(err) => {
                debug!(key, error = %StorageError::Serialization(err.to_string()),
                    "cache record not written");
                return;
            }
        };
        if let Err(err) = self.storage.set(key, &json) {
            debug!(key, error = %err, "cache record not written");
        }
    }

    /// Reads a record, accepting both the enveloped and the legacy bare
    /// form. A legacy record is treated as freshly timestamped. An expired
    /// record is deleted and reported absent.
    fn load_record<T: DeserializeOwned>(
        &self,
        key: &str,
        ttl: Option<Duration>,
    ) -> Option<CacheRecord<T>> {
        let raw = self.storage.get(key)?;

        let record = match serde_json::from_str::<StoredRecord<T>>(&raw) {
            Ok(StoredRecord::Enveloped(record)) => record,
            Ok(StoredRecord::Legacy(payload)) => CacheRecord {
                timestamp: self.clock.now_millis(),
                payload,
            },
            Err(err) => {
                debug!(key, error = %err, "unreadable cache record ignored");
                return None;
            }
        };

        if let Some(ttl) = ttl {
            let age = self.clock.now_millis().saturating_sub(record.timestamp);
            if age > ttl.as_millis() as u64 {
                debug!(key, age_ms = age, "expired cache record deleted");
                self.storage.remove(key);
                return None;
            }
        }

        Some(record)
    }
}
