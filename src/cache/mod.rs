//! TTL-aware persistent caching for catalog and isochrone records.
//!
//! The cache sits on top of a simple string key/value [`Storage`] medium
//! with a finite quota. Records are written with a wall-clock timestamp
//! envelope so expiry survives process restarts; legacy records written
//! without the envelope are still read successfully.
//!
//! Write failures (quota or serialization) are swallowed at this boundary:
//! the cache is an accelerator, never a correctness dependency.

mod storage;
mod store;

pub use storage::{MemoryStorage, Storage, StorageError};
pub use store::{CacheRecord, CacheStore, ENTITIES_KEY, ISOCHRONES_KEY_PREFIX};
