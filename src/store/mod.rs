//! Hash store capability.
//!
//! The repository only needs a handful of operations on a keyed hash-map
//! store. Anything that offers them (Redis `HGETALL`/`HMSET`/`HDEL`/`DEL`/
//! `EXPIRE`, or the in-process [`MemoryStore`]) can back a session repository.

mod memory;

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::Result;

pub use memory::MemoryStore;

/// A keyed store of hashes with per-key expiry.
///
/// Failures are reported as [`crate::SessionStoreError::Store`] and are never
/// retried by callers in this crate.
pub trait HashStore: Send + Sync {
    /// All fields of the hash at `key`. An absent key yields an empty map.
    fn get_all_fields(&self, key: &str) -> Result<HashMap<String, Value>>;

    /// Write the given fields into the hash at `key` in one batch.
    fn put_fields(&self, key: &str, fields: HashMap<String, Value>) -> Result<()>;

    /// Delete one field from the hash at `key`.
    fn delete_field(&self, key: &str, field: &str) -> Result<()>;

    /// Delete the whole key. Absent keys are not an error.
    fn delete_key(&self, key: &str) -> Result<()>;

    /// Expire `key` after `seconds`.
    ///
    /// A negative value clears any TTL so the key persists. Zero expires
    /// the key immediately.
    fn expire_key_after(&self, key: &str, seconds: i64) -> Result<()>;
}

impl<S: HashStore + ?Sized> HashStore for Arc<S> {
    fn get_all_fields(&self, key: &str) -> Result<HashMap<String, Value>> {
        (**self).get_all_fields(key)
    }

    fn put_fields(&self, key: &str, fields: HashMap<String, Value>) -> Result<()> {
        (**self).put_fields(key, fields)
    }

    fn delete_field(&self, key: &str, field: &str) -> Result<()> {
        (**self).delete_field(key, field)
    }

    fn delete_key(&self, key: &str) -> Result<()> {
        (**self).delete_key(key)
    }

    fn expire_key_after(&self, key: &str, seconds: i64) -> Result<()> {
        (**self).expire_key_after(key, seconds)
    }
}

impl<S: HashStore + ?Sized> HashStore for &S {
    fn get_all_fields(&self, key: &str) -> Result<HashMap<String, Value>> {
        (**self).get_all_fields(key)
    }

    fn put_fields(&self, key: &str, fields: HashMap<String, Value>) -> Result<()> {
        (**self).put_fields(key, fields)
    }

    fn delete_field(&self, key: &str, field: &str) -> Result<()> {
        (**self).delete_field(key, field)
    }

    fn delete_key(&self, key: &str) -> Result<()> {
        (**self).delete_key(key)
    }

    fn expire_key_after(&self, key: &str, seconds: i64) -> Result<()> {
        (**self).expire_key_after(key, seconds)
    }
}
