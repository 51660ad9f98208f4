//! In-process hash store with TTL support.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use serde_json::Value;

use super::HashStore;
use crate::error::SessionStoreError;
use crate::Result;

/// One stored hash.
#[derive(Debug, Clone)]
struct Entry {
    fields: HashMap<String, Value>,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|deadline| now >= deadline)
    }
}

/// Thread-safe in-memory [`HashStore`].
///
/// Keys past their TTL are dropped lazily when touched, the way Redis
/// treats passive expiry. Sessions stored here do not survive a restart
/// and are not shared between processes; it is meant for tests and
/// single-node development.
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Entry>>,
}

impl MemoryStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Check if a live key exists.
    pub fn contains_key(&self, key: &str) -> Result<bool> {
        let entries = self
            .entries
            .read()
            .map_err(|_| SessionStoreError::LockPoisoned)?;
        let now = Instant::now();
        Ok(entries.get(key).is_some_and(|entry| !entry.is_expired(now)))
    }

    /// Remaining time to live of `key`, or `None` if it is absent or persistent.
    pub fn ttl(&self, key: &str) -> Result<Option<Duration>> {
        let entries = self
            .entries
            .read()
            .map_err(|_| SessionStoreError::LockPoisoned)?;
        let now = Instant::now();
        Ok(entries
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .and_then(|entry| entry.expires_at)
            .map(|deadline| deadline.saturating_duration_since(now)))
    }

    /// Number of live keys.
    pub fn count(&self) -> Result<usize> {
        let entries = self
            .entries
            .read()
            .map_err(|_| SessionStoreError::LockPoisoned)?;
        let now = Instant::now();
        Ok(entries.values().filter(|e| !e.is_expired(now)).count())
    }

    /// Drop every key whose TTL has elapsed.
    ///
    /// Returns the number of keys removed.
    pub fn purge_expired(&self) -> Result<usize> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| SessionStoreError::LockPoisoned)?;

        let now = Instant::now();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        let removed = before - entries.len();
        if removed > 0 {
            tracing::debug!(removed, "purged expired keys");
        }
        Ok(removed)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl HashStore for MemoryStore {
    fn get_all_fields(&self, key: &str) -> Result<HashMap<String, Value>> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| SessionStoreError::LockPoisoned)?;

        if entries
            .get(key)
            .is_some_and(|entry| entry.is_expired(Instant::now()))
        {
            tracing::trace!(key, "dropping expired key on read");
            entries.remove(key);
        }

        Ok(entries
            .get(key)
            .map(|entry| entry.fields.clone())
            .unwrap_or_default())
    }

    fn put_fields(&self, key: &str, fields: HashMap<String, Value>) -> Result<()> {
        if fields.is_empty() {
            return Ok(());
        }
        let mut entries = self
            .entries
            .write()
            .map_err(|_| SessionStoreError::LockPoisoned)?;

        let now = Instant::now();
        let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
            fields: HashMap::new(),
            expires_at: None,
        });
        if entry.is_expired(now) {
            entry.fields.clear();
            entry.expires_at = None;
        }
        tracing::trace!(key, count = fields.len(), "put fields");
        entry.fields.extend(fields);
        Ok(())
    }

    fn delete_field(&self, key: &str, field: &str) -> Result<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| SessionStoreError::LockPoisoned)?;

        if let Some(entry) = entries.get_mut(key) {
            entry.fields.remove(field);
            if entry.fields.is_empty() {
                entries.remove(key);
            }
        }
        tracing::trace!(key, field, "delete field");
        Ok(())
    }

    fn delete_key(&self, key: &str) -> Result<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| SessionStoreError::LockPoisoned)?;
        entries.remove(key);
        tracing::trace!(key, "delete key");
        Ok(())
    }

    fn expire_key_after(&self, key: &str, seconds: i64) -> Result<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| SessionStoreError::LockPoisoned)?;

        let now = Instant::now();
        if seconds == 0 {
            entries.remove(key);
            return Ok(());
        }
        if let Some(entry) = entries.get_mut(key).filter(|e| !e.is_expired(now)) {
            // A deadline past what `Instant` can represent never arrives.
            entry.expires_at = u64::try_from(seconds)
                .ok()
                .and_then(|secs| now.checked_add(Duration::from_secs(secs)));
        }
        tracing::trace!(key, seconds, "expire key");
        Ok(())
    }
}
