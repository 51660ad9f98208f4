//! In-memory session with change tracking.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use super::fields::{
    attribute_field, attribute_name, read_i32, read_i64, FieldChange, CREATION_TIME_FIELD,
    LAST_ACCESSED_TIME_FIELD, MAX_INACTIVE_INTERVAL_FIELD,
};
use super::SessionId;
use crate::error::SessionStoreError;
use crate::Result;

/// Current time in epoch milliseconds.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// A web session whose state lives in a hash-structured store.
///
/// Every mutation is recorded in a delta keyed by store field name, so a
/// save only has to send what changed since the last successful save.
/// A `Session` is owned by one request at a time and is not meant to be
/// shared across threads while it is being mutated.
#[derive(Debug, Clone)]
pub struct Session {
    id: SessionId,
    /// Id under which the session is currently persisted, if any.
    stored_id: Option<SessionId>,
    creation_time: i64,
    last_accessed_time: i64,
    max_inactive_interval: i32,
    attributes: HashMap<String, Value>,
    delta: BTreeMap<String, FieldChange>,
}

impl Session {
    /// Create a brand-new session created now.
    pub fn new(id: SessionId, max_inactive_interval: i32) -> Self {
        Self::new_at(id, max_inactive_interval, now_millis())
    }

    /// Create a brand-new session with an explicit creation time.
    ///
    /// The delta is seeded with the creation time, the last access time and
    /// the max inactive interval. Attributes start empty.
    pub fn new_at(id: SessionId, max_inactive_interval: i32, creation_time: i64) -> Self {
        let mut delta = BTreeMap::new();
        delta.insert(
            CREATION_TIME_FIELD.to_string(),
            FieldChange::Set(Value::from(creation_time)),
        );
        delta.insert(
            LAST_ACCESSED_TIME_FIELD.to_string(),
            FieldChange::Set(Value::from(creation_time)),
        );
        delta.insert(
            MAX_INACTIVE_INTERVAL_FIELD.to_string(),
            FieldChange::Set(Value::from(max_inactive_interval)),
        );

        Self {
            id,
            stored_id: None,
            creation_time,
            last_accessed_time: creation_time,
            max_inactive_interval,
            attributes: HashMap::new(),
            delta,
        }
    }

    /// Rebuild a session from the fields of its stored hash.
    ///
    /// The returned session has an empty delta. Unknown fields are ignored.
    /// A missing `creationTime` is reported as [`SessionStoreError::MissingField`]
    /// so the caller can tell a partial hash from a corrupted one.
    pub fn from_fields(id: SessionId, fields: HashMap<String, Value>) -> Result<Self> {
        let mut creation_time = None;
        let mut last_accessed_time = None;
        let mut max_inactive_interval = None;
        let mut attributes = HashMap::new();

        for (field, value) in fields {
            match field.as_str() {
                CREATION_TIME_FIELD => creation_time = Some(read_i64(&field, &value)?),
                LAST_ACCESSED_TIME_FIELD => last_accessed_time = Some(read_i64(&field, &value)?),
                MAX_INACTIVE_INTERVAL_FIELD => {
                    max_inactive_interval = Some(read_i32(&field, &value)?)
                }
                _ => match attribute_name(&field) {
                    Some(name) if !value.is_null() => {
                        attributes.insert(name.to_string(), value);
                    }
                    Some(_) => {}
                    None => tracing::trace!(field = %field, "ignoring unknown session field"),
                },
            }
        }

        let creation_time =
            creation_time.ok_or(SessionStoreError::MissingField(CREATION_TIME_FIELD))?;
        let max_inactive_interval = max_inactive_interval
            .ok_or(SessionStoreError::MissingField(MAX_INACTIVE_INTERVAL_FIELD))?;
        let last_accessed_time = last_accessed_time
            .unwrap_or(creation_time)
            .max(creation_time);

        Ok(Self {
            stored_id: Some(id.clone()),
            id,
            creation_time,
            last_accessed_time,
            max_inactive_interval,
            attributes,
            delta: BTreeMap::new(),
        })
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn creation_time(&self) -> i64 {
        self.creation_time
    }

    pub fn last_accessed_time(&self) -> i64 {
        self.last_accessed_time
    }

    /// Record an access. Always lands in the delta, even if unchanged,
    /// so the next save refreshes the stored expiry.
    ///
    /// Times before the creation time are clamped to the creation time.
    pub fn set_last_accessed_time(&mut self, last_accessed_time: i64) {
        self.last_accessed_time = last_accessed_time.max(self.creation_time);
        self.delta.insert(
            LAST_ACCESSED_TIME_FIELD.to_string(),
            FieldChange::Set(Value::from(self.last_accessed_time)),
        );
    }

    /// Max inactive interval in seconds. Negative means the session never expires.
    pub fn max_inactive_interval(&self) -> i32 {
        self.max_inactive_interval
    }

    pub fn set_max_inactive_interval(&mut self, interval: i32) {
        self.max_inactive_interval = interval;
        self.delta.insert(
            MAX_INACTIVE_INTERVAL_FIELD.to_string(),
            FieldChange::Set(Value::from(interval)),
        );
    }

    /// Check whether the session has outlived its max inactive interval at `now`.
    pub fn is_expired_at(&self, now: i64) -> bool {
        if self.max_inactive_interval < 0 {
            return false;
        }
        let interval_ms = i64::from(self.max_inactive_interval) * 1000;
        now.saturating_sub(self.last_accessed_time) >= interval_ms
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(now_millis())
    }

    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    /// Read an attribute and deserialize it into `T`.
    pub fn attribute_as<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>> {
        self.attributes
            .get(name)
            .map(|value| serde_json::from_value(value.clone()))
            .transpose()
            .map_err(Into::into)
    }

    /// Set an attribute. A `null` value removes the attribute instead.
    pub fn set_attribute(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        if value.is_null() {
            self.remove_attribute(&name);
            return;
        }
        self.delta.insert(attribute_field(&name), FieldChange::Set(value.clone()));
        self.attributes.insert(name, value);
    }

    /// Serialize `value` and store it as an attribute.
    pub fn set_attribute_as<T: Serialize>(
        &mut self,
        name: impl Into<String>,
        value: &T,
    ) -> Result<()> {
        let value = serde_json::to_value(value)?;
        self.set_attribute(name, value);
        Ok(())
    }

    /// Remove an attribute, returning its previous value.
    ///
    /// The removal is recorded even if the attribute was not set locally,
    /// since the stored hash may still carry the field.
    pub fn remove_attribute(&mut self, name: &str) -> Option<Value> {
        self.delta.insert(attribute_field(name), FieldChange::Removed);
        self.attributes.remove(name)
    }

    /// Snapshot of the current attribute names.
    pub fn attribute_names(&self) -> HashSet<String> {
        self.attributes.keys().cloned().collect()
    }

    /// Assign a fresh id. The repository moves the stored hash on the next save.
    pub fn change_session_id(&mut self) -> SessionId {
        let new_id = SessionId::new();
        self.id = new_id.clone();
        new_id
    }

    /// Changes recorded since construction or the last successful save.
    pub fn delta(&self) -> &BTreeMap<String, FieldChange> {
        &self.delta
    }

    pub fn has_changes(&self) -> bool {
        !self.delta.is_empty()
    }

    /// The complete hash representation of this session.
    pub fn to_fields(&self) -> HashMap<String, Value> {
        let mut fields: HashMap<String, Value> = self
            .attributes
            .iter()
            .map(|(name, value)| (attribute_field(name), value.clone()))
            .collect();
        fields.insert(
            CREATION_TIME_FIELD.to_string(),
            Value::from(self.creation_time),
        );
        fields.insert(
            LAST_ACCESSED_TIME_FIELD.to_string(),
            Value::from(self.last_accessed_time),
        );
        fields.insert(
            MAX_INACTIVE_INTERVAL_FIELD.to_string(),
            Value::from(self.max_inactive_interval),
        );
        fields
    }

    pub(crate) fn stored_id(&self) -> Option<&SessionId> {
        self.stored_id.as_ref()
    }

    pub(crate) fn clear_delta(&mut self) {
        self.delta.clear();
    }

    /// Mark the session as persisted under its current id.
    pub(crate) fn mark_saved(&mut self) {
        self.clear_delta();
        self.stored_id = Some(self.id.clone());
    }
}
