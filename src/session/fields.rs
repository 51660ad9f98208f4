//! Hash field naming scheme for stored sessions.

use serde_json::Value;

use crate::error::SessionStoreError;
use crate::Result;

/// Prefix of every field that carries a session attribute.
pub const SESSION_ATTR_PREFIX: &str = "sessionAttr:";
/// Field holding the creation time in epoch milliseconds.
pub const CREATION_TIME_FIELD: &str = "creationTime";
/// Field holding the last access time in epoch milliseconds.
pub const LAST_ACCESSED_TIME_FIELD: &str = "lastAccessedTime";
/// Field holding the max inactive interval in seconds.
pub const MAX_INACTIVE_INTERVAL_FIELD: &str = "maxInactiveInterval";

/// A pending change to one stored field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldChange {
    /// Write the field with this value.
    Set(Value),
    /// Delete the field from the hash.
    Removed,
}

impl FieldChange {
    /// The value to write, or `None` for a removal.
    pub fn value(&self) -> Option<&Value> {
        match self {
            FieldChange::Set(value) => Some(value),
            FieldChange::Removed => None,
        }
    }

    pub fn is_removal(&self) -> bool {
        matches!(self, FieldChange::Removed)
    }
}

/// Field name under which attribute `name` is stored.
pub fn attribute_field(name: &str) -> String {
    format!("{SESSION_ATTR_PREFIX}{name}")
}

/// Attribute name carried by `field`, if it is an attribute field.
pub fn attribute_name(field: &str) -> Option<&str> {
    field.strip_prefix(SESSION_ATTR_PREFIX)
}

pub(crate) fn read_i64(field: &str, value: &Value) -> Result<i64> {
    value.as_i64().ok_or_else(|| SessionStoreError::MalformedField {
        field: field.to_string(),
        reason: format!("expected integer, found {value}"),
    })
}

pub(crate) fn read_i32(field: &str, value: &Value) -> Result<i32> {
    let wide = read_i64(field, value)?;
    i32::try_from(wide).map_err(|_| SessionStoreError::MalformedField {
        field: field.to_string(),
        reason: format!("{wide} is out of range"),
    })
}
