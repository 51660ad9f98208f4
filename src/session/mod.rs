//! Session entity module.
//!
//! This module provides the in-memory session type with change tracking,
//! session identifiers, and the field naming scheme used to flatten a
//! session into a stored hash.

mod entity;
pub mod fields;
mod id;

pub use entity::{now_millis, Session};
pub use fields::FieldChange;
pub use id::SessionId;
