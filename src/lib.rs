//! # session-hash-store
//!
//! Web session persistence on hash-structured key-value stores.
//!
//! Sessions are kept in an external store (Redis or anything with the same
//! hash semantics) so they survive restarts and are shared between server
//! instances. Each session is one hash; every mutation is tracked so a save
//! only writes the fields that changed.
//!
//! ## Features
//!
//! - **Delta tracking**: attribute writes, removals and timestamp updates are
//!   recorded per field and flushed in one batch
//! - **Store-enforced expiry**: each save refreshes the key's TTL from the
//!   session's max inactive interval
//! - **Pluggable store**: anything implementing [`HashStore`]; an in-process
//!   [`MemoryStore`] is included
//!
//! ## Quick Start
//!
//! ```
//! use serde_json::json;
//! use session_hash_store::{MemoryStore, SessionRepository};
//!
//! fn main() -> session_hash_store::Result<()> {
//!     session_hash_store::logging::try_init().ok();
//!
//!     let repo = SessionRepository::new(MemoryStore::new());
//!
//!     let mut session = repo.create_session();
//!     session.set_attribute("user", json!("ada"));
//!     repo.save(&mut session)?;
//!
//!     let loaded = repo.get_session(session.id())?.expect("session was saved");
//!     assert_eq!(loaded.attribute("user"), Some(&json!("ada")));
//!
//!     repo.delete(session.id())?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod repository;
pub mod session;
pub mod store;

// Re-export commonly used types
pub use config::{Config, ConfigError};
pub use error::{Result, SessionStoreError};
pub use repository::{RepositoryConfig, SessionRepository};
pub use session::{FieldChange, Session, SessionId};
pub use store::{HashStore, MemoryStore};
