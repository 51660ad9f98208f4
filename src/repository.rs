//! Session repository backed by a [`HashStore`].

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::error::SessionStoreError;
use crate::session::fields::CREATION_TIME_FIELD;
use crate::session::{FieldChange, Session, SessionId};
use crate::store::HashStore;
use crate::Result;

/// Default namespace prepended to every session key.
pub const DEFAULT_NAMESPACE: &str = "session-store";

/// Default max inactive interval for new sessions: 30 minutes.
pub const DEFAULT_MAX_INACTIVE_INTERVAL_SECS: i32 = 1800;

/// Settings owned by a [`SessionRepository`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryConfig {
    /// Namespace used to build store keys (`{namespace}:sessions:{id}`).
    pub namespace: String,
    /// Max inactive interval, in seconds, applied to newly created sessions.
    pub default_max_inactive_interval_secs: i32,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            default_max_inactive_interval_secs: DEFAULT_MAX_INACTIVE_INTERVAL_SECS,
        }
    }
}

impl RepositoryConfig {
    /// Use a custom key namespace.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Use a custom default max inactive interval.
    pub fn with_default_max_inactive_interval(mut self, secs: i32) -> Self {
        self.default_max_inactive_interval_secs = secs;
        self
    }
}

/// Loads, saves and deletes sessions in a hash store.
///
/// Each session lives in one hash under [`SessionRepository::session_key`].
/// Saves only send the fields recorded in the session's delta, then refresh
/// the key's expiry from the session's max inactive interval. Nothing is
/// retried; store failures propagate to the caller.
pub struct SessionRepository<S> {
    store: S,
    config: RepositoryConfig,
}

impl<S: HashStore> SessionRepository<S> {
    /// Create a repository with default settings.
    pub fn new(store: S) -> Self {
        Self::with_config(store, RepositoryConfig::default())
    }

    /// Create a repository with explicit settings.
    pub fn with_config(store: S, config: RepositoryConfig) -> Self {
        Self { store, config }
    }

    /// The backing store.
    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    pub fn default_max_inactive_interval(&self) -> i32 {
        self.config.default_max_inactive_interval_secs
    }

    /// Change the interval given to sessions created from now on.
    ///
    /// Sessions that already exist keep their interval.
    pub fn set_default_max_inactive_interval(&mut self, secs: i32) {
        self.config.default_max_inactive_interval_secs = secs;
    }

    /// Store key holding the session with the given id.
    pub fn session_key(&self, id: &SessionId) -> String {
        format!("{}:sessions:{}", self.config.namespace, id)
    }

    /// Create a fresh, unsaved session.
    pub fn create_session(&self) -> Session {
        let session = Session::new(SessionId::new(), self.default_max_inactive_interval());
        debug!(session_id = %session.id(), "created session");
        session
    }

    /// Persist the session's pending changes and refresh its expiry.
    ///
    /// The delta is cleared only once every store call has succeeded. If
    /// the field writes succeed and the expiry call fails, the stored key
    /// keeps its previous TTL and the error is returned.
    pub fn save(&self, session: &mut Session) -> Result<()> {
        let key = self.session_key(session.id());

        match session.stored_id() {
            Some(old_id) if old_id != session.id() => {
                let old_key = self.session_key(old_id);
                debug!(
                    session_id = %session.id(),
                    old_session_id = %old_id,
                    "moving session to new id"
                );
                self.store.put_fields(&key, session.to_fields())?;
                self.store.delete_key(&old_key)?;
            }
            _ => self.write_delta(&key, session)?,
        }

        self.store
            .expire_key_after(&key, i64::from(session.max_inactive_interval()))?;

        session.mark_saved();
        Ok(())
    }

    fn write_delta(&self, key: &str, session: &Session) -> Result<()> {
        if !session.has_changes() {
            return Ok(());
        }

        let mut writes = HashMap::new();
        let mut removals = Vec::new();
        for (field, change) in session.delta() {
            match change {
                FieldChange::Set(value) => {
                    writes.insert(field.clone(), value.clone());
                }
                FieldChange::Removed => removals.push(field.as_str()),
            }
        }

        debug!(
            session_id = %session.id(),
            writes = writes.len(),
            removals = removals.len(),
            "saving session delta"
        );

        if !writes.is_empty() {
            self.store.put_fields(key, writes)?;
        }
        for field in removals {
            self.store.delete_field(key, field)?;
        }
        Ok(())
    }

    /// Load a session. Returns `Ok(None)` if it does not exist or has expired.
    ///
    /// Loading never touches the stored expiry or last access time.
    pub fn get_session(&self, id: &SessionId) -> Result<Option<Session>> {
        let key = self.session_key(id);
        let fields = self.store.get_all_fields(&key)?;
        if fields.is_empty() {
            debug!(session_id = %id, "session not found");
            return Ok(None);
        }

        match Session::from_fields(id.clone(), fields) {
            Ok(session) => {
                debug!(session_id = %id, "loaded session");
                Ok(Some(session))
            }
            Err(SessionStoreError::MissingField(CREATION_TIME_FIELD)) => {
                warn!(session_id = %id, "stored session has no creation time, treating as absent");
                Ok(None)
            }
            Err(err) => {
                warn!(session_id = %id, error = %err, "stored session is malformed");
                Err(err)
            }
        }
    }

    /// Delete the session's key. Deleting an absent session is not an error.
    pub fn delete(&self, id: &SessionId) -> Result<()> {
        debug!(session_id = %id, "deleting session");
        self.store.delete_key(&self.session_key(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::fields::{
        attribute_field, LAST_ACCESSED_TIME_FIELD, MAX_INACTIVE_INTERVAL_FIELD,
    };
    use serde_json::{json, Value};
    use std::sync::Mutex;

    /// A store call as seen by the fake.
    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        GetAll(String),
        Put(String, HashMap<String, Value>),
        DeleteField(String, String),
        DeleteKey(String),
        Expire(String, i64),
    }

    /// Records every call and answers reads from a canned map.
    #[derive(Default)]
    struct RecordingStore {
        calls: Mutex<Vec<Call>>,
        entries: HashMap<String, Value>,
        fail_expire: bool,
    }

    impl RecordingStore {
        fn with_entries(entries: HashMap<String, Value>) -> Self {
            Self {
                entries,
                ..Self::default()
            }
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        fn puts(&self) -> Vec<HashMap<String, Value>> {
            self.calls()
                .into_iter()
                .filter_map(|c| match c {
                    Call::Put(_, fields) => Some(fields),
                    _ => None,
                })
                .collect()
        }

        fn record(&self, call: Call) {
            self.calls.lock().unwrap().push(call);
        }
    }

    impl HashStore for RecordingStore {
        fn get_all_fields(&self, key: &str) -> Result<HashMap<String, Value>> {
            self.record(Call::GetAll(key.to_string()));
            Ok(self.entries.clone())
        }

        fn put_fields(&self, key: &str, fields: HashMap<String, Value>) -> Result<()> {
            self.record(Call::Put(key.to_string(), fields));
            Ok(())
        }

        fn delete_field(&self, key: &str, field: &str) -> Result<()> {
            self.record(Call::DeleteField(key.to_string(), field.to_string()));
            Ok(())
        }

        fn delete_key(&self, key: &str) -> Result<()> {
            self.record(Call::DeleteKey(key.to_string()));
            Ok(())
        }

        fn expire_key_after(&self, key: &str, seconds: i64) -> Result<()> {
            self.record(Call::Expire(key.to_string(), seconds));
            if self.fail_expire {
                return Err(SessionStoreError::Store("connection reset".into()));
            }
            Ok(())
        }
    }

    fn stored_fields(creation: i64, last: i64, interval: i32) -> HashMap<String, Value> {
        HashMap::from([
            (CREATION_TIME_FIELD.to_string(), json!(creation)),
            (LAST_ACCESSED_TIME_FIELD.to_string(), json!(last)),
            (MAX_INACTIVE_INTERVAL_FIELD.to_string(), json!(interval)),
        ])
    }

    fn loaded_session() -> Session {
        Session::from_fields(SessionId::new(), stored_fields(1_000, 1_000, 1800)).unwrap()
    }

    #[test]
    fn test_create_session_default_max_inactive_interval() {
        let repo = SessionRepository::new(RecordingStore::default());
        let session = repo.create_session();
        assert_eq!(
            session.max_inactive_interval(),
            DEFAULT_MAX_INACTIVE_INTERVAL_SECS
        );
    }

    #[test]
    fn test_create_session_custom_max_inactive_interval() {
        let mut repo = SessionRepository::new(RecordingStore::default());
        let before = repo.create_session();

        repo.set_default_max_inactive_interval(1);
        let session = repo.create_session();

        assert_eq!(session.max_inactive_interval(), 1);
        assert_eq!(before.max_inactive_interval(), DEFAULT_MAX_INACTIVE_INTERVAL_SECS);
    }

    #[test]
    fn test_save_new_session() {
        let repo = SessionRepository::new(RecordingStore::default());
        let mut session = repo.create_session();

        repo.save(&mut session).unwrap();

        let puts = repo.store().puts();
        assert_eq!(puts.len(), 1);
        let delta = &puts[0];
        assert_eq!(delta.len(), 3);
        let creation_time = &delta[CREATION_TIME_FIELD];
        assert!(creation_time.is_i64());
        assert_eq!(
            delta[MAX_INACTIVE_INTERVAL_FIELD],
            json!(DEFAULT_MAX_INACTIVE_INTERVAL_SECS)
        );
        assert_eq!(&delta[LAST_ACCESSED_TIME_FIELD], creation_time);
        assert!(!session.has_changes());
    }

    #[test]
    fn test_save_last_access_changed() {
        let repo = SessionRepository::new(RecordingStore::default());
        let mut session = loaded_session();
        session.set_last_accessed_time(12_345_678);

        repo.save(&mut session).unwrap();

        assert_eq!(
            repo.store().puts(),
            vec![HashMap::from([(
                LAST_ACCESSED_TIME_FIELD.to_string(),
                json!(12_345_678)
            )])]
        );
    }

    #[test]
    fn test_save_set_attribute() {
        let repo = SessionRepository::new(RecordingStore::default());
        let mut session = loaded_session();
        session.set_attribute("attrName", json!("attrValue"));

        repo.save(&mut session).unwrap();

        assert_eq!(
            repo.store().puts(),
            vec![HashMap::from([(
                attribute_field("attrName"),
                json!("attrValue")
            )])]
        );
    }

    #[test]
    fn test_save_remove_attribute() {
        let repo = SessionRepository::new(RecordingStore::default());
        let mut session = loaded_session();
        session.remove_attribute("attrName");
        assert_eq!(session.delta().len(), 1);
        assert_eq!(session.delta()[&attribute_field("attrName")], FieldChange::Removed);

        repo.save(&mut session).unwrap();

        let key = repo.session_key(session.id());
        assert_eq!(
            repo.store().calls(),
            vec![
                Call::DeleteField(key.clone(), attribute_field("attrName")),
                Call::Expire(key, 1800),
            ]
        );
    }

    #[test]
    fn test_save_unchanged_session_only_refreshes_expiry() {
        let repo = SessionRepository::new(RecordingStore::default());
        let mut session = loaded_session();

        repo.save(&mut session).unwrap();

        let key = repo.session_key(session.id());
        assert_eq!(repo.store().calls(), vec![Call::Expire(key, 1800)]);
    }

    #[test]
    fn test_save_never_expiring_session_passes_negative_interval() {
        let repo = SessionRepository::new(RecordingStore::default());
        let mut session = loaded_session();
        session.set_max_inactive_interval(-1);

        repo.save(&mut session).unwrap();

        let key = repo.session_key(session.id());
        assert_eq!(repo.store().calls().last(), Some(&Call::Expire(key, -1)));
    }

    #[test]
    fn test_failed_expiry_keeps_delta_and_stale_ttl() {
        let store = RecordingStore {
            fail_expire: true,
            ..RecordingStore::default()
        };
        let repo = SessionRepository::new(store);
        let mut session = loaded_session();
        session.set_attribute("a", json!(1));

        let err = repo.save(&mut session).unwrap_err();

        assert!(matches!(err, SessionStoreError::Store(_)));
        // Fields were written even though the TTL was never refreshed.
        assert_eq!(repo.store().puts().len(), 1);
        assert!(session.has_changes());
    }

    #[test]
    fn test_save_after_change_session_id_moves_key() {
        let repo = SessionRepository::new(RecordingStore::default());
        let mut session = loaded_session();
        let old_key = repo.session_key(session.id());
        session.set_attribute("a", json!(1));

        session.change_session_id();
        repo.save(&mut session).unwrap();

        let new_key = repo.session_key(session.id());
        assert_eq!(
            repo.store().calls(),
            vec![
                Call::Put(new_key.clone(), session.to_fields()),
                Call::DeleteKey(old_key),
                Call::Expire(new_key, 1800),
            ]
        );

        // The session now lives under its new id.
        repo.save(&mut session).unwrap();
        assert_eq!(repo.store().calls().len(), 4);
    }

    #[test]
    fn test_delete() {
        let repo = SessionRepository::new(RecordingStore::default());
        let id: SessionId = "abc".parse().unwrap();

        repo.delete(&id).unwrap();

        assert_eq!(
            repo.store().calls(),
            vec![Call::DeleteKey("session-store:sessions:abc".to_string())]
        );
    }

    #[test]
    fn test_get_session_not_found() {
        let repo = SessionRepository::new(RecordingStore::default());
        let id: SessionId = "abc".parse().unwrap();

        assert!(repo.get_session(&id).unwrap().is_none());
    }

    #[test]
    fn test_get_session_found() {
        let mut fields = stored_fields(1_000, 5_000, 600);
        fields.insert(attribute_field("attrName"), json!("attrValue"));
        let repo = SessionRepository::new(RecordingStore::with_entries(fields));
        let id: SessionId = "abc".parse().unwrap();

        let session = repo.get_session(&id).unwrap().unwrap();

        assert_eq!(session.id(), &id);
        assert_eq!(
            session.attribute_names(),
            std::collections::HashSet::from(["attrName".to_string()])
        );
        assert_eq!(session.attribute("attrName"), Some(&json!("attrValue")));
        assert_eq!(session.creation_time(), 1_000);
        assert_eq!(session.max_inactive_interval(), 600);
        assert_eq!(session.last_accessed_time(), 5_000);
        assert!(!session.has_changes());
        assert_eq!(
            repo.store().calls(),
            vec![Call::GetAll(repo.session_key(&id))]
        );
    }

    #[test]
    fn test_get_session_malformed() {
        let mut fields = stored_fields(1_000, 1_000, 600);
        fields.insert(MAX_INACTIVE_INTERVAL_FIELD.to_string(), json!("forever"));
        let repo = SessionRepository::new(RecordingStore::with_entries(fields));

        let err = repo.get_session(&"abc".parse().unwrap()).unwrap_err();
        assert!(matches!(err, SessionStoreError::MalformedField { .. }));
    }

    #[test]
    fn test_get_session_partial_hash_is_absent() {
        let fields = HashMap::from([(LAST_ACCESSED_TIME_FIELD.to_string(), json!(5_000))]);
        let repo = SessionRepository::new(RecordingStore::with_entries(fields));

        assert!(repo.get_session(&"abc".parse().unwrap()).unwrap().is_none());
    }

    #[test]
    fn test_session_key_namespace() {
        let config = RepositoryConfig::default().with_namespace("shop");
        let repo = SessionRepository::with_config(RecordingStore::default(), config);
        let id: SessionId = "abc".parse().unwrap();

        assert_eq!(repo.session_key(&id), "shop:sessions:abc");
    }
}
