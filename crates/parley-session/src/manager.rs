//! Session registry and lifecycle.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use parley_core::{SessionKey, SessionSummary, StateMap};
use thiserror::Error;
use tokio::sync::{Mutex as AsyncMutex, MutexGuard};
use tracing::{debug, info};
use uuid::Uuid;

use crate::session::Session;
use crate::state::StateStore;
use crate::store::{SessionRecord, SessionStore, StoreError};

/// Errors from session lifecycle operations.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Session already exists: {0}")]
    AlreadyExists(SessionKey),

    #[error("Session not found: {0}")]
    NotFound(SessionKey),

    #[error("Session store error: {0}")]
    Store(#[from] StoreError),
}

impl From<SessionError> for parley_core::Error {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::NotFound(key) => parley_core::Error::NotFound(key.to_string()),
            SessionError::Store(e) => parley_core::Error::Database(e.to_string()),
            other => parley_core::Error::Session(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;

/// Shared handle to a live session.
///
/// Turns on one session serialize on the inner lock; turns on different
/// sessions proceed independently.
#[derive(Clone)]
pub struct SessionHandle {
    key: SessionKey,
    inner: Arc<AsyncMutex<Session>>,
}

impl SessionHandle {
    fn new(session: Session) -> Self {
        Self {
            key: session.key().clone(),
            inner: Arc::new(AsyncMutex::new(session)),
        }
    }

    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    /// Lock the session for a read-modify-write.
    pub async fn lock(&self) -> MutexGuard<'_, Session> {
        self.inner.lock().await
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle").field("key", &self.key).finish()
    }
}

/// Creates, resolves and tracks sessions.
///
/// Constructed once at startup and passed to whoever runs turns. With a
/// [`SessionStore`] attached, sessions and scoped state are loaded lazily and
/// written through on [`SessionManager::persist`].
pub struct SessionManager {
    sessions: RwLock<HashMap<SessionKey, SessionHandle>>,
    state: Arc<StateStore>,
    store: Option<Arc<dyn SessionStore>>,
    hydrated: Mutex<HashSet<(String, String)>>,
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionManager {
    /// In-memory manager.
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            state: Arc::new(StateStore::new()),
            store: None,
            hydrated: Mutex::new(HashSet::new()),
        }
    }

    /// Manager writing through to `store`.
    pub fn with_store(store: Arc<dyn SessionStore>) -> Self {
        Self {
            store: Some(store),
            ..Self::new()
        }
    }

    /// Shared app and user state.
    pub fn state_store(&self) -> &Arc<StateStore> {
        &self.state
    }

    pub fn has_store(&self) -> bool {
        self.store.is_some()
    }

    /// Create a session. Fails if it already exists in memory or in the store.
    pub async fn create_session(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: Option<&str>,
    ) -> Result<SessionHandle> {
        let session_id = session_id
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let key = SessionKey::new(app_name, user_id, session_id);

        if self.sessions.read().contains_key(&key) {
            return Err(SessionError::AlreadyExists(key));
        }
        if let Some(store) = &self.store {
            if store.load(&key).await?.is_some() {
                return Err(SessionError::AlreadyExists(key));
            }
        }
        self.hydrate_scoped(&key).await?;

        let session = Session::new(key.clone(), Arc::clone(&self.state));
        let record = SessionRecord::from_session(&session);
        let handle = {
            let mut sessions = self.sessions.write();
            if sessions.contains_key(&key) {
                return Err(SessionError::AlreadyExists(key));
            }
            let handle = SessionHandle::new(session);
            sessions.insert(key.clone(), handle.clone());
            handle
        };

        if let Some(store) = &self.store {
            store.save(&record).await?;
        }
        info!(session = %key, "Created session");
        Ok(handle)
    }

    /// Resolve an existing session.
    pub async fn get_session(&self, key: &SessionKey) -> Result<SessionHandle> {
        let live = self.sessions.read().get(key).cloned();
        if let Some(handle) = live {
            return Ok(handle);
        }

        let Some(store) = &self.store else {
            return Err(SessionError::NotFound(key.clone()));
        };
        let Some(record) = store.load(key).await? else {
            return Err(SessionError::NotFound(key.clone()));
        };
        self.hydrate_scoped(key).await?;

        let session = record.into_session(Arc::clone(&self.state));
        let mut sessions = self.sessions.write();
        // Another task may have loaded it meanwhile
        let handle = sessions
            .entry(key.clone())
            .or_insert_with(|| SessionHandle::new(session))
            .clone();
        debug!(session = %key, "Loaded session from store");
        Ok(handle)
    }

    /// Create the session, or resolve it if it already exists.
    pub async fn create_or_get(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
    ) -> Result<SessionHandle> {
        match self.create_session(app_name, user_id, Some(session_id)).await {
            Ok(handle) => Ok(handle),
            Err(SessionError::AlreadyExists(key)) => {
                debug!(session = %key, "Session exists, reusing it");
                self.get_session(&key).await
            }
            Err(e) => Err(e),
        }
    }

    /// Sessions of one user, most recently updated first.
    pub async fn list_sessions(&self, app_name: &str, user_id: &str) -> Result<Vec<SessionSummary>> {
        let handles: Vec<SessionHandle> = self
            .sessions
            .read()
            .values()
            .filter(|h| h.key().belongs_to(app_name, user_id))
            .cloned()
            .collect();

        let mut summaries = Vec::with_capacity(handles.len());
        for handle in &handles {
            summaries.push(handle.lock().await.summary());
        }

        if let Some(store) = &self.store {
            let live: HashSet<SessionKey> = handles.iter().map(|h| h.key().clone()).collect();
            summaries.extend(
                store
                    .list(app_name, user_id)
                    .await?
                    .into_iter()
                    .filter(|s| !live.contains(&s.key)),
            );
        }

        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(summaries)
    }

    /// Delete a session from memory and the store. Returns whether it existed.
    pub async fn delete_session(&self, key: &SessionKey) -> Result<bool> {
        let in_memory = self.sessions.write().remove(key).is_some();
        let in_store = match &self.store {
            Some(store) => store.delete(key).await?,
            None => false,
        };
        if in_memory || in_store {
            info!(session = %key, "Deleted session");
        }
        Ok(in_memory || in_store)
    }

    /// Merged state view: app < user < session < temp, prefixed keys.
    pub async fn get_state_snapshot(&self, key: &SessionKey) -> Result<StateMap> {
        let handle = self.get_session(key).await?;
        let session = handle.lock().await;
        Ok(session.state_snapshot())
    }

    /// Write the session and its app and user state through to the store.
    ///
    /// No-op without a store. Call with the session lock held so the write
    /// reflects a committed turn.
    pub async fn persist(&self, session: &Session) -> Result<()> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        let key = session.key();
        store.save(&SessionRecord::from_session(session)).await?;
        store
            .save_scoped_state(&key.app_name, None, &self.state.app_state(&key.app_name))
            .await?;
        store
            .save_scoped_state(
                &key.app_name,
                Some(&key.user_id),
                &self.state.user_state(&key.app_name, &key.user_id),
            )
            .await?;
        debug!(session = %key, events = session.events().len(), "Persisted session");
        Ok(())
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    /// Drop every live session and all scoped state held in memory.
    ///
    /// Persisted data is left alone.
    pub fn clear(&self) {
        self.sessions.write().clear();
        self.state.clear();
        self.hydrated.lock().clear();
    }

    async fn hydrate_scoped(&self, key: &SessionKey) -> Result<()> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        let slot = (key.app_name.clone(), key.user_id.clone());
        if self.hydrated.lock().contains(&slot) {
            return Ok(());
        }
        let app = store.load_scoped_state(&key.app_name, None).await?;
        let user = store
            .load_scoped_state(&key.app_name, Some(&key.user_id))
            .await?;
        self.state.hydrate_app(&key.app_name, app);
        self.state.hydrate_user(&key.app_name, &key.user_id, user);
        self.hydrated.lock().insert(slot);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteSessionStore;
    use parley_core::{Event, StateKey};
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_create_then_get() {
        let manager = SessionManager::new();
        let handle = manager
            .create_session("app", "user1", Some("s1"))
            .await
            .unwrap();
        let again = manager.get_session(handle.key()).await.unwrap();
        assert_eq!(again.key(), handle.key());
        assert_eq!(manager.len(), 1);
    }

    #[tokio::test]
    async fn test_create_existing_fails_and_create_or_get_falls_back() {
        let manager = SessionManager::new();
        let first = manager.create_or_get("app", "user1", "s1").await.unwrap();
        first.lock().await.append(Event::user("inv-1", "hello"));

        let err = manager
            .create_session("app", "user1", Some("s1"))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::AlreadyExists(_)));

        let second = manager.create_or_get("app", "user1", "s1").await.unwrap();
        assert_eq!(second.lock().await.events().len(), 1);
    }

    #[tokio::test]
    async fn test_generated_session_id() {
        let manager = SessionManager::new();
        let a = manager.create_session("app", "u", None).await.unwrap();
        let b = manager.create_session("app", "u", None).await.unwrap();
        assert_ne!(a.key(), b.key());
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let manager = SessionManager::new();
        let err = manager
            .get_session(&SessionKey::new("app", "u", "nope"))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_list_delete_clear() {
        let manager = SessionManager::new();
        manager.create_session("app", "u", Some("a")).await.unwrap();
        manager.create_session("app", "u", Some("b")).await.unwrap();
        manager.create_session("app", "other", Some("c")).await.unwrap();

        assert_eq!(manager.list_sessions("app", "u").await.unwrap().len(), 2);
        assert!(manager
            .delete_session(&SessionKey::new("app", "u", "a"))
            .await
            .unwrap());
        assert_eq!(manager.list_sessions("app", "u").await.unwrap().len(), 1);

        manager.clear();
        assert!(manager.is_empty());
    }

    #[tokio::test]
    async fn test_state_snapshot_merges_scopes() {
        let manager = SessionManager::new();
        let a = manager.create_session("app", "u", Some("a")).await.unwrap();
        let b = manager.create_session("app", "u", Some("b")).await.unwrap();
        {
            let mut session = a.lock().await;
            session.set(&StateKey::user("name"), json!("Sam"));
            session.set(&StateKey::session("draft"), json!(true));
        }

        let snapshot_b = manager.get_state_snapshot(b.key()).await.unwrap();
        assert_eq!(snapshot_b.get("user:name"), Some(&json!("Sam")));
        assert!(snapshot_b.get("draft").is_none());
    }

    #[tokio::test]
    async fn test_store_round_trip_across_managers() {
        let tmp = TempDir::new().unwrap();
        let db = tmp.path().join("sessions.db");

        {
            let store = Arc::new(SqliteSessionStore::new(&db).unwrap());
            let manager = SessionManager::with_store(store);
            let handle = manager.create_session("app", "u", Some("s1")).await.unwrap();
            let mut session = handle.lock().await;
            session.append(Event::user("inv-1", "remember me"));
            session.set(&StateKey::user("name"), json!("Sam"));
            manager.persist(&session).await.unwrap();
        }

        let store = Arc::new(SqliteSessionStore::new(&db).unwrap());
        let manager = SessionManager::with_store(store);
        assert!(matches!(
            manager.create_session("app", "u", Some("s1")).await,
            Err(SessionError::AlreadyExists(_))
        ));

        let restored = manager
            .get_session(&SessionKey::new("app", "u", "s1"))
            .await
            .unwrap();
        assert_eq!(restored.lock().await.events().len(), 1);

        let fresh = manager.create_session("app", "u", Some("s2")).await.unwrap();
        assert_eq!(
            fresh.lock().await.lookup(&StateKey::user("name")),
            Some(json!("Sam"))
        );
        assert_eq!(manager.list_sessions("app", "u").await.unwrap().len(), 2);
    }
}
