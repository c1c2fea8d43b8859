//! Bounded, write-through store of conversation sessions.
//!
//! `SessionStore` is the only long-lived shared state of the engine. Every
//! mutation happens in two steps: the in-memory layout is changed under a
//! synchronous lock (never held across an await), then a snapshot of it is
//! written through the storage port. Writes are serialized and tagged with a
//! revision so an older snapshot never lands after a newer one.

use std::sync::Mutex;

use tracing::{info, warn};

use parley_types::config::StoreConfig;
use parley_types::error::StorageError;
use parley_types::session::{LegacySessionLayout, SessionPatch, SessionsLayout, StoredSession};

use super::storage::SessionStorage;

/// Storage key of the current layout.
pub const SESSIONS_KEY: &str = "chat_sessions_v2";

/// Storage key of the single-session layout that predates the store.
pub const LEGACY_SESSION_KEY: &str = "chat_session";

struct StoreState {
    layout: SessionsLayout,
    revision: u64,
}

/// A layout captured right after a mutation.
struct Snapshot {
    revision: u64,
    layout: SessionsLayout,
}

/// Multi-session conversation store.
pub struct SessionStore<S: SessionStorage> {
    storage: S,
    config: StoreConfig,
    state: Mutex<StoreState>,
    /// Revision of the last snapshot written to storage.
    persisted_revision: tokio::sync::Mutex<u64>,
}

impl<S: SessionStorage> SessionStore<S> {
    /// Create an empty store without reading storage.
    pub fn new(storage: S, config: StoreConfig) -> Self {
        Self::with_layout(storage, config, SessionsLayout::default())
    }

    fn with_layout(storage: S, config: StoreConfig, layout: SessionsLayout) -> Self {
        Self {
            storage,
            config,
            state: Mutex::new(StoreState {
                layout,
                revision: 0,
            }),
            persisted_revision: tokio::sync::Mutex::new(0),
        }
    }

    /// Load the store from storage, migrating the legacy layout if found.
    ///
    /// Corrupt data is logged and treated as an empty store.
    pub async fn load(storage: S, config: StoreConfig) -> Result<Self, StorageError> {
        if let Some(raw) = storage.read(SESSIONS_KEY).await? {
            let mut layout = match serde_json::from_str::<SessionsLayout>(&raw) {
                Ok(layout) => layout,
                Err(e) => {
                    warn!(error = %e, "Stored sessions are unreadable, starting empty");
                    SessionsLayout::default()
                }
            };
            enforce_bounds(&mut layout, config.max_sessions);
            return Ok(Self::with_layout(storage, config, layout));
        }

        let Some(raw) = storage.read(LEGACY_SESSION_KEY).await? else {
            return Ok(Self::new(storage, config));
        };

        let layout = match serde_json::from_str::<LegacySessionLayout>(&raw) {
            Ok(legacy) if !legacy.history.is_empty() => {
                let session = legacy.into_session(&config.placeholder_title);
                info!(session_id = %session.id, title = %session.title, "Migrated legacy session");
                SessionsLayout {
                    active_session_id: Some(session.id.clone()),
                    sessions: vec![session],
                }
            }
            Ok(_) => SessionsLayout::default(),
            Err(e) => {
                warn!(error = %e, "Legacy session is unreadable, discarding it");
                SessionsLayout::default()
            }
        };

        let store = Self::with_layout(storage, config, layout);
        let ((), snapshot) = store.mutate(|_| ());
        store.persist(snapshot).await?;
        store.storage.remove(LEGACY_SESSION_KEY).await?;
        Ok(store)
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// All sessions, newest first.
    pub fn sessions(&self) -> Vec<StoredSession> {
        self.read(|layout| layout.sessions.clone())
    }

    pub fn session(&self, id: &str) -> Option<StoredSession> {
        self.read(|layout| layout.sessions.iter().find(|s| s.id == id).cloned())
    }

    pub fn active_session_id(&self) -> Option<String> {
        self.read(|layout| layout.active_session_id.clone())
    }

    pub fn active_session(&self) -> Option<StoredSession> {
        self.read(|layout| {
            let id = layout.active_session_id.as_deref()?;
            layout.sessions.iter().find(|s| s.id == id).cloned()
        })
    }

    /// Create an empty session and make it active.
    ///
    /// Sessions that still have no history are dropped first, then the
    /// collection is cut to the configured maximum, oldest first.
    pub async fn create_session(&self) -> Result<StoredSession, StorageError> {
        let session = StoredSession::new(self.config.placeholder_title.clone());
        let max_sessions = self.config.max_sessions;

        let (evicted, snapshot) = self.mutate(|layout| {
            let before = layout.sessions.len();
            layout.sessions.retain(|s| !s.is_empty());
            layout.sessions.insert(0, session.clone());
            layout.sessions.truncate(max_sessions);
            layout.active_session_id = Some(session.id.clone());
            (before + 1).saturating_sub(layout.sessions.len())
        });

        info!(session_id = %session.id, evicted, "Session created");
        self.persist(snapshot).await?;
        Ok(session)
    }

    /// Return the active session, creating one if there is none.
    pub async fn ensure_active_session(&self) -> Result<StoredSession, StorageError> {
        match self.active_session() {
            Some(session) => Ok(session),
            None => self.create_session().await,
        }
    }

    /// Make `id` the active session.
    pub async fn select_session(&self, id: &str) -> Result<StoredSession, StorageError> {
        let (selected, snapshot) = self.mutate(|layout| {
            let session = layout.sessions.iter().find(|s| s.id == id).cloned()?;
            layout.active_session_id = Some(session.id.clone());
            Some(session)
        });
        let session = selected.ok_or_else(|| StorageError::NotFound(id.to_string()))?;
        self.persist(snapshot).await?;
        Ok(session)
    }

    /// Delete a session.
    ///
    /// Deleting the active session re-selects the first remaining one, or
    /// none. Returns the active session id after deletion.
    pub async fn delete_session(&self, id: &str) -> Result<Option<String>, StorageError> {
        let (result, snapshot) = self.mutate(|layout| {
            let index = layout.sessions.iter().position(|s| s.id == id)?;
            layout.sessions.remove(index);
            if layout.active_session_id.as_deref() == Some(id) {
                layout.active_session_id = layout.sessions.first().map(|s| s.id.clone());
            }
            Some(layout.active_session_id.clone())
        });
        let active = result.ok_or_else(|| StorageError::NotFound(id.to_string()))?;
        info!(session_id = %id, "Session deleted");
        self.persist(snapshot).await?;
        Ok(active)
    }

    pub async fn rename_session(&self, id: &str, title: &str) -> Result<(), StorageError> {
        self.update_session(id, SessionPatch::title(title)).await.map(|_| ())
    }

    /// Merge `patch` into the active session.
    ///
    /// Returns the updated session, or None when no session is active.
    pub async fn update_active_session(
        &self,
        patch: SessionPatch,
    ) -> Result<Option<StoredSession>, StorageError> {
        let Some(id) = self.active_session_id() else {
            return Ok(None);
        };
        self.update_session(&id, patch).await.map(Some)
    }

    /// Merge `patch` into the session with the given id.
    pub async fn update_session(
        &self,
        id: &str,
        patch: SessionPatch,
    ) -> Result<StoredSession, StorageError> {
        let (updated, snapshot) = self.mutate(|layout| {
            let session = layout.sessions.iter_mut().find(|s| s.id == id)?;
            session.apply(patch);
            Some(session.clone())
        });
        let session = updated.ok_or_else(|| StorageError::NotFound(id.to_string()))?;
        self.persist(snapshot).await?;
        Ok(session)
    }

    /// Set a session's title only if it still carries the placeholder.
    ///
    /// The check and the write happen under one lock. Returns whether the
    /// title was written.
    pub async fn set_title_if_placeholder(
        &self,
        id: &str,
        title: &str,
    ) -> Result<bool, StorageError> {
        let placeholder = self.config.placeholder_title.as_str();
        let (written, snapshot) = self.mutate(|layout| {
            match layout.sessions.iter_mut().find(|s| s.id == id) {
                Some(session) if session.title == placeholder => {
                    session.apply(SessionPatch::title(title));
                    true
                }
                _ => false,
            }
        });
        if written {
            self.persist(snapshot).await?;
        }
        Ok(written)
    }

    fn read<R>(&self, f: impl FnOnce(&SessionsLayout) -> R) -> R {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        f(&state.layout)
    }

    /// Apply a change to the in-memory layout and capture a snapshot.
    fn mutate<R>(&self, f: impl FnOnce(&mut SessionsLayout) -> R) -> (R, Snapshot) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let result = f(&mut state.layout);
        state.revision += 1;
        let snapshot = Snapshot {
            revision: state.revision,
            layout: state.layout.clone(),
        };
        (result, snapshot)
    }

    /// Write a snapshot through to storage unless a newer one already landed.
    async fn persist(&self, snapshot: Snapshot) -> Result<(), StorageError> {
        let mut persisted = self.persisted_revision.lock().await;
        if snapshot.revision <= *persisted {
            return Ok(());
        }
        let raw = serde_json::to_string(&snapshot.layout)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        self.storage.write(SESSIONS_KEY, &raw).await?;
        *persisted = snapshot.revision;
        Ok(())
    }
}

fn enforce_bounds(layout: &mut SessionsLayout, max_sessions: usize) {
    layout.sessions.truncate(max_sessions);
    let active_exists = layout
        .active_session_id
        .as_deref()
        .is_some_and(|id| layout.sessions.iter().any(|s| s.id == id));
    if !active_exists {
        layout.active_session_id = layout.sessions.first().map(|s| s.id.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::storage::MemoryStorage;
    use parley_types::chat::ChatTurn;

    fn config(max_sessions: usize) -> StoreConfig {
        StoreConfig {
            max_sessions,
            placeholder_title: "New Chat".to_string(),
        }
    }

    async fn create_with_history(store: &SessionStore<MemoryStorage>, text: &str) -> String {
        let session = store.create_session().await.unwrap();
        store
            .update_active_session(SessionPatch::history(vec![ChatTurn::user(text)]))
            .await
            .unwrap();
        session.id
    }

    fn persisted(storage: &MemoryStorage) -> SessionsLayout {
        serde_json::from_str(&storage.get(SESSIONS_KEY).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_create_session_becomes_active_with_placeholder() {
        let storage = MemoryStorage::new();
        let store = SessionStore::new(storage.clone(), config(5));

        let session = store.create_session().await.unwrap();

        assert_eq!(session.title, "New Chat");
        assert!(session.history.is_empty());
        assert_eq!(store.active_session_id(), Some(session.id.clone()));
        assert_eq!(persisted(&storage).active_session_id, Some(session.id));
    }

    #[tokio::test]
    async fn test_create_session_drops_empty_sessions() {
        let store = SessionStore::new(MemoryStorage::new(), config(5));
        let kept = create_with_history(&store, "hello").await;
        let empty = store.create_session().await.unwrap();

        let newest = store.create_session().await.unwrap();

        let ids: Vec<_> = store.sessions().into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![newest.id, kept]);
        assert!(!ids.contains(&empty.id));
    }

    #[tokio::test]
    async fn test_store_never_exceeds_cap_and_evicts_oldest() {
        let store = SessionStore::new(MemoryStorage::new(), config(3));
        let first = create_with_history(&store, "one").await;
        let second = create_with_history(&store, "two").await;
        let third = create_with_history(&store, "three").await;

        let fourth = store.create_session().await.unwrap();

        let ids: Vec<_> = store.sessions().into_iter().map(|s| s.id).collect();
        assert_eq!(ids.len(), 3);
        assert_eq!(ids, vec![fourth.id, third, second]);
        assert!(!ids.contains(&first));
    }

    #[tokio::test]
    async fn test_non_empty_session_survives_while_empty_one_is_evictable() {
        let store = SessionStore::new(MemoryStorage::new(), config(2));
        let with_history = create_with_history(&store, "keep me").await;
        store.create_session().await.unwrap();

        store.create_session().await.unwrap();

        assert!(store.session(&with_history).is_some());
        assert_eq!(store.sessions().len(), 2);
    }

    #[tokio::test]
    async fn test_select_session() {
        let store = SessionStore::new(MemoryStorage::new(), config(5));
        let first = create_with_history(&store, "one").await;
        create_with_history(&store, "two").await;

        let selected = store.select_session(&first).await.unwrap();

        assert_eq!(selected.id, first);
        assert_eq!(store.active_session_id(), Some(first));
        assert!(matches!(
            store.select_session("missing").await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_active_reselects_first_remaining() {
        let store = SessionStore::new(MemoryStorage::new(), config(5));
        let older = create_with_history(&store, "one").await;
        let newer = create_with_history(&store, "two").await;

        let active = store.delete_session(&newer).await.unwrap();
        assert_eq!(active, Some(older.clone()));

        let active = store.delete_session(&older).await.unwrap();
        assert_eq!(active, None);
        assert!(store.active_session().is_none());
    }

    #[tokio::test]
    async fn test_delete_inactive_keeps_active() {
        let store = SessionStore::new(MemoryStorage::new(), config(5));
        let older = create_with_history(&store, "one").await;
        let newer = create_with_history(&store, "two").await;

        let active = store.delete_session(&older).await.unwrap();
        assert_eq!(active, Some(newer));
    }

    #[tokio::test]
    async fn test_rename_and_update_refresh_timestamp() {
        let store = SessionStore::new(MemoryStorage::new(), config(5));
        let session = store.create_session().await.unwrap();

        store.rename_session(&session.id, "Lifetimes").await.unwrap();
        let renamed = store.session(&session.id).unwrap();

        assert_eq!(renamed.title, "Lifetimes");
        assert!(renamed.updated_at >= session.updated_at);
    }

    #[tokio::test]
    async fn test_update_active_without_active_session() {
        let store = SessionStore::new(MemoryStorage::new(), config(5));
        let result = store
            .update_active_session(SessionPatch::title("x"))
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_set_title_if_placeholder() {
        let store = SessionStore::new(MemoryStorage::new(), config(5));
        let session = store.create_session().await.unwrap();

        assert!(store.set_title_if_placeholder(&session.id, "First").await.unwrap());
        assert!(!store.set_title_if_placeholder(&session.id, "Second").await.unwrap());
        assert_eq!(store.session(&session.id).unwrap().title, "First");
    }

    #[tokio::test]
    async fn test_every_mutation_writes_through() {
        let storage = MemoryStorage::new();
        let store = SessionStore::new(storage.clone(), config(5));
        let session = store.create_session().await.unwrap();
        store.rename_session(&session.id, "Renamed").await.unwrap();

        assert_eq!(storage.write_count(), 2);
        assert_eq!(persisted(&storage).sessions[0].title, "Renamed");
    }

    #[tokio::test]
    async fn test_load_roundtrips_persisted_layout() {
        let storage = MemoryStorage::new();
        let store = SessionStore::new(storage.clone(), config(5));
        let id = create_with_history(&store, "remember me").await;
        drop(store);

        let reloaded = SessionStore::load(storage, config(5)).await.unwrap();

        assert_eq!(reloaded.active_session_id(), Some(id));
        assert_eq!(reloaded.active_session().unwrap().history[0].content, "remember me");
    }

    #[tokio::test]
    async fn test_load_migrates_legacy_layout() {
        let storage = MemoryStorage::new();
        storage.insert(
            LEGACY_SESSION_KEY,
            r#"{"sessionId":"backend-7","history":[{"role":"user","content":"Plan a trip"},{"role":"assistant","content":"Sure"}],"summary":"travel"}"#,
        );

        let store = SessionStore::load(storage.clone(), config(5)).await.unwrap();

        let session = store.active_session().unwrap();
        assert_eq!(session.title, "Plan a trip");
        assert_eq!(session.session_id.as_deref(), Some("backend-7"));
        assert_eq!(session.history.len(), 2);
        assert_eq!(session.summary.as_deref(), Some("travel"));
        assert!(storage.get(LEGACY_SESSION_KEY).is_none());
        assert_eq!(persisted(&storage).sessions.len(), 1);
    }

    #[tokio::test]
    async fn test_load_prefers_current_layout_over_legacy() {
        let storage = MemoryStorage::new();
        storage.insert(SESSIONS_KEY, r#"{"sessions":[],"activeSessionId":null}"#);
        storage.insert(
            LEGACY_SESSION_KEY,
            r#"{"history":[{"role":"user","content":"old"}]}"#,
        );

        let store = SessionStore::load(storage, config(5)).await.unwrap();
        assert!(store.sessions().is_empty());
    }

    #[tokio::test]
    async fn test_load_corrupt_layout_starts_empty() {
        let storage = MemoryStorage::new();
        storage.insert(SESSIONS_KEY, "{not json");

        let store = SessionStore::load(storage, config(5)).await.unwrap();
        assert!(store.sessions().is_empty());
        assert!(store.active_session().is_none());
    }

    #[tokio::test]
    async fn test_load_enforces_cap_and_repairs_active_id() {
        let mut layout = SessionsLayout::default();
        for i in 0..4 {
            let mut session = StoredSession::new(format!("s{i}"));
            session.history.push(ChatTurn::user("x"));
            layout.sessions.push(session);
        }
        layout.active_session_id = Some(layout.sessions[3].id.clone());
        let storage = MemoryStorage::new();
        storage.insert(SESSIONS_KEY, &serde_json::to_string(&layout).unwrap());

        let store = SessionStore::load(storage, config(2)).await.unwrap();

        assert_eq!(store.sessions().len(), 2);
        assert_eq!(store.active_session_id(), Some(layout.sessions[0].id.clone()));
    }
}
