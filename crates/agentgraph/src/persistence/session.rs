//! Session, Event and Summary persistence.
//!
//! A session owns the mutable state map the engine drives per execution, an
//! append-only event log, and a map of per-filter-key summaries kept current
//! by the summarization subsystem. Events and summaries are conceptually
//! guarded by independent locks (readers may iterate the event log while the
//! engine appends, and summarization may read/write summaries without
//! blocking event appends) — `InMemorySessionStore` below keeps them in
//! separate `RwLock`s for exactly that reason.

use super::traits::PersistenceError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

pub type SessionResult<T> = Result<T, PersistenceError>;

/// One entry in a session's event log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub author: String,
    /// Stable tag used for scope-based summarization; empty matches any scope.
    #[serde(default)]
    pub filter_key: String,
    /// Legacy field kept for backward-compatible event streams; unused by
    /// the summarization algorithm itself.
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub model_response: Option<serde_json::Value>,
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
}

fn default_schema_version() -> u32 {
    1
}

impl Event {
    pub fn new(author: impl Into<String>, filter_key: impl Into<String>) -> Self {
        Self {
            timestamp: chrono::Utc::now(),
            author: author.into(),
            filter_key: filter_key.into(),
            branch: None,
            model_response: None,
            schema_version: default_schema_version(),
        }
    }
}

/// A per-filter-key rolling summary, maintained by the summarization subsystem.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Summary {
    pub text: String,
    #[serde(default)]
    pub topics: Vec<String>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub app_name: String,
    pub user_id: String,
    pub state: HashMap<String, serde_json::Value>,
    pub events: Vec<Event>,
    pub summaries: HashMap<String, Summary>,
    pub create_time: chrono::DateTime<chrono::Utc>,
    pub update_time: chrono::DateTime<chrono::Utc>,
    /// Stable shard key for hashed dispatch of async summarization jobs.
    /// Derived once at creation from `(app_name, user_id, id)` — not
    /// recomputed, and not `std::hash::DefaultHasher` (unstable across Rust
    /// versions/builds), so restarts dispatch a given session to the same
    /// worker.
    pub hash: u64,
}

impl Session {
    pub fn new(app_name: impl Into<String>, user_id: impl Into<String>) -> Self {
        let id = Uuid::now_v7();
        let app_name = app_name.into();
        let user_id = user_id.into();
        let hash = session_hash(&app_name, &user_id, &id);
        let now = chrono::Utc::now();
        Self {
            id,
            app_name,
            user_id,
            state: HashMap::new(),
            events: Vec::new(),
            summaries: HashMap::new(),
            create_time: now,
            update_time: now,
            hash,
        }
    }
}

/// `sha2::Sha256(app_name || \0 || user_id || \0 || session_id)` truncated to
/// the first 8 bytes, big-endian. Stable across process restarts and Rust
/// versions (unlike `DefaultHasher`), which is the only requirement the
/// shard key has to satisfy.
pub fn session_hash(app_name: &str, user_id: &str, session_id: &Uuid) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(app_name.as_bytes());
    hasher.update([0u8]);
    hasher.update(user_id.as_bytes());
    hasher.update([0u8]);
    hasher.update(session_id.as_bytes());
    let digest = hasher.finalize();
    u64::from_be_bytes(digest[..8].try_into().unwrap())
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create_session(&self, session: &Session) -> SessionResult<()>;
    async fn get_session(&self, id: Uuid) -> SessionResult<Option<Session>>;
    async fn update_state(&self, id: Uuid, state: HashMap<String, serde_json::Value>) -> SessionResult<()>;
    async fn delete_session(&self, id: Uuid) -> SessionResult<bool>;

    async fn append_event(&self, session_id: Uuid, event: Event) -> SessionResult<()>;
    /// Events with `timestamp > since` whose `filter_key` matches (empty
    /// `filter_key` argument matches every event).
    async fn events_since(
        &self,
        session_id: Uuid,
        filter_key: &str,
        since: chrono::DateTime<chrono::Utc>,
    ) -> SessionResult<Vec<Event>>;

    async fn get_summary(&self, session_id: Uuid, filter_key: &str) -> SessionResult<Option<Summary>>;
    async fn put_summary(&self, session_id: Uuid, filter_key: &str, summary: Summary) -> SessionResult<()>;
}

/// `SessionStore` implementation backed by two independently locked maps —
/// one for session/state/summaries, one for event logs — so summarization
/// reads never block event appends and vice versa.
pub struct InMemorySessionStore {
    sessions: Arc<RwLock<HashMap<Uuid, Session>>>,
    events: Arc<RwLock<HashMap<Uuid, Vec<Event>>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            events: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn create_session(&self, session: &Session) -> SessionResult<()> {
        let mut sessions = self.sessions.write().await;
        let mut events = self.events.write().await;
        sessions.insert(session.id, session.clone());
        events.entry(session.id).or_insert_with(Vec::new);
        Ok(())
    }

    async fn get_session(&self, id: Uuid) -> SessionResult<Option<Session>> {
        let sessions = self.sessions.read().await;
        let Some(session) = sessions.get(&id) else {
            return Ok(None);
        };
        let mut session = session.clone();
        drop(sessions);
        let events = self.events.read().await;
        if let Some(log) = events.get(&id) {
            session.events = log.clone();
        }
        Ok(Some(session))
    }

    async fn update_state(&self, id: Uuid, state: HashMap<String, serde_json::Value>) -> SessionResult<()> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(&id)
            .ok_or_else(|| PersistenceError::NotFound(id.to_string()))?;
        session.state = state;
        session.update_time = chrono::Utc::now();
        Ok(())
    }

    async fn delete_session(&self, id: Uuid) -> SessionResult<bool> {
        let mut sessions = self.sessions.write().await;
        let mut events = self.events.write().await;
        events.remove(&id);
        Ok(sessions.remove(&id).is_some())
    }

    async fn append_event(&self, session_id: Uuid, event: Event) -> SessionResult<()> {
        let sessions = self.sessions.read().await;
        if !sessions.contains_key(&session_id) {
            return Err(PersistenceError::NotFound(session_id.to_string()));
        }
        drop(sessions);
        let mut events = self.events.write().await;
        events.entry(session_id).or_insert_with(Vec::new).push(event);
        Ok(())
    }

    async fn events_since(
        &self,
        session_id: Uuid,
        filter_key: &str,
        since: chrono::DateTime<chrono::Utc>,
    ) -> SessionResult<Vec<Event>> {
        let events = self.events.read().await;
        let log = events
            .get(&session_id)
            .ok_or_else(|| PersistenceError::NotFound(session_id.to_string()))?;
        Ok(log
            .iter()
            .filter(|e| e.timestamp > since && (filter_key.is_empty() || e.filter_key == filter_key))
            .cloned()
            .collect())
    }

    async fn get_summary(&self, session_id: Uuid, filter_key: &str) -> SessionResult<Option<Summary>> {
        let sessions = self.sessions.read().await;
        let session = sessions
            .get(&session_id)
            .ok_or_else(|| PersistenceError::NotFound(session_id.to_string()))?;
        Ok(session.summaries.get(filter_key).cloned())
    }

    async fn put_summary(&self, session_id: Uuid, filter_key: &str, summary: Summary) -> SessionResult<()> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(&session_id)
            .ok_or_else(|| PersistenceError::NotFound(session_id.to_string()))?;
        session.summaries.insert(filter_key.to_string(), summary);
        session.update_time = chrono::Utc::now();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_hash_is_stable_for_same_inputs() {
        let id = Uuid::now_v7();
        let a = session_hash("app", "user-1", &id);
        let b = session_hash("app", "user-1", &id);
        assert_eq!(a, b);
    }

    #[test]
    fn session_hash_differs_across_users() {
        let id = Uuid::now_v7();
        let a = session_hash("app", "user-1", &id);
        let b = session_hash("app", "user-2", &id);
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn create_then_get_round_trips_session() {
        let store = InMemorySessionStore::new();
        let session = Session::new("app", "user-1");
        let id = session.id;
        store.create_session(&session).await.unwrap();

        let fetched = store.get_session(id).await.unwrap().unwrap();
        assert_eq!(fetched.id, id);
        assert!(fetched.events.is_empty());
    }

    #[tokio::test]
    async fn append_event_then_filter_by_key_and_timestamp() {
        let store = InMemorySessionStore::new();
        let session = Session::new("app", "user-1");
        let id = session.id;
        store.create_session(&session).await.unwrap();

        let t0 = chrono::Utc::now();
        let mut e1 = Event::new("user", "topic-a");
        e1.timestamp = t0 + chrono::Duration::seconds(1);
        let mut e2 = Event::new("user", "topic-b");
        e2.timestamp = t0 + chrono::Duration::seconds(2);
        store.append_event(id, e1).await.unwrap();
        store.append_event(id, e2).await.unwrap();

        let matched = store.events_since(id, "topic-a", t0).await.unwrap();
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].filter_key, "topic-a");

        let all = store.events_since(id, "", t0).await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn update_state_and_get_reflect_latest_write() {
        let store = InMemorySessionStore::new();
        let session = Session::new("app", "user-1");
        let id = session.id;
        store.create_session(&session).await.unwrap();

        let mut new_state = HashMap::new();
        new_state.insert("count".to_string(), serde_json::json!(3));
        store.update_state(id, new_state).await.unwrap();

        let fetched = store.get_session(id).await.unwrap().unwrap();
        assert_eq!(fetched.state.get("count"), Some(&serde_json::json!(3)));
    }

    #[tokio::test]
    async fn put_summary_then_get_summary_round_trips() {
        let store = InMemorySessionStore::new();
        let session = Session::new("app", "user-1");
        let id = session.id;
        store.create_session(&session).await.unwrap();

        let summary = Summary {
            text: "recap".to_string(),
            topics: vec!["topic-a".to_string()],
            updated_at: chrono::Utc::now(),
        };
        store.put_summary(id, "topic-a", summary.clone()).await.unwrap();

        let fetched = store.get_summary(id, "topic-a").await.unwrap().unwrap();
        assert_eq!(fetched.text, "recap");
    }

    #[tokio::test]
    async fn operations_on_missing_session_report_not_found() {
        let store = InMemorySessionStore::new();
        let missing = Uuid::now_v7();
        assert!(matches!(
            store.append_event(missing, Event::new("user", "")).await,
            Err(PersistenceError::NotFound(_))
        ));
    }
}
