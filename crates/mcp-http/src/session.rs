//! Session record and the pluggable session store (C5, spec §4.5).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// A session id. Generated with 128 bits of randomness via [`uuid::Uuid`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Session record (spec §3). `initialized` flips to `true` once the
/// `initialize` handshake completes; `lastActivity` is refreshed on every
/// inbound request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionData {
    pub session_id: SessionId,
    pub initialized: bool,
    pub created_at_ms: i64,
    pub last_activity_ms: i64,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

impl SessionData {
    pub fn new(session_id: SessionId, now_ms: i64) -> Self {
        Self {
            session_id,
            initialized: false,
            created_at_ms: now_ms,
            last_activity_ms: now_ms,
            metadata: HashMap::new(),
        }
    }
}

/// Errors a session store implementation may surface.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

/// A mapping from `sessionId` to [`SessionData`] with TTL semantics (C5).
///
/// Implementations MUST be safe for concurrent access. After `store`
/// returns, `get` on any instance must observe the value subject to the
/// backend's consistency model (spec §4.5).
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn store(&self, data: SessionData) -> Result<(), StoreError>;
    async fn get(&self, id: &SessionId) -> Result<Option<SessionData>, StoreError>;
    async fn update_activity(&self, id: &SessionId, now_ms: i64) -> Result<(), StoreError>;
    async fn delete(&self, id: &SessionId) -> Result<(), StoreError>;
    async fn exists(&self, id: &SessionId) -> Result<bool, StoreError> {
        Ok(self.get(id).await?.is_some())
    }

    /// Reclaim records whose TTL has lapsed (spec §3: "deleted on DELETE or
    /// TTL expiry"). Backends with their own expiry sweep (e.g. Redis'
    /// native TTL) can leave this a no-op; the in-memory store needs an
    /// explicit sweep since nothing else ever evicts its map.
    async fn sweep_expired(&self, _now_ms: i64) -> Result<(), StoreError> {
        Ok(())
    }
}

/// In-process session store for single-instance deployments and tests.
/// Provides the "eventual is acceptable for memory-only caches" tier of
/// consistency named in spec §4.5 — it is in fact strongly consistent
/// since it is just a guarded map, but it carries no cross-process
/// guarantee at all.
pub struct InMemorySessionStore {
    sessions: DashMap<SessionId, SessionData>,
    ttl: Duration,
}

impl std::fmt::Debug for InMemorySessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemorySessionStore")
            .field("sessions", &self.sessions.len())
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl InMemorySessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            ttl,
        }
    }

    /// Remove sessions whose `lastActivity + ttl` has elapsed relative to
    /// `now_ms`. Call periodically from a background task.
    pub fn sweep_expired(&self, now_ms: i64) {
        let ttl_ms = self.ttl.as_millis() as i64;
        self.sessions
            .retain(|_, data| now_ms - data.last_activity_ms < ttl_ms);
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new(Duration::from_secs(3600))
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn store(&self, data: SessionData) -> Result<(), StoreError> {
        self.sessions.insert(data.session_id.clone(), data);
        Ok(())
    }

    async fn get(&self, id: &SessionId) -> Result<Option<SessionData>, StoreError> {
        Ok(self.sessions.get(id).map(|e| e.clone()))
    }

    async fn update_activity(&self, id: &SessionId, now_ms: i64) -> Result<(), StoreError> {
        if let Some(mut entry) = self.sessions.get_mut(id) {
            entry.last_activity_ms = now_ms;
        }
        Ok(())
    }

    async fn delete(&self, id: &SessionId) -> Result<(), StoreError> {
        self.sessions.remove(id);
        Ok(())
    }

    async fn sweep_expired(&self, now_ms: i64) -> Result<(), StoreError> {
        self.sweep_expired(now_ms);
        Ok(())
    }
}

pub type SharedSessionStore = Arc<dyn SessionStore>;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn store_then_get_round_trips() {
        let store = InMemorySessionStore::default();
        let id = SessionId::generate();
        let data = SessionData::new(id.clone(), 1_000);
        store.store(data.clone()).await.unwrap();
        let got = store.get(&id).await.unwrap().unwrap();
        assert_eq!(got.session_id, id);
    }

    #[tokio::test]
    async fn delete_then_exists_is_false() {
        let store = InMemorySessionStore::default();
        let id = SessionId::generate();
        store.store(SessionData::new(id.clone(), 0)).await.unwrap();
        store.delete(&id).await.unwrap();
        assert!(!store.exists(&id).await.unwrap());
    }

    #[tokio::test]
    async fn sweep_removes_expired_sessions() {
        let store = InMemorySessionStore::new(Duration::from_millis(100));
        let id = SessionId::generate();
        store.store(SessionData::new(id.clone(), 0)).await.unwrap();
        store.sweep_expired(1_000);
        assert!(!store.exists(&id).await.unwrap());
    }
}
