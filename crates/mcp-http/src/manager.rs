//! Ties together session storage, per-session protocol engines, and the
//! DNS-rebinding defense for the streamable-HTTP transport (spec §4.4).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use mcp_core::{McpError, McpResult};
use mcp_protocol::{EngineHandle, ProtocolEngine, ProtocolEngineConfig, RequestContext, SharedHandler};
use tracing::{debug, instrument};

use crate::config::{SessionIdMode, StreamableHttpConfig};
use crate::session::{SessionData, SessionId, SharedSessionStore};
use crate::transport::HttpSessionTransport;

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// A session's live engine plus the transport backing it. Handlers are
/// registered once, at creation, by the caller of [`SessionManager::new`].
pub struct SessionHandle {
    pub transport: Arc<HttpSessionTransport>,
    pub engine: EngineHandle,
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle").field("transport", &self.transport).finish_non_exhaustive()
    }
}

/// Function that wires request/notification handlers onto a freshly
/// created [`ProtocolEngine`], invoked once per session. Lets the HTTP
/// layer stay agnostic of what methods the embedding server exposes.
pub type HandlerInstaller = Arc<dyn Fn(&ProtocolEngine) + Send + Sync>;

/// Owns the live session table: validates Host/Origin, creates sessions
/// on the first `initialize`, and looks up the transport/engine pair for
/// subsequent requests.
pub struct SessionManager {
    config: StreamableHttpConfig,
    store: SharedSessionStore,
    live: DashMap<SessionId, Arc<SessionHandle>>,
    install_handlers: HandlerInstaller,
    shutting_down: AtomicBool,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("config", &self.config)
            .field("live_sessions", &self.live.len())
            .finish_non_exhaustive()
    }
}

impl SessionManager {
    pub fn new(
        config: StreamableHttpConfig,
        store: SharedSessionStore,
        install_handlers: HandlerInstaller,
    ) -> Self {
        Self {
            config,
            store,
            live: DashMap::new(),
            install_handlers,
            shutting_down: AtomicBool::new(false),
        }
    }

    /// Whether [`shutdown`](Self::shutdown) has been called. Checked by the
    /// router to reject new POSTs/GETs with `503` (spec §9, ambient).
    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::Acquire)
    }

    /// Close every live session's transport, flushing open SSE streams, and
    /// stop accepting new ones. Idempotent.
    pub async fn shutdown(&self) {
        self.shutting_down.store(true, Ordering::Release);
        let ids: Vec<SessionId> = self.live.iter().map(|e| e.key().clone()).collect();
        for id in ids {
            if let Some((_, session)) = self.live.remove(&id) {
                let _ = session.transport.close().await;
            }
        }
    }

    pub fn config(&self) -> &StreamableHttpConfig {
        &self.config
    }

    /// Validate `Host`/`Origin` against the configured allow-lists. Empty
    /// allow-lists disable the check (spec §4.4).
    pub fn check_rebinding(&self, host: Option<&str>, origin: Option<&str>) -> Result<(), McpError> {
        if !self.config.allowed_hosts.is_empty() {
            let ok = host.map(|h| self.config.allowed_hosts.iter().any(|a| a == h)).unwrap_or(false);
            if !ok {
                return Err(McpError::invalid_request("Host header not allowed"));
            }
        }
        if !self.config.allowed_origins.is_empty() {
            let ok = origin.map(|o| self.config.allowed_origins.iter().any(|a| a == o)).unwrap_or(false);
            if !ok {
                return Err(McpError::invalid_request("Origin header not allowed"));
            }
        }
        Ok(())
    }

    /// Create a brand new session (stateful mode only) and start its
    /// engine. Returns `None` in stateless mode, where no session table
    /// entry is kept.
    #[instrument(skip(self))]
    pub async fn create_session(&self) -> McpResult<Option<Arc<SessionHandle>>> {
        if self.config.session_id_mode == SessionIdMode::None {
            return Ok(None);
        }
        let session_id = SessionId::generate();
        self.store
            .store(SessionData::new(session_id.clone(), now_ms()))
            .await
            .map_err(|e| McpError::internal(e.to_string()))?;

        let transport = HttpSessionTransport::new(Some(session_id.clone()));
        let engine = ProtocolEngine::new(transport.clone(), ProtocolEngineConfig::default());
        (self.install_handlers)(&engine);
        let handle = engine.start().await?;

        let session = Arc::new(SessionHandle {
            transport,
            engine: handle,
        });
        self.live.insert(session_id.clone(), session.clone());
        debug!(%session_id, "session created");
        Ok(Some(session))
    }

    /// Build a transient session for one request in stateless mode
    /// (`SessionIdMode::None`, spec §4.4: "servers MAY operate without
    /// sessions"). Not stored, not inserted into `live` — it lives only for
    /// the duration of the caller's request/response cycle.
    pub async fn create_stateless(&self) -> McpResult<Arc<SessionHandle>> {
        let transport = HttpSessionTransport::new(None);
        let engine = ProtocolEngine::new(transport.clone(), ProtocolEngineConfig::default());
        (self.install_handlers)(&engine);
        let handle = engine.start().await?;
        Ok(Arc::new(SessionHandle {
            transport,
            engine: handle,
        }))
    }

    /// Look up a session by id. On a local-cache miss, falls back to the
    /// shared store (spec §4.5): a session created on another pod is
    /// reconstructed here and adopted into this instance's `live` table so
    /// subsequent lookups hit the fast path.
    pub async fn get(&self, id: &SessionId) -> McpResult<Option<Arc<SessionHandle>>> {
        if let Some(s) = self.live.get(id) {
            self.store
                .update_activity(id, now_ms())
                .await
                .map_err(|e| McpError::internal(e.to_string()))?;
            return Ok(Some(s.clone()));
        }

        let Some(_data) = self.store.get(id).await.map_err(|e| McpError::internal(e.to_string()))? else {
            return Ok(None);
        };

        let transport = HttpSessionTransport::new(Some(id.clone()));
        let engine = ProtocolEngine::new(transport.clone(), ProtocolEngineConfig::default());
        (self.install_handlers)(&engine);
        let handle = engine.start().await?;
        let session = Arc::new(SessionHandle {
            transport,
            engine: handle,
        });

        self.store
            .update_activity(id, now_ms())
            .await
            .map_err(|e| McpError::internal(e.to_string()))?;
        self.live.insert(id.clone(), session.clone());
        debug!(session_id = %id, "session adopted from shared store");
        Ok(Some(session))
    }

    pub async fn terminate(&self, id: &SessionId) -> McpResult<bool> {
        let Some((_, session)) = self.live.remove(id) else {
            return Ok(false);
        };
        let _ = session.transport.close().await;
        self.store
            .delete(id)
            .await
            .map_err(|e| McpError::internal(e.to_string()))?;
        Ok(true)
    }

    /// Periodic sweep: reclaim TTL-expired store records, then drop live
    /// sessions whose store record has expired or disappeared as a result.
    /// Call from a background task.
    pub async fn sweep(&self) {
        let _ = self.store.sweep_expired(now_ms()).await;

        let mut stale = Vec::new();
        for entry in self.live.iter() {
            let id = entry.key().clone();
            match self.store.exists(&id).await {
                Ok(true) => {}
                _ => stale.push(id),
            }
        }
        for id in stale {
            if let Some((_, session)) = self.live.remove(&id) {
                let _ = session.transport.close().await;
            }
        }
    }
}

/// A trivial handler wrapper for `register_handler`/`register_notification_handler`
/// call sites that want a bare async fn; kept here since every consumer of
/// this crate's router needs it to install its own methods.
pub fn handler_fn<F, Fut>(f: F) -> SharedHandler
where
    F: Fn(Option<serde_json::Value>, RequestContext) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = McpResult<serde_json::Value>> + Send + 'static,
{
    Arc::new(f)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::InMemorySessionStore;
    use std::time::Duration;

    fn manager() -> SessionManager {
        SessionManager::new(
            StreamableHttpConfig::default(),
            Arc::new(InMemorySessionStore::new(Duration::from_secs(3600))),
            Arc::new(|_engine: &ProtocolEngine| {}),
        )
    }

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let mgr = manager();
        let session = mgr.create_session().await.unwrap().unwrap();
        let id = SessionId(session.transport.session_id().unwrap());
        assert!(mgr.get(&id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn terminate_removes_session() {
        let mgr = manager();
        let session = mgr.create_session().await.unwrap().unwrap();
        let id = SessionId(session.transport.session_id().unwrap());
        assert!(mgr.terminate(&id).await.unwrap());
        assert!(mgr.get(&id).await.unwrap().is_none());
        assert!(!mgr.terminate(&id).await.unwrap());
    }

    #[tokio::test]
    async fn sweep_reclaims_ttl_expired_sessions() {
        let mgr = SessionManager::new(
            StreamableHttpConfig::default(),
            Arc::new(InMemorySessionStore::new(Duration::from_millis(0))),
            Arc::new(|_: &ProtocolEngine| {}),
        );
        let session = mgr.create_session().await.unwrap().unwrap();
        let id = SessionId(session.transport.session_id().unwrap());
        tokio::time::sleep(Duration::from_millis(5)).await;
        mgr.sweep().await;
        assert!(mgr.get(&id).await.unwrap().is_none());
    }

    #[test]
    fn rebinding_check_disabled_when_lists_empty() {
        let mgr = manager();
        assert!(mgr.check_rebinding(None, None).is_ok());
    }

    #[test]
    fn rebinding_check_rejects_unlisted_host() {
        let mut cfg = StreamableHttpConfig::default();
        cfg.allowed_hosts = vec!["example.com".into()];
        let mgr = SessionManager::new(
            cfg,
            Arc::new(InMemorySessionStore::default()),
            Arc::new(|_: &ProtocolEngine| {}),
        );
        assert!(mgr.check_rebinding(Some("evil.com"), None).is_err());
        assert!(mgr.check_rebinding(Some("example.com"), None).is_ok());
    }
}
