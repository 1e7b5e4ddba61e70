//! The pending-request table (spec §5: "mutated by exactly two agents per
//! id: the dispatcher on receive, and the caller on cancel/timeout").

use std::sync::Arc;

use dashmap::DashMap;
use mcp_core::{McpResult, RequestId};
use tokio::sync::{oneshot, Notify};

/// Callback invoked when a `notifications/progress` arrives for an
/// outbound request's progress token.
pub type ProgressCallback = Arc<dyn Fn(f64, Option<f64>, Option<String>) + Send + Sync>;

pub(crate) struct PendingOutbound {
    pub response_tx: Option<oneshot::Sender<McpResult<serde_json::Value>>>,
    pub progress_notify: Arc<Notify>,
    pub progress_callback: Option<ProgressCallback>,
}

/// Table of in-flight outbound requests, keyed by the id we allocated.
#[derive(Default)]
pub(crate) struct PendingTable {
    inner: DashMap<RequestId, PendingOutbound>,
}

impl PendingTable {
    pub fn insert(&self, id: RequestId, entry: PendingOutbound) {
        self.inner.insert(id, entry);
    }

    /// Remove and resolve the entry for `id`, if still present. A missing
    /// entry means the slot was already released (timeout/cancel raced the
    /// response) — callers must tolerate this silently.
    pub fn resolve(&self, id: &RequestId, result: McpResult<serde_json::Value>) {
        if let Some((_, mut entry)) = self.inner.remove(id) {
            if let Some(tx) = entry.response_tx.take() {
                let _ = tx.send(result);
            }
        }
    }

    /// Remove the entry without resolving it (the caller already owns the
    /// receiver half and is about to materialize timeout/cancellation
    /// locally).
    pub fn take(&self, id: &RequestId) -> Option<PendingOutbound> {
        self.inner.remove(id).map(|(_, v)| v)
    }

    pub fn on_progress(&self, id: &RequestId, progress: f64, total: Option<f64>, message: Option<String>) {
        if let Some(entry) = self.inner.get(id) {
            entry.progress_notify.notify_one();
            if let Some(cb) = &entry.progress_callback {
                cb(progress, total, message);
            }
        }
    }

    /// Drain all entries, resolving each with `ConnectionClosed` (used on
    /// transport close).
    pub fn close_all(&self) {
        let ids: Vec<RequestId> = self.inner.iter().map(|e| e.key().clone()).collect();
        for id in ids {
            self.resolve(&id, Err(mcp_core::McpError::connection_closed()));
        }
    }
}
