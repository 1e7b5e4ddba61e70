//! Per-task FIFO side-channel queue (C8, spec §3, §4.7).
//!
//! A queued message is either a server-initiated request awaiting a reply
//! (sampling, elicitation) or a one-way notification (progress). Enqueue
//! enforces `maxSize` atomically to avoid check-then-act races.

use std::collections::VecDeque;

use async_trait::async_trait;
use dashmap::DashMap;
use mcp_core::{McpError, McpResult};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::oneshot;

use crate::task::TaskId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueuedKind {
    Request,
    Notification,
}

/// One message waiting to be delivered over a `tasks/result` side channel.
pub struct QueuedMessage {
    pub kind: QueuedKind,
    pub method: String,
    pub params: Option<Value>,
    pub enqueued_at_ms: i64,
    /// Present for `Request` messages: fulfilled at most once, either with
    /// the client's reply or a rejection if the task is cancelled/failed
    /// before the reply arrives (spec §8).
    pub response_resolver: Option<oneshot::Sender<McpResult<Value>>>,
}

impl std::fmt::Debug for QueuedMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueuedMessage")
            .field("kind", &self.kind)
            .field("method", &self.method)
            .field("enqueued_at_ms", &self.enqueued_at_ms)
            .finish_non_exhaustive()
    }
}

impl QueuedMessage {
    pub fn notification(method: impl Into<String>, params: Option<Value>, now_ms: i64) -> Self {
        Self {
            kind: QueuedKind::Notification,
            method: method.into(),
            params,
            enqueued_at_ms: now_ms,
            response_resolver: None,
        }
    }

    pub fn request(
        method: impl Into<String>,
        params: Option<Value>,
        now_ms: i64,
        response_resolver: oneshot::Sender<McpResult<Value>>,
    ) -> Self {
        Self {
            kind: QueuedKind::Request,
            method: method.into(),
            params,
            enqueued_at_ms: now_ms,
            response_resolver: Some(response_resolver),
        }
    }

    /// Fulfil (or reject, on drain) this message's resolver. No-op for
    /// notifications or if the resolver side has already gone away.
    pub fn resolve(self, result: McpResult<Value>) {
        if let Some(tx) = self.response_resolver {
            let _ = tx.send(result);
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum QueueError {
    #[error("queue for task {0} is full")]
    Full(TaskId),
}

/// The per-task FIFO abstraction (C8). `session_id` scopes multi-tenant
/// deployments; the in-memory implementation here ignores it beyond
/// namespacing the key, since it already trusts its caller.
#[async_trait]
pub trait MessageQueue: Send + Sync {
    async fn enqueue(
        &self,
        task_id: &str,
        session_id: Option<&str>,
        message: QueuedMessage,
        max_size: Option<usize>,
    ) -> Result<(), QueueError>;

    /// Remove and return the head of the queue, or `None` if empty. Never
    /// blocks waiting for a message to arrive (spec §4.7).
    async fn dequeue(&self, task_id: &str, session_id: Option<&str>) -> Option<QueuedMessage>;

    /// Drain the entire queue, in FIFO order. Used on cancel/fail to reject
    /// every outstanding resolver.
    async fn dequeue_all(&self, task_id: &str, session_id: Option<&str>) -> Vec<QueuedMessage>;
}

fn key(task_id: &str, session_id: Option<&str>) -> String {
    match session_id {
        Some(s) => format!("{s}:{task_id}"),
        None => task_id.to_owned(),
    }
}

#[derive(Default)]
pub struct InMemoryMessageQueue {
    queues: DashMap<String, Mutex<VecDeque<QueuedMessage>>>,
}

impl std::fmt::Debug for InMemoryMessageQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryMessageQueue").finish_non_exhaustive()
    }
}

impl InMemoryMessageQueue {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MessageQueue for InMemoryMessageQueue {
    async fn enqueue(
        &self,
        task_id: &str,
        session_id: Option<&str>,
        message: QueuedMessage,
        max_size: Option<usize>,
    ) -> Result<(), QueueError> {
        let entry = self.queues.entry(key(task_id, session_id)).or_default();
        let mut guard = entry.lock();
        if let Some(max) = max_size {
            if guard.len() >= max {
                return Err(QueueError::Full(task_id.to_owned()));
            }
        }
        guard.push_back(message);
        Ok(())
    }

    async fn dequeue(&self, task_id: &str, session_id: Option<&str>) -> Option<QueuedMessage> {
        let entry = self.queues.get(&key(task_id, session_id))?;
        entry.lock().pop_front()
    }

    async fn dequeue_all(&self, task_id: &str, session_id: Option<&str>) -> Vec<QueuedMessage> {
        let Some(entry) = self.queues.get(&key(task_id, session_id)) else {
            return Vec::new();
        };
        entry.lock().drain(..).collect()
    }
}

pub type SharedMessageQueue = std::sync::Arc<dyn MessageQueue>;

/// Helper for rejecting a drained queue's resolvers, e.g. on cancellation.
pub fn reject_all(messages: Vec<QueuedMessage>, error: McpError) {
    for msg in messages {
        msg.resolve(Err(error.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fifo_order_preserved() {
        let q = InMemoryMessageQueue::new();
        q.enqueue("t1", None, QueuedMessage::notification("a", None, 0), None)
            .await
            .unwrap();
        q.enqueue("t1", None, QueuedMessage::notification("b", None, 0), None)
            .await
            .unwrap();
        let first = q.dequeue("t1", None).await.unwrap();
        assert_eq!(first.method, "a");
        let second = q.dequeue("t1", None).await.unwrap();
        assert_eq!(second.method, "b");
        assert!(q.dequeue("t1", None).await.is_none());
    }

    #[tokio::test]
    async fn enqueue_rejects_when_full() {
        let q = InMemoryMessageQueue::new();
        q.enqueue("t1", None, QueuedMessage::notification("a", None, 0), Some(1))
            .await
            .unwrap();
        let err = q
            .enqueue("t1", None, QueuedMessage::notification("b", None, 0), Some(1))
            .await
            .unwrap_err();
        assert!(matches!(err, QueueError::Full(_)));
    }

    #[tokio::test]
    async fn dequeue_all_drains_in_order() {
        let q = InMemoryMessageQueue::new();
        for m in ["a", "b", "c"] {
            q.enqueue("t1", None, QueuedMessage::notification(m, None, 0), None)
                .await
                .unwrap();
        }
        let drained = q.dequeue_all("t1", None).await;
        let methods: Vec<_> = drained.iter().map(|m| m.method.as_str()).collect();
        assert_eq!(methods, vec!["a", "b", "c"]);
        assert!(q.dequeue_all("t1", None).await.is_empty());
    }

    #[tokio::test]
    async fn sessions_namespace_separately() {
        let q = InMemoryMessageQueue::new();
        q.enqueue("t1", Some("s1"), QueuedMessage::notification("a", None, 0), None)
            .await
            .unwrap();
        assert!(q.dequeue("t1", Some("s2")).await.is_none());
        assert!(q.dequeue("t1", Some("s1")).await.is_some());
    }
}
