//! The pluggable task store (C8, spec §3, §4.7): durable records keyed by
//! `taskId`, with TTL cleanup and opaque-cursor pagination.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::task::{TaskId, TaskRecord, TaskStatus};

#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

/// A page of `tasks/list` results: the records plus an opaque cursor for
/// the next page, `None` once exhausted.
#[derive(Debug)]
pub struct TaskPage {
    pub records: Vec<TaskRecord>,
    pub next_cursor: Option<String>,
}

#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn create(&self, record: TaskRecord) -> Result<(), StoreError>;

    async fn get(&self, task_id: &str) -> Result<Option<TaskRecord>, StoreError>;

    /// Apply `mutate` to the record if present and not already terminal
    /// (spec §3: "once terminal, no further transition"). Returns the
    /// record as it stands after the call, or `None` if unknown.
    async fn update(
        &self,
        task_id: &str,
        mutate: Box<dyn FnOnce(&mut TaskRecord) + Send>,
    ) -> Result<Option<TaskRecord>, StoreError>;

    async fn list(
        &self,
        session_id: Option<&str>,
        cursor: Option<String>,
        limit: usize,
    ) -> Result<TaskPage, StoreError>;

    /// Remove every record whose `createdAt + ttl < now_ms`, regardless of
    /// status (spec §4.7: TTL cleanup is unconditional on status).
    async fn sweep_expired(&self, now_ms: i64) -> Result<usize, StoreError>;
}

#[derive(Default)]
pub struct InMemoryTaskStore {
    tasks: DashMap<TaskId, TaskRecord>,
}

impl std::fmt::Debug for InMemoryTaskStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryTaskStore").field("len", &self.tasks.len()).finish()
    }
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn create(&self, record: TaskRecord) -> Result<(), StoreError> {
        self.tasks.insert(record.task_id.clone(), record);
        Ok(())
    }

    async fn get(&self, task_id: &str) -> Result<Option<TaskRecord>, StoreError> {
        Ok(self.tasks.get(task_id).map(|e| e.clone()))
    }

    async fn update(
        &self,
        task_id: &str,
        mutate: Box<dyn FnOnce(&mut TaskRecord) + Send>,
    ) -> Result<Option<TaskRecord>, StoreError> {
        let Some(mut entry) = self.tasks.get_mut(task_id) else {
            return Ok(None);
        };
        if !entry.status.is_terminal() {
            mutate(&mut entry);
        }
        Ok(Some(entry.clone()))
    }

    async fn list(
        &self,
        session_id: Option<&str>,
        cursor: Option<String>,
        limit: usize,
    ) -> Result<TaskPage, StoreError> {
        let mut all: Vec<TaskRecord> = self
            .tasks
            .iter()
            .filter(|e| session_id.is_none() || e.session_id.as_deref() == session_id)
            .map(|e| e.clone())
            .collect();
        all.sort_by(|a, b| a.created_at_ms.cmp(&b.created_at_ms).then(a.task_id.cmp(&b.task_id)));

        let offset = cursor
            .as_deref()
            .and_then(|c| c.parse::<usize>().ok())
            .unwrap_or(0);

        let page: Vec<TaskRecord> = all.iter().skip(offset).take(limit).cloned().collect();
        let next_cursor = if offset + page.len() < all.len() {
            Some((offset + page.len()).to_string())
        } else {
            None
        };

        Ok(TaskPage {
            records: page,
            next_cursor,
        })
    }

    async fn sweep_expired(&self, now_ms: i64) -> Result<usize, StoreError> {
        let before = self.tasks.len();
        self.tasks.retain(|_, record| !record.is_expired(now_ms));
        Ok(before - self.tasks.len())
    }
}

pub type SharedTaskStore = Arc<dyn TaskStore>;

#[cfg(test)]
mod tests {
    use super::*;
    use mcp_core::jsonrpc::RequestId;
    use serde_json::json;

    fn sample(now: i64) -> TaskRecord {
        TaskRecord::new(now, None, Some(1000), RequestId::Number(1), json!({}), None)
    }

    #[tokio::test]
    async fn terminal_record_rejects_further_updates() {
        let store = InMemoryTaskStore::new();
        let record = sample(0);
        let id = record.task_id.clone();
        store.create(record).await.unwrap();

        store
            .update(&id, Box::new(|r| r.status = TaskStatus::Completed))
            .await
            .unwrap();
        store
            .update(&id, Box::new(|r| r.status = TaskStatus::Working))
            .await
            .unwrap();

        let got = store.get(&id).await.unwrap().unwrap();
        assert_eq!(got.status, TaskStatus::Completed);
    }

    #[tokio::test]
    async fn sweep_removes_expired_regardless_of_status() {
        let store = InMemoryTaskStore::new();
        let mut record = sample(0);
        record.ttl_ms = Some(100);
        record.status = TaskStatus::Completed;
        let id = record.task_id.clone();
        store.create(record).await.unwrap();

        let removed = store.sweep_expired(1_000).await.unwrap();
        assert_eq!(removed, 1);
        assert!(store.get(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_paginates_with_opaque_cursor() {
        let store = InMemoryTaskStore::new();
        for i in 0..5 {
            store.create(sample(i)).await.unwrap();
        }
        let page1 = store.list(None, None, 2).await.unwrap();
        assert_eq!(page1.records.len(), 2);
        let cursor = page1.next_cursor.expect("more pages remain");

        let page2 = store.list(None, Some(cursor), 2).await.unwrap();
        assert_eq!(page2.records.len(), 2);

        let page3 = store.list(None, page2.next_cursor, 2).await.unwrap();
        assert_eq!(page3.records.len(), 1);
        assert!(page3.next_cursor.is_none());
    }
}
