//! The task subsystem's core logic (C7, spec §4.7): creation, the
//! `tasks/result` side-channel delivery loop, cancellation, and the
//! automatic-polling fallback for `taskSupport: "optional"` tools.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use mcp_core::jsonrpc::RequestId;
use mcp_core::{McpError, McpResult};
use mcp_protocol::RequestContext;
use serde_json::Value;
use tracing::{instrument, warn};

use crate::queue::{reject_all, QueuedKind, QueuedMessage, SharedMessageQueue};
use crate::store::{SharedTaskStore, TaskPage};
use crate::task::{TaskId, TaskOutcome, TaskRecord, TaskStatus};
use crate::waker::TaskWaker;

pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// How a tool declares its relationship to the task subsystem (spec §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskSupport {
    /// The tool always returns a task handle.
    Required,
    /// The tool returns a task handle only if the caller asked for one via
    /// `_meta.task`; otherwise the engine polls internally and returns the
    /// plain synchronous result.
    Optional,
    /// The tool never produces a task.
    None,
}

#[derive(Clone)]
pub struct TaskService {
    store: SharedTaskStore,
    queue: SharedMessageQueue,
    waker: Arc<TaskWaker>,
}

impl std::fmt::Debug for TaskService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskService").finish_non_exhaustive()
    }
}

impl TaskService {
    pub fn new(store: SharedTaskStore, queue: SharedMessageQueue) -> Self {
        Self {
            store,
            queue,
            waker: Arc::new(TaskWaker::new()),
        }
    }

    /// Create and persist a new task record in `working` status.
    #[instrument(skip(self, origin_request))]
    pub async fn create_task(
        &self,
        ttl_ms: Option<i64>,
        poll_interval_ms: Option<u64>,
        origin_request_id: RequestId,
        origin_request: Value,
        session_id: Option<String>,
    ) -> McpResult<TaskRecord> {
        let record = TaskRecord::new(
            now_ms(),
            ttl_ms,
            poll_interval_ms,
            origin_request_id,
            origin_request,
            session_id,
        );
        self.store
            .create(record.clone())
            .await
            .map_err(|e| McpError::internal(e.to_string()))?;
        Ok(record)
    }

    pub async fn get(&self, task_id: &str) -> McpResult<Option<TaskRecord>> {
        self.store
            .get(task_id)
            .await
            .map_err(|e| McpError::internal(e.to_string()))
    }

    pub async fn list(
        &self,
        session_id: Option<&str>,
        cursor: Option<String>,
        limit: usize,
    ) -> McpResult<TaskPage> {
        self.store
            .list(session_id, cursor, limit)
            .await
            .map_err(|e| McpError::internal(e.to_string()))
    }

    /// Queue a one-way notification (progress, log) for delivery on the
    /// next `tasks/result` side channel.
    pub async fn enqueue_notification(
        &self,
        task_id: &str,
        session_id: Option<&str>,
        method: &str,
        params: Option<Value>,
    ) -> McpResult<()> {
        self.queue
            .enqueue(
                task_id,
                session_id,
                QueuedMessage::notification(method, params, now_ms()),
                None,
            )
            .await
            .map_err(|e| McpError::internal(e.to_string()))?;
        self.waker.wake(task_id);
        Ok(())
    }

    /// Queue a server-initiated request (sampling, elicitation) and await
    /// its reply. The reply is actually sent once a `tasks/result` call
    /// dequeues this message and forwards it over its own stream; this
    /// call just parks until that resolver fires or the task is
    /// cancelled/failed out from under it.
    pub async fn enqueue_request(
        &self,
        task_id: &str,
        session_id: Option<&str>,
        method: &str,
        params: Option<Value>,
        max_queue_size: Option<usize>,
    ) -> McpResult<Value> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.queue
            .enqueue(
                task_id,
                session_id,
                QueuedMessage::request(method, params, now_ms(), tx),
                max_queue_size,
            )
            .await
            .map_err(|e| McpError::internal(e.to_string()))?;
        self.waker.wake(task_id);
        rx.await.unwrap_or_else(|_| Err(McpError::connection_closed()))
    }

    /// Transition a task to `input_required`, signalling that the handler
    /// is now waiting on a queued request's reply.
    pub async fn mark_input_required(&self, task_id: &str) -> McpResult<()> {
        self.transition(task_id, TaskStatus::InputRequired, None).await
    }

    pub async fn complete(&self, task_id: &str, result: Value) -> McpResult<()> {
        self.set_outcome(task_id, TaskStatus::Completed, TaskOutcome::Success(result)).await
    }

    pub async fn fail(&self, task_id: &str, error: McpError) -> McpResult<()> {
        self.set_outcome(task_id, TaskStatus::Failed, TaskOutcome::Failure(error)).await
    }

    async fn set_outcome(&self, task_id: &str, status: TaskStatus, outcome: TaskOutcome) -> McpResult<()> {
        let task_id_owned = task_id.to_owned();
        self.store
            .update(
                task_id,
                Box::new(move |r| {
                    r.status = status;
                    r.outcome = Some(outcome);
                }),
            )
            .await
            .map_err(|e| McpError::internal(e.to_string()))?;

        // Draining rejects any request still waiting on a reply that will
        // now never come over this now-terminal task (spec §3).
        let drained = self.queue.dequeue_all(&task_id_owned, None).await;
        let reason = if status == TaskStatus::Failed { "task failed" } else { "task cancelled" };
        reject_all(drained, McpError::cancelled(Some(reason)));

        self.waker.wake(&task_id_owned);
        Ok(())
    }

    async fn transition(&self, task_id: &str, status: TaskStatus, message: Option<String>) -> McpResult<()> {
        self.store
            .update(
                task_id,
                Box::new(move |r| {
                    r.status = status;
                    r.status_message = message;
                }),
            )
            .await
            .map_err(|e| McpError::internal(e.to_string()))?;
        self.waker.wake(task_id);
        Ok(())
    }

    /// `tasks/cancel`: transition to `cancelled` and reject every queued
    /// resolver.
    pub async fn cancel(&self, task_id: &str) -> McpResult<TaskRecord> {
        self.set_outcome(
            task_id,
            TaskStatus::Cancelled,
            TaskOutcome::Failure(McpError::cancelled(Some("task cancelled"))),
        )
        .await?;
        self.get(task_id)
            .await?
            .ok_or_else(|| McpError::invalid_params(format!("unknown task: {task_id}")))
    }

    /// `tasks/result`: if terminal, return the stored outcome immediately.
    /// If `input_required` or `working`, drain and forward queued
    /// side-channel messages over `ctx`'s stream until the task reaches a
    /// terminal state, blocking on the task's waker between drains rather
    /// than busy-polling (spec §4.7, §8).
    #[instrument(skip(self, ctx))]
    pub async fn result(&self, task_id: &str, ctx: &RequestContext) -> McpResult<Value> {
        loop {
            let Some(record) = self.get(task_id).await? else {
                return Err(McpError::invalid_params(format!("unknown task: {task_id}")));
            };

            if record.status.is_terminal() {
                return Self::finalize(task_id, record);
            }

            let notify = self.waker.subscribe(task_id);
            let notified = notify.notified();

            let mut drained_any = false;
            while let Some(msg) = self.queue.dequeue(task_id, None).await {
                drained_any = true;
                self.forward(ctx, msg).await;
            }

            if !drained_any {
                notified.await;
            }
        }
    }

    async fn forward(&self, ctx: &RequestContext, msg: QueuedMessage) {
        match msg.kind {
            QueuedKind::Notification => {
                if let Err(e) = ctx.send_notification(&msg.method, msg.params).await {
                    warn!(error = %e, "failed to forward queued notification");
                }
            }
            QueuedKind::Request => {
                let method = msg.method.clone();
                let params = msg.params.clone();
                let result = ctx
                    .send_request(&method, params, mcp_protocol::OutboundRequestOptions::default())
                    .await;
                msg.resolve(result);
            }
        }
    }

    fn finalize(task_id: &str, record: TaskRecord) -> McpResult<Value> {
        let related = serde_json::json!({"taskId": task_id});
        match record.outcome {
            Some(TaskOutcome::Success(mut value)) => {
                if let Some(obj) = value.as_object_mut() {
                    obj.entry("_meta")
                        .or_insert_with(|| Value::Object(Default::default()))
                        .as_object_mut()
                        .map(|meta| meta.insert("relatedTask".into(), related));
                }
                Ok(value)
            }
            Some(TaskOutcome::Failure(err)) => Err(err.with_data(serde_json::json!({"_meta": {"relatedTask": related}}))),
            None => Err(McpError::internal("terminal task carries no outcome")),
        }
    }

    /// Automatic polling mode (spec §4.7): poll the store at
    /// `pollInterval` until the task is terminal, then return the plain
    /// synchronous result, hiding the task indirection from the caller.
    pub async fn poll_until_terminal(&self, task_id: &TaskId, poll_interval: Duration) -> McpResult<Value> {
        loop {
            let Some(record) = self.get(task_id).await? else {
                return Err(McpError::internal(format!("task disappeared during polling: {task_id}")));
            };
            if record.status.is_terminal() {
                return Self::finalize(task_id, record);
            }
            tokio::time::sleep(poll_interval).await;
        }
    }

    pub async fn sweep_expired(&self) -> McpResult<usize> {
        self.store
            .sweep_expired(now_ms())
            .await
            .map_err(|e| McpError::internal(e.to_string()))
    }
}
