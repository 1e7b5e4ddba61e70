//! The task record and its status state machine (spec §3, §4.7).

use mcp_core::jsonrpc::RequestId;
use mcp_core::McpError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

pub type TaskId = String;

pub fn generate_task_id() -> TaskId {
    Uuid::new_v4().to_string()
}

/// The task status graph is acyclic from `Working`; `Completed`, `Failed`,
/// and `Cancelled` are terminal and admit no further transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Working,
    InputRequired,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// The stored result of a terminal task: success value or error.
#[derive(Debug, Clone)]
pub enum TaskOutcome {
    Success(Value),
    Failure(McpError),
}

/// Durable task record (spec §3). `ttl_ms` of `None` means unbounded
/// lifetime; otherwise cleanup must occur at or after `created_at_ms +
/// ttl_ms` regardless of status.
#[derive(Debug, Clone)]
pub struct TaskRecord {
    pub task_id: TaskId,
    pub status: TaskStatus,
    pub created_at_ms: i64,
    pub ttl_ms: Option<i64>,
    pub poll_interval_ms: Option<u64>,
    pub status_message: Option<String>,
    pub origin_request_id: RequestId,
    pub origin_request: Value,
    pub session_id: Option<String>,
    pub outcome: Option<TaskOutcome>,
}

impl TaskRecord {
    pub fn new(
        created_at_ms: i64,
        ttl_ms: Option<i64>,
        poll_interval_ms: Option<u64>,
        origin_request_id: RequestId,
        origin_request: Value,
        session_id: Option<String>,
    ) -> Self {
        Self {
            task_id: generate_task_id(),
            status: TaskStatus::Working,
            created_at_ms,
            ttl_ms,
            poll_interval_ms,
            status_message: None,
            origin_request_id,
            origin_request,
            session_id,
            outcome: None,
        }
    }

    pub fn expires_at_ms(&self) -> Option<i64> {
        self.ttl_ms.map(|ttl| self.created_at_ms + ttl)
    }

    pub fn is_expired(&self, now_ms: i64) -> bool {
        self.expires_at_ms().is_some_and(|exp| now_ms >= exp)
    }

    /// Serialize the `{taskId, status, createdAt, ttl, pollInterval,
    /// statusMessage}` envelope returned by `tasks/create` and `tasks/get`.
    pub fn to_status_value(&self) -> Value {
        serde_json::json!({
            "taskId": self.task_id,
            "status": self.status,
            "createdAt": self.created_at_ms,
            "ttl": self.ttl_ms,
            "pollInterval": self.poll_interval_ms,
            "statusMessage": self.status_message,
        })
    }
}
