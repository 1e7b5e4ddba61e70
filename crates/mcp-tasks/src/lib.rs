//! # mcp-tasks
//!
//! The task subsystem (C7/C8, spec §3, §4.7): durable task records, a
//! per-task FIFO side-channel queue, `tasks/*` handlers, and the
//! automatic-polling fallback for `taskSupport: "optional"` tools.

#![warn(missing_debug_implementations, rust_2018_idioms)]

pub mod handlers;
pub mod queue;
pub mod service;
pub mod store;
pub mod task;
pub mod waker;

pub use handlers::install_task_handlers;
pub use queue::{
    reject_all, InMemoryMessageQueue, MessageQueue, QueueError, QueuedKind, QueuedMessage,
    SharedMessageQueue,
};
pub use service::{now_ms, TaskService, TaskSupport};
pub use store::{InMemoryTaskStore, SharedTaskStore, StoreError, TaskPage, TaskStore};
pub use task::{generate_task_id, TaskId, TaskOutcome, TaskRecord, TaskStatus};
pub use waker::TaskWaker;
