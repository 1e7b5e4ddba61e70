//! Per-task change notification, so a blocked `tasks/result` call wakes
//! promptly on the next enqueue or status transition instead of polling
//! (spec §8: "block until next enqueue or terminal transition").

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Notify;

#[derive(Default)]
pub struct TaskWaker {
    notifiers: DashMap<String, Arc<Notify>>,
}

impl std::fmt::Debug for TaskWaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskWaker").field("tracked", &self.notifiers.len()).finish()
    }
}

impl TaskWaker {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, task_id: &str) -> Arc<Notify> {
        self.notifiers
            .entry(task_id.to_owned())
            .or_insert_with(|| Arc::new(Notify::new()))
            .clone()
    }

    /// Wake a waiting `tasks/result` call, if any. Uses `notify_one` rather
    /// than `notify_waiters` so a wake that lands before the subscriber's
    /// `notified().await` is buffered instead of lost.
    pub fn wake(&self, task_id: &str) {
        self.entry(task_id).notify_one();
    }

    pub fn subscribe(&self, task_id: &str) -> Arc<Notify> {
        self.entry(task_id)
    }

    pub fn forget(&self, task_id: &str) {
        self.notifiers.remove(task_id);
    }
}
