//! Resumable per-stream event log (C6, spec §4.6).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::Value;

/// Identifies one SSE stream (a specific POST's response stream, or the
/// standalone GET stream) within a session.
pub type StreamId = String;

/// Opaque, per-stream monotonic event id. Clients treat it as a cookie
/// (spec §9); only within-stream ordering is guaranteed.
pub type EventId = u64;

#[derive(Debug, Clone)]
pub struct StoredEvent {
    pub event_id: EventId,
    pub stream_id: StreamId,
    pub message: Value,
}

/// Append-only per-stream event log backing SSE resumability.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Append `message` to `stream_id`'s log, returning its assigned id.
    async fn append(&self, stream_id: &str, message: Value) -> EventId;

    /// Invoke `send` for every event in `streamId`'s log strictly after
    /// `last_event_id`, in id order, then return which stream they belong
    /// to. An unknown `last_event_id` is treated as "replay nothing, this
    /// is a new stream" rather than an error (spec §8: boundary behavior).
    async fn replay_after(
        &self,
        last_event_id: EventId,
        send: &(dyn Fn(EventId, Value) + Send + Sync),
    ) -> Option<StreamId>;

    async fn stream_id_for(&self, event_id: EventId) -> Option<StreamId> {
        let _ = event_id;
        None
    }
}

/// In-memory event store. Retention is unbounded here; a production
/// deployment would cap history per stream and rely on client reconnects
/// happening inside a bounded window (spec §4.6: "at least long enough to
/// span reasonable reconnect windows").
#[derive(Default)]
pub struct InMemoryEventStore {
    next_id: AtomicU64,
    events: Mutex<Vec<StoredEvent>>,
    by_stream: DashMap<StreamId, Vec<EventId>>,
}

impl std::fmt::Debug for InMemoryEventStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryEventStore")
            .field("next_id", &self.next_id.load(Ordering::Relaxed))
            .field("streams", &self.by_stream.len())
            .finish()
    }
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            events: Mutex::new(Vec::new()),
            by_stream: DashMap::new(),
        }
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn append(&self, stream_id: &str, message: Value) -> EventId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.events.lock().push(StoredEvent {
            event_id: id,
            stream_id: stream_id.to_owned(),
            message,
        });
        self.by_stream
            .entry(stream_id.to_owned())
            .or_default()
            .push(id);
        id
    }

    async fn replay_after(
        &self,
        last_event_id: EventId,
        send: &(dyn Fn(EventId, Value) + Send + Sync),
    ) -> Option<StreamId> {
        let events = self.events.lock();
        let stream_id = events
            .iter()
            .find(|e| e.event_id == last_event_id)
            .map(|e| e.stream_id.clone());

        // Unknown last_event_id: treat as a brand new stream, no replay.
        let stream_id = stream_id?;

        for event in events
            .iter()
            .filter(|e| e.stream_id == stream_id && e.event_id > last_event_id)
        {
            send(event.event_id, event.message.clone());
        }
        Some(stream_id)
    }

    async fn stream_id_for(&self, event_id: EventId) -> Option<StreamId> {
        self.events
            .lock()
            .iter()
            .find(|e| e.event_id == event_id)
            .map(|e| e.stream_id.clone())
    }
}

pub type SharedEventStore = Arc<dyn EventStore>;
