//! # mcp-http
//!
//! The Streamable-HTTP transport (C4, spec §4.4): a single axum endpoint
//! handling POST/GET/DELETE, backed by a pluggable session store (C5,
//! §4.5) and event store (C6, §4.6) for horizontal deployments.

#![warn(missing_debug_implementations, rust_2018_idioms)]

pub mod config;
pub mod event_store;
pub mod manager;
pub mod router;
pub mod session;
pub mod sse;
pub mod transport;

pub use config::{SessionIdMode, StreamableHttpConfig};
pub use event_store::{EventId, EventStore, InMemoryEventStore, SharedEventStore, StoredEvent, StreamId};
pub use manager::{HandlerInstaller, SessionHandle, SessionManager};
pub use router::{router, run_shutdown_listener, run_sweeper, HttpAppState};
pub use session::{InMemorySessionStore, SessionData, SessionId, SessionStore, SharedSessionStore, StoreError};
pub use sse::SseEvent;
pub use transport::HttpSessionTransport;
