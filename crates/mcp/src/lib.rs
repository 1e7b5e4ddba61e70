//! # mcp
//!
//! A complete Model Context Protocol server runtime under one dependency:
//! the JSON-RPC envelope and error taxonomy (C1), the transport
//! abstraction and stdio reference transport (C2), the protocol engine and
//! capability gate (C3, C9), the Streamable-HTTP transport with pluggable
//! session/event stores (C4, C5, C6), and the task subsystem (C7, C8).
//!
//! Most applications only need this crate; the `mcp-*` crates it
//! re-exports are independently usable for consumers who want just the
//! wire codec or just the protocol engine.

#![warn(missing_debug_implementations, rust_2018_idioms)]

pub use mcp_core::*;
pub use mcp_protocol::*;
pub use mcp_transport::*;

#[cfg(feature = "http")]
pub use mcp_http as http;

#[cfg(feature = "tasks")]
pub use mcp_tasks as tasks;

/// Re-exports grouped the way a call site typically needs them:
/// `use mcp::prelude::*;` pulls in the engine, the transport trait, and
/// (with default features) the HTTP session manager and task service.
pub mod prelude {
    pub use mcp_core::{ErrorKind, McpError, McpResult, RequestId};
    pub use mcp_protocol::{
        EngineHandle, Handler, OutboundRequestOptions, ProtocolEngine, ProtocolEngineConfig,
        RequestContext,
    };
    pub use mcp_transport::{SendOptions, Transport, TransportEvent};

    #[cfg(feature = "http")]
    pub use mcp_http::{HttpAppState, SessionManager, StreamableHttpConfig};

    #[cfg(feature = "tasks")]
    pub use mcp_tasks::{install_task_handlers, TaskService, TaskSupport};
}
