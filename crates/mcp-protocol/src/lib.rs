//! # mcp-protocol
//!
//! The protocol engine (C3): dispatch, correlation, cancellation, timeouts,
//! and progress relay over a [`mcp_transport::Transport`], plus the
//! capability gate (C9) and protocol version negotiation.

#![warn(missing_debug_implementations, rust_2018_idioms)]

mod config;
mod engine;
mod handler;
mod inbound;
mod pending;
mod version;

pub use config::ProtocolEngineConfig;
pub use engine::{EngineHandle, OutboundRequestOptions, ProtocolEngine};
pub use handler::{Handler, RequestContext, SharedHandler};
pub use version::negotiate_version;

pub use mcp_core::constants::methods;
