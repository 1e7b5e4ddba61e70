//! # mcp-core
//!
//! The JSON-RPC 2.0 envelope (C1), the stable error-code taxonomy, the
//! `AuthInfo` capsule, and typed capability structs shared by every other
//! crate in this workspace. Nothing here knows about transports, sessions,
//! or tasks — those layers build on top of these types.

#![warn(missing_debug_implementations, rust_2018_idioms)]

pub mod auth;
pub mod capabilities;
pub mod constants;
pub mod error;
pub mod jsonrpc;
pub mod logging;

pub use auth::AuthInfo;
pub use capabilities::{ClientCapabilities, ServerCapabilities};
pub use error::{ErrorKind, McpError, McpResult};
pub use jsonrpc::{
    JsonRpcError, JsonRpcErrorObject, JsonRpcMessage, JsonRpcNotification, JsonRpcRequest,
    JsonRpcResponse, JsonRpcVersion, RequestId, JSONRPC_VERSION,
};
pub use logging::LogLevel;
