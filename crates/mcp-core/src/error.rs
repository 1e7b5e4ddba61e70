//! Unified MCP error type and the stable JSON-RPC error code taxonomy
//! (spec §4.1, §7).

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Result alias used throughout the workspace.
pub type McpResult<T> = Result<T, McpError>;

/// Stable error codes. Negative values below `-32000` are the JSON-RPC
/// standard; the `-3200x` range is reserved for connection/timeout; anything
/// above is an application-defined extension (e.g. URL elicitation).
pub mod codes {
    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;
    pub const CONNECTION_CLOSED: i32 = -32000;
    pub const REQUEST_TIMEOUT: i32 = -32001;
    /// Reserved application range start (e.g. `UrlElicitationRequired`).
    pub const APP_ERROR_RANGE_START: i32 = -31999;
}

/// Error classification, one per stable code plus a handful of local-only
/// kinds that never cross the wire as a JSON-RPC error (cancellation,
/// transport failure).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ParseError,
    InvalidRequest,
    MethodNotFound,
    InvalidParams,
    Internal,
    ConnectionClosed,
    RequestTimeout,
    /// Out-of-band user interaction required; propagated unwrapped (§7).
    UrlElicitationRequired,
    /// Capability gate (C9) rejected the method/notification.
    CapabilityDenied,
    /// Cancelled via `notifications/cancelled`; never serialized, the
    /// cancellation notification itself is the signal.
    Cancelled,
}

impl ErrorKind {
    /// The JSON-RPC wire code for this kind, where one exists.
    pub const fn code(self) -> i32 {
        match self {
            Self::ParseError => codes::PARSE_ERROR,
            Self::InvalidRequest | Self::CapabilityDenied => codes::INVALID_REQUEST,
            Self::MethodNotFound => codes::METHOD_NOT_FOUND,
            Self::InvalidParams => codes::INVALID_PARAMS,
            Self::Internal => codes::INTERNAL_ERROR,
            Self::ConnectionClosed => codes::CONNECTION_CLOSED,
            Self::RequestTimeout => codes::REQUEST_TIMEOUT,
            Self::UrlElicitationRequired => codes::APP_ERROR_RANGE_START,
            Self::Cancelled => codes::INTERNAL_ERROR,
        }
    }
}

/// The single error type crossing crate boundaries in this workspace.
#[derive(Debug, Clone, thiserror::Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct McpError {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl McpError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ParseError, message)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidRequest, message)
    }

    pub fn method_not_found(method: impl std::fmt::Display) -> Self {
        Self::new(ErrorKind::MethodNotFound, format!("method not found: {method}"))
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidParams, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    pub fn connection_closed() -> Self {
        Self::new(ErrorKind::ConnectionClosed, "connection closed")
    }

    pub fn request_timeout() -> Self {
        Self::new(ErrorKind::RequestTimeout, "request timed out")
    }

    pub fn capability_denied(method: impl std::fmt::Display) -> Self {
        Self::new(
            ErrorKind::CapabilityDenied,
            format!("capability does not permit: {method}"),
        )
    }

    pub fn cancelled(reason: Option<&str>) -> Self {
        Self::new(
            ErrorKind::Cancelled,
            reason.unwrap_or("cancelled").to_owned(),
        )
    }

    /// Convert to the wire-level JSON-RPC error object for the given
    /// request id. `Cancelled` is never expected to reach here (§7: a
    /// cancelled inbound request produces no response at all).
    pub fn to_jsonrpc_error(&self, id: Option<crate::jsonrpc::RequestId>) -> crate::jsonrpc::JsonRpcError {
        crate::jsonrpc::JsonRpcError::new(id, self.kind.code(), self.message.clone(), self.data.clone())
    }
}
