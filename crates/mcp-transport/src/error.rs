//! Transport-local error type, convertible into `mcp_core::McpError`.

use mcp_core::error::{ErrorKind, McpError};

#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("transport closed")]
    Closed,
    #[error("write failed: {0}")]
    WriteFailed(String),
    #[error("framing error: {0}")]
    Framing(String),
    #[error("already started")]
    AlreadyStarted,
}

impl From<TransportError> for McpError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::Closed => McpError::connection_closed(),
            TransportError::WriteFailed(m) | TransportError::Framing(m) => {
                McpError::new(ErrorKind::Internal, m)
            }
            TransportError::AlreadyStarted => {
                McpError::new(ErrorKind::Internal, "transport already started")
            }
        }
    }
}

pub type TransportResult<T> = Result<T, TransportError>;
