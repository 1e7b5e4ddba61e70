//! The `Transport` trait (C2, spec §4.2).

use async_trait::async_trait;
use mcp_core::jsonrpc::RequestId;
use mcp_core::AuthInfo;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::TransportResult;

/// One event delivered on the channel returned by [`Transport::start`].
///
/// Stands in for the spec's three callbacks: `Message` is `onmessage`,
/// `Closed` is `onclose`, `Error` is `onerror`. `Message` carries whatever
/// `AuthInfo` capsule the boundary attached to the request it came from
/// (spec §3); transports with no concept of per-request auth (stdio) pass
/// `None`.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    Message(Value, Option<AuthInfo>),
    Error(String),
    Closed,
}

/// Hints accompanying an outbound `send`.
#[derive(Debug, Clone, Default)]
pub struct SendOptions {
    /// Which inbound request this outbound message relates to, so a
    /// multiplexing transport (C4) can route it to the right stream.
    pub related_request_id: Option<RequestId>,
}

/// A bidirectional message channel. `start()` is idempotent after a
/// successful call; calling it twice returns the same receiver handle
/// semantics (implementations document their own re-entrancy story).
#[async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug {
    /// Begin reading inbound messages, returning a receiver of
    /// [`TransportEvent`]. MUST be called before `send`.
    async fn start(&self) -> TransportResult<mpsc::Receiver<TransportEvent>>;

    /// Serialize and write `message`. `related_request_id` is advisory
    /// routing information a single-stream transport may ignore.
    async fn send(&self, message: Value, opts: SendOptions) -> TransportResult<()>;

    /// Release resources. Implementations must ensure a subsequent
    /// `TransportEvent::Closed` is observable by any outstanding receiver.
    async fn close(&self) -> TransportResult<()>;

    /// The session id this transport negotiated, if stateful.
    fn session_id(&self) -> Option<String> {
        None
    }

    /// The protocol version negotiated with the peer, if known.
    fn protocol_version(&self) -> Option<String> {
        None
    }
}
