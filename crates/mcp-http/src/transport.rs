//! Per-session [`mcp_transport::Transport`] implementation that multiplexes
//! many SSE streams (one per POST carrying requests, plus at most one
//! standalone GET) behind a single logical connection (spec §4.4).
//!
//! Maintains the two routing tables named in spec §5: `streamId -> writer`
//! and `requestId -> streamId`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use mcp_core::jsonrpc::{JsonRpcMessage, RequestId};
use mcp_core::AuthInfo;
use mcp_transport::{SendOptions, Transport, TransportError, TransportEvent, TransportResult};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::event_store::StreamId;
use crate::session::SessionId;

/// The transport backing one MCP session's logical connection. Handed to
/// a [`mcp_protocol::ProtocolEngine`] exactly once per session.
pub struct HttpSessionTransport {
    session_id: Option<SessionId>,
    protocol_version: Mutex<Option<String>>,
    inbound_tx: Mutex<Option<mpsc::Sender<TransportEvent>>>,
    streams: DashMap<StreamId, mpsc::Sender<Value>>,
    request_stream: DashMap<RequestId, StreamId>,
    stream_pending: DashMap<StreamId, AtomicUsize>,
    standalone_stream: Mutex<Option<StreamId>>,
}

impl std::fmt::Debug for HttpSessionTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpSessionTransport")
            .field("session_id", &self.session_id)
            .finish_non_exhaustive()
    }
}

impl HttpSessionTransport {
    pub fn new(session_id: Option<SessionId>) -> Arc<Self> {
        Arc::new(Self {
            session_id,
            protocol_version: Mutex::new(None),
            inbound_tx: Mutex::new(None),
            streams: DashMap::new(),
            request_stream: DashMap::new(),
            stream_pending: DashMap::new(),
            standalone_stream: Mutex::new(None),
        })
    }

    pub fn set_protocol_version(&self, version: String) {
        *self.protocol_version.lock() = Some(version);
    }

    /// Feed one inbound JSON-RPC message, as parsed from a POST body, into
    /// the engine's receive loop, attaching the `AuthInfo` the HTTP
    /// boundary resolved for this request (spec §3), if any.
    pub async fn feed_inbound(&self, value: Value, auth: Option<AuthInfo>) -> TransportResult<()> {
        let tx = self.inbound_tx.lock().clone();
        let tx = tx.ok_or(TransportError::Closed)?;
        tx.send(TransportEvent::Message(value, auth))
            .await
            .map_err(|_| TransportError::Closed)
    }

    /// Open a dedicated SSE stream for the request ids found in one POST
    /// body, returning the receiver the HTTP handler streams to the
    /// client.
    pub fn open_request_stream(
        &self,
        stream_id: StreamId,
        request_ids: &[RequestId],
    ) -> mpsc::Receiver<Value> {
        let (tx, rx) = mpsc::channel(256);
        self.streams.insert(stream_id.clone(), tx);
        self.stream_pending
            .insert(stream_id.clone(), AtomicUsize::new(request_ids.len()));
        for id in request_ids {
            self.request_stream.insert(id.clone(), stream_id.clone());
        }
        rx
    }

    /// Open the single standalone GET stream for this session. Returns
    /// `None` if one is already open (caller should answer `409`).
    pub fn open_standalone_stream(&self, stream_id: StreamId) -> Option<mpsc::Receiver<Value>> {
        let mut slot = self.standalone_stream.lock();
        if slot.is_some() {
            return None;
        }
        let (tx, rx) = mpsc::channel(256);
        self.streams.insert(stream_id.clone(), tx);
        *slot = Some(stream_id);
        Some(rx)
    }

    /// Release a stream's bookkeeping. Called when the client disconnects
    /// (GET) or the HTTP handler task exits.
    pub fn close_stream(&self, stream_id: &str) {
        self.streams.remove(stream_id);
        self.stream_pending.remove(stream_id);
        self.request_stream.retain(|_, v| v != stream_id);
        let mut slot = self.standalone_stream.lock();
        if slot.as_deref() == Some(stream_id) {
            *slot = None;
        }
    }

    fn destination_for(&self, related_request_id: Option<&RequestId>) -> Option<StreamId> {
        if let Some(id) = related_request_id {
            if let Some(s) = self.request_stream.get(id) {
                return Some(s.clone());
            }
        }
        self.standalone_stream.lock().clone()
    }

    fn note_terminal_if_response(&self, value: &Value, related_request_id: Option<&RequestId>) {
        let Some(id) = related_request_id else { return };
        let is_terminal = matches!(
            JsonRpcMessage::classify(value.clone()),
            Ok(JsonRpcMessage::Response(_)) | Ok(JsonRpcMessage::Error(_))
        );
        if !is_terminal {
            return;
        }
        let Some((_, stream_id)) = self.request_stream.remove(id) else {
            return;
        };
        if let Some(counter) = self.stream_pending.get(&stream_id) {
            if counter.fetch_sub(1, Ordering::AcqRel) == 1 {
                drop(counter);
                // Last outstanding response for this stream: close it so
                // the HTTP handler's forwarding loop ends once this final
                // message has been forwarded (spec §4.4).
                self.streams.remove(&stream_id);
                self.stream_pending.remove(&stream_id);
            }
        }
    }
}

#[async_trait]
impl Transport for HttpSessionTransport {
    async fn start(&self) -> TransportResult<mpsc::Receiver<TransportEvent>> {
        let mut slot = self.inbound_tx.lock();
        if slot.is_some() {
            return Err(TransportError::AlreadyStarted);
        }
        let (tx, rx) = mpsc::channel(256);
        *slot = Some(tx);
        Ok(rx)
    }

    async fn send(&self, message: Value, opts: SendOptions) -> TransportResult<()> {
        let Some(stream_id) = self.destination_for(opts.related_request_id.as_ref()) else {
            warn!("no open stream to deliver message; dropping");
            return Err(TransportError::WriteFailed("no open destination stream".into()));
        };

        let Some(sender) = self.streams.get(&stream_id).map(|e| e.clone()) else {
            return Err(TransportError::WriteFailed("destination stream closed".into()));
        };

        self.note_terminal_if_response(&message, opts.related_request_id.as_ref());

        sender
            .send(message)
            .await
            .map_err(|_| TransportError::WriteFailed("stream receiver dropped".into()))
    }

    async fn close(&self) -> TransportResult<()> {
        debug!(session_id = ?self.session_id, "closing http session transport");
        self.streams.clear();
        self.request_stream.clear();
        self.stream_pending.clear();
        *self.standalone_stream.lock() = None;
        if let Some(tx) = self.inbound_tx.lock().take() {
            drop(tx);
        }
        Ok(())
    }

    fn session_id(&self) -> Option<String> {
        self.session_id.as_ref().map(|s| s.0.clone())
    }

    fn protocol_version(&self) -> Option<String> {
        self.protocol_version.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn stream_closes_after_last_bound_response() {
        let t = HttpSessionTransport::new(None);
        let id1 = RequestId::Number(1);
        let id2 = RequestId::Number(2);
        let mut rx = t.open_request_stream("s1".into(), &[id1.clone(), id2.clone()]);

        t.send(
            json!({"jsonrpc":"2.0","id":1,"result":{}}),
            SendOptions {
                related_request_id: Some(id1),
            },
        )
        .await
        .unwrap();
        assert!(t.streams.contains_key("s1"));

        t.send(
            json!({"jsonrpc":"2.0","id":2,"result":{}}),
            SendOptions {
                related_request_id: Some(id2),
            },
        )
        .await
        .unwrap();
        assert!(!t.streams.contains_key("s1"));

        assert!(rx.recv().await.is_some());
        assert!(rx.recv().await.is_some());
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn second_standalone_stream_rejected() {
        let t = HttpSessionTransport::new(None);
        assert!(t.open_standalone_stream("g1".into()).is_some());
        assert!(t.open_standalone_stream("g2".into()).is_none());
    }

    #[tokio::test]
    async fn notification_with_no_stream_routes_to_standalone() {
        let t = HttpSessionTransport::new(None);
        let mut rx = t.open_standalone_stream("g1".into()).unwrap();
        t.send(json!({"jsonrpc":"2.0","method":"notifications/message"}), SendOptions::default())
            .await
            .unwrap();
        assert!(rx.recv().await.is_some());
    }
}
