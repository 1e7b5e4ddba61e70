//! Integration tests for the protocol engine against an in-memory duplex
//! transport (no real sockets needed to exercise dispatch/correlation).

use std::sync::Arc;

use async_trait::async_trait;
use mcp_core::McpResult;
use mcp_protocol::{Handler, OutboundRequestOptions, ProtocolEngine, ProtocolEngineConfig, RequestContext};
use mcp_transport::{SendOptions, Transport, TransportError, TransportEvent, TransportResult};
use serde_json::{json, Value};
use tokio::sync::mpsc;

/// A transport paired with another instance of itself via channels, as if
/// it were two ends of a socket.
#[derive(Debug)]
struct DuplexTransport {
    outbound_to_peer: mpsc::Sender<Value>,
    inbound_from_peer: tokio::sync::Mutex<Option<mpsc::Receiver<Value>>>,
}

impl DuplexTransport {
    fn pair() -> (Self, Self) {
        let (a_to_b, b_from_a) = mpsc::channel(32);
        let (b_to_a, a_from_b) = mpsc::channel(32);
        (
            Self {
                outbound_to_peer: a_to_b,
                inbound_from_peer: tokio::sync::Mutex::new(Some(a_from_b)),
            },
            Self {
                outbound_to_peer: b_to_a,
                inbound_from_peer: tokio::sync::Mutex::new(Some(b_from_a)),
            },
        )
    }
}

#[async_trait]
impl Transport for DuplexTransport {
    async fn start(&self) -> TransportResult<mpsc::Receiver<TransportEvent>> {
        let mut inbound = self.inbound_from_peer.lock().await;
        let mut raw = inbound.take().ok_or(TransportError::AlreadyStarted)?;
        let (tx, rx) = mpsc::channel(32);
        tokio::spawn(async move {
            while let Some(v) = raw.recv().await {
                if tx.send(TransportEvent::Message(v, None)).await.is_err() {
                    break;
                }
            }
            let _ = tx.send(TransportEvent::Closed).await;
        });
        Ok(rx)
    }

    async fn send(&self, message: Value, _opts: SendOptions) -> TransportResult<()> {
        self.outbound_to_peer
            .send(message)
            .await
            .map_err(|_| TransportError::Closed)
    }

    async fn close(&self) -> TransportResult<()> {
        Ok(())
    }
}

struct Echo;

#[async_trait]
impl Handler for Echo {
    async fn handle(&self, params: Option<Value>, _ctx: RequestContext) -> McpResult<Value> {
        Ok(json!({ "echoed": params }))
    }
}

#[tokio::test]
async fn request_response_round_trip() {
    let (client_t, server_t) = DuplexTransport::pair();

    let server = ProtocolEngine::new(Arc::new(server_t), ProtocolEngineConfig::default());
    server.register_handler("echo", Arc::new(Echo));
    server.start().await.unwrap();

    let client = ProtocolEngine::new(Arc::new(client_t), ProtocolEngineConfig::default());
    let client_handle = client.start().await.unwrap();

    let result = client_handle
        .send_request("echo", Some(json!({"x": 1})), OutboundRequestOptions::default())
        .await
        .unwrap();

    assert_eq!(result, json!({"echoed": {"x": 1}}));
}

#[tokio::test]
async fn unknown_method_returns_method_not_found() {
    let (client_t, server_t) = DuplexTransport::pair();
    let server = ProtocolEngine::new(Arc::new(server_t), ProtocolEngineConfig::default());
    server.start().await.unwrap();

    let client = ProtocolEngine::new(Arc::new(client_t), ProtocolEngineConfig::default());
    let client_handle = client.start().await.unwrap();

    let err = client_handle
        .send_request("nope", None, OutboundRequestOptions::default())
        .await
        .unwrap_err();

    assert_eq!(err.kind, mcp_core::ErrorKind::MethodNotFound);
}

#[tokio::test]
async fn request_times_out_when_no_response() {
    let (client_t, _server_t) = DuplexTransport::pair();
    // server_t is dropped without a matching engine — nothing ever answers.
    let client = ProtocolEngine::new(Arc::new(client_t), ProtocolEngineConfig::default());
    let client_handle = client.start().await.unwrap();

    let err = client_handle
        .send_request(
            "echo",
            None,
            OutboundRequestOptions {
                timeout: Some(std::time::Duration::from_millis(50)),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind, mcp_core::ErrorKind::RequestTimeout);
}

#[tokio::test]
async fn progress_resets_timeout() {
    let (client_t, server_t) = DuplexTransport::pair();

    struct SlowWithProgress;
    #[async_trait]
    impl Handler for SlowWithProgress {
        async fn handle(&self, _params: Option<Value>, ctx: RequestContext) -> McpResult<Value> {
            for pct in [10.0, 20.0, 30.0] {
                ctx.report_progress(pct, None, None).await;
                tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            }
            Ok(json!("done"))
        }
    }

    let server = ProtocolEngine::new(Arc::new(server_t), ProtocolEngineConfig::default());
    server.register_handler("slow", Arc::new(SlowWithProgress));
    server.start().await.unwrap();

    let client = ProtocolEngine::new(Arc::new(client_t), ProtocolEngineConfig::default());
    let client_handle = client.start().await.unwrap();

    let result = client_handle
        .send_request(
            "slow",
            Some(json!({"_meta": {"progressToken": 999}})),
            OutboundRequestOptions {
                timeout: Some(std::time::Duration::from_millis(150)),
                on_progress: Some(Arc::new(|_p, _t, _m| {})),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(result, json!("done"));
}
