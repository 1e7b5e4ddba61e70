//! End-to-end coverage of the task subsystem's lifecycle invariants
//! (spec §3, §4.7, §8): the full `tasks/result` side-channel round trip,
//! cancellation rejecting an in-flight resolver, TTL cleanup regardless of
//! status, and the automatic-polling fallback.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mcp_core::constants::methods;
use mcp_core::{ErrorKind, McpError, McpResult};
use mcp_protocol::{Handler, OutboundRequestOptions, ProtocolEngine, ProtocolEngineConfig, RequestContext};
use mcp_tasks::{install_task_handlers, now_ms, InMemoryMessageQueue, InMemoryTaskStore, TaskService};
use mcp_transport::{SendOptions, Transport, TransportError, TransportEvent, TransportResult};
use serde_json::{json, Value};
use tokio::sync::mpsc;

/// A transport paired with another instance of itself via channels, as if
/// it were two ends of a socket (mirrors mcp-protocol's duplex test rig).
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

/// The client's side of a server-initiated elicitation: answers whatever
/// it is asked without inspecting the prompt.
struct AutoAnswer;

#[async_trait]
impl Handler for AutoAnswer {
    async fn handle(&self, params: Option<Value>, _ctx: RequestContext) -> McpResult<Value> {
        Ok(json!({"answeredFor": params, "reply": "yes"}))
    }
}

fn new_task_service() -> TaskService {
    TaskService::new(Arc::new(InMemoryTaskStore::new()), Arc::new(InMemoryMessageQueue::new()))
}

/// A full round trip: a server-side task handler blocks on a queued
/// elicitation, the client drives `tasks/result`, the elicitation is
/// forwarded over the client's own connection and auto-answered, and the
/// final `tasks/result` reply carries the completed value.
#[tokio::test]
async fn tasks_result_delivers_side_channel_and_completes() {
    let (client_t, server_t) = DuplexTransport::pair();

    let service = new_task_service();
    let server = ProtocolEngine::new(Arc::new(server_t), ProtocolEngineConfig::default());
    install_task_handlers(&server, service.clone());
    server.start().await.unwrap();

    let client = ProtocolEngine::new(Arc::new(client_t), ProtocolEngineConfig::default());
    client.register_handler("elicit", Arc::new(AutoAnswer));
    let client_handle = client.start().await.unwrap();

    let record = service
        .create_task(None, None, mcp_core::RequestId::Number(0), json!({"tool": "long-running"}), None)
        .await
        .unwrap();
    let task_id = record.task_id.clone();

    let worker_service = service.clone();
    let worker_task_id = task_id.clone();
    tokio::spawn(async move {
        worker_service.mark_input_required(&worker_task_id).await.unwrap();
        let reply = worker_service
            .enqueue_request(&worker_task_id, None, "elicit", Some(json!({"prompt": "continue?"})), None)
            .await
            .expect("elicitation answered");
        worker_service
            .complete(&worker_task_id, json!({"finalAnswer": reply}))
            .await
            .unwrap();
    });

    let result = client_handle
        .send_request(
            methods::TASKS_RESULT,
            Some(json!({"taskId": task_id})),
            OutboundRequestOptions {
                timeout: Some(Duration::from_secs(5)),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(result["finalAnswer"]["reply"], json!("yes"));
    assert_eq!(result["_meta"]["relatedTask"]["taskId"], json!(task_id));
}

#[tokio::test]
async fn cancel_rejects_a_resolver_blocked_on_reply() {
    let service = new_task_service();
    let record = service
        .create_task(None, None, mcp_core::RequestId::Number(0), json!({}), None)
        .await
        .unwrap();
    let task_id = record.task_id.clone();

    let waiter_service = service.clone();
    let waiter_task_id = task_id.clone();
    let waiter = tokio::spawn(async move {
        waiter_service
            .enqueue_request(&waiter_task_id, None, "elicit", None, None)
            .await
    });

    // Give the spawned task a chance to enqueue before cancelling.
    tokio::task::yield_now().await;
    tokio::time::sleep(Duration::from_millis(10)).await;

    service.cancel(&task_id).await.unwrap();

    let err = waiter.await.unwrap().unwrap_err();
    assert_eq!(err.kind, ErrorKind::Cancelled);
}

#[tokio::test]
async fn sweep_expired_removes_tasks_regardless_of_status() {
    let service = new_task_service();
    let record = service
        .create_task(Some(50), None, mcp_core::RequestId::Number(0), json!({}), None)
        .await
        .unwrap();
    service.complete(&record.task_id, json!({"ok": true})).await.unwrap();

    tokio::time::sleep(Duration::from_millis(60)).await;

    let removed = service.sweep_expired().await.unwrap();
    assert_eq!(removed, 1);
    assert!(service.get(&record.task_id).await.unwrap().is_none());
}

#[tokio::test]
async fn poll_until_terminal_hides_the_task_indirection() {
    let service = new_task_service();
    let record = service
        .create_task(None, Some(10), mcp_core::RequestId::Number(0), json!({}), None)
        .await
        .unwrap();
    let task_id = record.task_id.clone();

    let completer = service.clone();
    let completer_task_id = task_id.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        completer
            .complete(&completer_task_id, json!({"value": 42}))
            .await
            .unwrap();
    });

    let result = service
        .poll_until_terminal(&task_id, Duration::from_millis(10))
        .await
        .unwrap();

    assert_eq!(result["value"], json!(42));
    assert_eq!(result["_meta"]["relatedTask"]["taskId"], json!(task_id));
}

#[tokio::test]
async fn failed_task_surfaces_error_with_related_task_metadata() {
    let service = new_task_service();
    let record = service
        .create_task(None, None, mcp_core::RequestId::Number(0), json!({}), None)
        .await
        .unwrap();
    let task_id = record.task_id.clone();

    service
        .fail(&task_id, McpError::internal("tool blew up"))
        .await
        .unwrap();

    let fetched = service.get(&task_id).await.unwrap().unwrap();
    assert_eq!(fetched.status, mcp_tasks::TaskStatus::Failed);

    // `now_ms` is exercised indirectly by every record above; assert it at
    // least produces a sane, monotonic-ish timestamp.
    assert!(now_ms() > 0);
}
