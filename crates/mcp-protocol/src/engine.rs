//! The protocol engine (C3): turns a transport's message stream into typed
//! handler invocations and outbound requests, correlating responses,
//! enforcing timeouts, relaying progress, and propagating cancellation.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use mcp_core::capabilities::{assert_client_capability, assert_server_capability, ClientCapabilities, ServerCapabilities};
use mcp_core::jsonrpc::{JsonRpcMessage, JsonRpcNotification, JsonRpcRequest};
use mcp_core::{AuthInfo, ErrorKind, LogLevel, McpError, McpResult, RequestId};
use mcp_core::constants::methods;
use mcp_transport::{SendOptions, Transport, TransportEvent};
use serde_json::Value;
use tokio::sync::{oneshot, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::config::ProtocolEngineConfig;
use crate::handler::{Handler, RequestContext, SharedHandler};
use crate::inbound::InboundTable;
use crate::pending::{PendingOutbound, PendingTable, ProgressCallback};

/// Per-call overrides for a single outbound request (spec §4.3).
#[derive(Clone, Default)]
pub struct OutboundRequestOptions {
    pub timeout: Option<Duration>,
    pub reset_timeout_on_progress: Option<bool>,
    pub on_progress: Option<ProgressCallback>,
}

impl std::fmt::Debug for OutboundRequestOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutboundRequestOptions")
            .field("timeout", &self.timeout)
            .field("reset_timeout_on_progress", &self.reset_timeout_on_progress)
            .field("on_progress", &self.on_progress.is_some())
            .finish()
    }
}

struct Inner {
    transport: Arc<dyn Transport>,
    config: ProtocolEngineConfig,
    next_id: AtomicI64,
    pending: PendingTable,
    inbound: InboundTable,
    handlers: DashMap<String, SharedHandler>,
    notification_handlers: DashMap<String, SharedHandler>,
    capabilities: parking_lot::RwLock<ServerCapabilities>,
    client_capabilities: parking_lot::RwLock<ClientCapabilities>,
    log_level: parking_lot::RwLock<LogLevel>,
}

/// Built-in handler for `ping`: a no-op liveness check (spec §6), answered
/// the same whether or not the caller has declared any capabilities.
struct PingHandler;

#[async_trait::async_trait]
impl Handler for PingHandler {
    async fn handle(&self, _params: Option<Value>, _ctx: RequestContext) -> McpResult<Value> {
        Ok(Value::Object(Default::default()))
    }
}

/// Built-in handler for `logging/setLevel`: updates the engine's minimum
/// emitted level (spec §6). Gated by `ServerCapabilities::logging` like any
/// other `logging/*` method.
struct SetLevelHandler {
    handle: EngineHandle,
}

#[async_trait::async_trait]
impl Handler for SetLevelHandler {
    async fn handle(&self, params: Option<Value>, _ctx: RequestContext) -> McpResult<Value> {
        let level: LogLevel = params
            .as_ref()
            .and_then(|p| p.get("level"))
            .cloned()
            .ok_or_else(|| McpError::invalid_params("missing \"level\""))
            .and_then(|v| serde_json::from_value(v).map_err(|e| McpError::invalid_params(e.to_string())))?;
        self.handle.set_log_level(level);
        Ok(Value::Object(Default::default()))
    }
}

/// A cheap, cloneable handle to a running engine. This is what
/// [`RequestContext`] and application code hold on to; the engine itself is
/// only constructed once per connection.
#[derive(Clone)]
pub struct EngineHandle {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for EngineHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineHandle").finish_non_exhaustive()
    }
}

/// The protocol engine itself. Owns the pending-request table (spec §3:
/// "the Protocol engine owns the pending-request table").
pub struct ProtocolEngine {
    handle: EngineHandle,
}

impl std::fmt::Debug for ProtocolEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtocolEngine").field("handle", &self.handle).finish()
    }
}

impl ProtocolEngine {
    pub fn new(transport: Arc<dyn Transport>, config: ProtocolEngineConfig) -> Self {
        let inner = Arc::new(Inner {
            transport,
            config,
            next_id: AtomicI64::new(1),
            pending: PendingTable::default(),
            inbound: InboundTable::default(),
            handlers: DashMap::new(),
            notification_handlers: DashMap::new(),
            capabilities: parking_lot::RwLock::new(ServerCapabilities::default()),
            client_capabilities: parking_lot::RwLock::new(ClientCapabilities::default()),
            log_level: parking_lot::RwLock::new(LogLevel::default()),
        });
        let engine = Self {
            handle: EngineHandle { inner },
        };
        engine.register_handler(methods::PING, Arc::new(PingHandler));
        engine.register_handler(
            methods::LOGGING_SET_LEVEL,
            Arc::new(SetLevelHandler { handle: engine.handle.clone() }),
        );
        engine
    }

    pub fn handle(&self) -> EngineHandle {
        self.handle.clone()
    }

    pub fn set_capabilities(&self, caps: ServerCapabilities) {
        *self.handle.inner.capabilities.write() = caps;
    }

    /// Record what the peer declared in `initialize`'s `capabilities`
    /// field, so `send_request_for` can gate server-initiated
    /// `sampling/*`/`elicitation/*`/`roots/*` calls against it.
    pub fn set_client_capabilities(&self, caps: ClientCapabilities) {
        *self.handle.inner.client_capabilities.write() = caps;
    }

    /// Register a handler for inbound requests of `method`.
    pub fn register_handler(&self, method: impl Into<String>, handler: SharedHandler) {
        self.handle.inner.handlers.insert(method.into(), handler);
    }

    /// Register a handler for inbound notifications of `method`.
    pub fn register_notification_handler(&self, method: impl Into<String>, handler: SharedHandler) {
        self.handle
            .inner
            .notification_handlers
            .insert(method.into(), handler);
    }

    /// Start the transport and spawn the receive loop. Returns the handle
    /// used for all outbound operations.
    pub async fn start(&self) -> McpResult<EngineHandle> {
        let mut events = self
            .handle
            .inner
            .transport
            .start()
            .await
            .map_err(mcp_core::McpError::from)?;
        let handle = self.handle.clone();

        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                match event {
                    TransportEvent::Message(value, auth) => {
                        handle.clone().on_message(value, auth).await;
                    }
                    TransportEvent::Error(err) => {
                        warn!(error = %err, "transport error");
                    }
                    TransportEvent::Closed => {
                        debug!("transport closed; releasing pending requests");
                        handle.inner.pending.close_all();
                        break;
                    }
                }
            }
        });

        Ok(self.handle.clone())
    }
}

impl EngineHandle {
    #[instrument(skip(self, value, auth))]
    async fn on_message(self, value: Value, auth: Option<AuthInfo>) {
        let message = match JsonRpcMessage::classify(value) {
            Ok(m) => m,
            Err(e) => {
                warn!(error = %e, "dropping unclassifiable message");
                return;
            }
        };

        match message {
            JsonRpcMessage::Request(req) => self.handle_inbound_request(req, auth).await,
            JsonRpcMessage::Notification(notif) => self.handle_inbound_notification(notif, auth).await,
            JsonRpcMessage::Response(resp) => {
                self.inner.pending.resolve(&resp.id, Ok(resp.result));
            }
            JsonRpcMessage::Error(err) => {
                if let Some(id) = err.id {
                    let mcp_err = McpError::new(
                        error_kind_for_code(err.error.code),
                        err.error.message,
                    )
                    .with_data(err.error.data.unwrap_or(Value::Null));
                    self.inner.pending.resolve(&id, Err(mcp_err));
                }
            }
        }
    }

    async fn handle_inbound_request(self, req: JsonRpcRequest, auth: Option<AuthInfo>) {
        let id = req.id.clone();

        if let Err(e) = assert_server_capability(&*self.inner.capabilities.read(), &req.method) {
            self.respond_error(id, e).await;
            return;
        }

        let handler = self.inner.handlers.get(&req.method).map(|h| h.clone());
        let Some(handler) = handler else {
            self.respond_error(id, McpError::method_not_found(&req.method)).await;
            return;
        };

        let token = CancellationToken::new();
        self.inner.inbound.register(id.clone(), token.clone());

        let progress_token = req.progress_token();
        let ctx = RequestContext::new(id.clone(), token.clone(), auth, progress_token, self.clone());
        let params = req.params.clone();

        let this = self.clone();
        tokio::spawn(async move {
            let result = handler.handle(params, ctx).await;
            this.inner.inbound.deregister(&id);

            // Cancellation is best-effort: if the request was cancelled we
            // drop whatever the handler eventually returned (spec §7).
            if token.is_cancelled() {
                return;
            }

            match result {
                Ok(value) => this.respond_success(id, value).await,
                Err(e) => this.respond_error(id, e).await,
            }
        });
    }

    async fn handle_inbound_notification(self, notif: JsonRpcNotification, auth: Option<AuthInfo>) {
        match notif.method.as_str() {
            methods::CANCELLED => {
                if let Some(req_id) = notif
                    .params
                    .as_ref()
                    .and_then(|p| p.get("requestId"))
                    .and_then(parse_request_id)
                {
                    let reason = notif
                        .params
                        .as_ref()
                        .and_then(|p| p.get("reason"))
                        .and_then(Value::as_str)
                        .map(str::to_owned);

                    // Could be either an outbound request we're waiting on,
                    // or an inbound request we're currently handling.
                    self.inner.inbound.cancel(&req_id);
                    if let Some(entry) = self.inner.pending.take(&req_id) {
                        if let Some(tx) = entry.response_tx {
                            let _ = tx.send(Err(McpError::cancelled(reason.as_deref())));
                        }
                    }
                }
            }
            methods::PROGRESS => {
                if let Some(params) = &notif.params {
                    if let Some(token) = params.get("progressToken").and_then(parse_request_id) {
                        let progress = params.get("progress").and_then(Value::as_f64).unwrap_or(0.0);
                        let total = params.get("total").and_then(Value::as_f64);
                        let message = params
                            .get("message")
                            .and_then(Value::as_str)
                            .map(str::to_owned);
                        self.inner.pending.on_progress(&token, progress, total, message);
                    }
                }
            }
            other => {
                if let Err(e) = assert_server_capability(&*self.inner.capabilities.read(), other) {
                    warn!(method = other, error = %e, "dropped notification for ungranted capability");
                    return;
                }

                if let Some(handler) = self.inner.notification_handlers.get(other) {
                    let ctx = RequestContext::new(
                        RequestId::Number(0),
                        CancellationToken::new(),
                        auth,
                        None,
                        self.clone(),
                    );
                    if let Err(e) = handler.handle(notif.params.clone(), ctx).await {
                        warn!(method = other, error = %e, "notification handler failed");
                    }
                }
            }
        }
    }

    async fn respond_success(&self, id: RequestId, result: Value) {
        let response = mcp_core::JsonRpcResponse::new(id.clone(), result);
        let _ = self
            .inner
            .transport
            .send(
                serde_json::to_value(response).expect("JsonRpcResponse always serializes"),
                SendOptions {
                    related_request_id: Some(id),
                },
            )
            .await;
    }

    async fn respond_error(&self, id: RequestId, error: McpError) {
        let response = error.to_jsonrpc_error(Some(id.clone()));
        let _ = self
            .inner
            .transport
            .send(
                serde_json::to_value(response).expect("JsonRpcError always serializes"),
                SendOptions {
                    related_request_id: Some(id),
                },
            )
            .await;
    }

    fn next_id(&self) -> RequestId {
        RequestId::Number(self.inner.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Send a notification, optionally tied to an inbound request id so a
    /// multiplexing transport can route it to the right stream.
    pub async fn send_notification_for(
        &self,
        related_request_id: Option<RequestId>,
        method: &str,
        params: Option<Value>,
    ) -> McpResult<()> {
        assert_server_capability(&*self.inner.capabilities.read(), method)?;

        let notif = JsonRpcNotification::new(method, params);
        self.inner
            .transport
            .send(
                serde_json::to_value(notif).expect("JsonRpcNotification always serializes"),
                SendOptions { related_request_id },
            )
            .await
            .map_err(McpError::from)
    }

    pub async fn send_notification(&self, method: &str, params: Option<Value>) -> McpResult<()> {
        self.send_notification_for(None, method, params).await
    }

    /// Current minimum level set via `logging/setLevel` (default `info`).
    pub fn log_level(&self) -> LogLevel {
        *self.inner.log_level.read()
    }

    pub fn set_log_level(&self, level: LogLevel) {
        *self.inner.log_level.write() = level;
    }

    /// Record the peer's declared capabilities. Called by the `initialize`
    /// handler once it has parsed the request's `capabilities` field.
    pub fn set_client_capabilities(&self, caps: ClientCapabilities) {
        *self.inner.client_capabilities.write() = caps;
    }

    /// Emit `notifications/message` if `level` meets or exceeds the
    /// currently configured minimum (spec §6); a no-op below it.
    pub async fn emit_log(&self, level: LogLevel, logger: Option<String>, data: Value) -> McpResult<()> {
        if level < self.log_level() {
            return Ok(());
        }
        let mut payload = serde_json::json!({ "level": level, "data": data });
        if let Some(logger) = logger {
            payload["logger"] = Value::String(logger);
        }
        self.send_notification(methods::LOG_MESSAGE, Some(payload)).await
    }

    /// Issue an outbound request (sampling, elicitation, roots, or any
    /// peer-exposed method), optionally related to an inbound request's
    /// stream. Implements spec §4.3's outbound-request state machine.
    #[instrument(skip(self, params, opts))]
    pub async fn send_request_for(
        &self,
        related_request_id: Option<RequestId>,
        method: &str,
        params: Option<Value>,
        opts: OutboundRequestOptions,
    ) -> McpResult<Value> {
        assert_client_capability(&*self.inner.client_capabilities.read(), method)?;

        let id = self.next_id();

        let mut params = params.unwrap_or_else(|| Value::Object(Default::default()));
        if opts.on_progress.is_some() {
            if !params.is_object() {
                params = Value::Object(Default::default());
            }
            let obj = params.as_object_mut().expect("just ensured object");
            let meta = obj
                .entry("_meta")
                .or_insert_with(|| Value::Object(Default::default()));
            if let Some(meta_obj) = meta.as_object_mut() {
                meta_obj.insert("progressToken".into(), serde_json::to_value(&id).unwrap());
            }
        }

        let request = JsonRpcRequest::new(method, Some(params), id.clone());

        let (tx, rx) = oneshot::channel();
        let progress_notify = Arc::new(Notify::new());
        self.inner.pending.insert(
            id.clone(),
            PendingOutbound {
                response_tx: Some(tx),
                progress_notify: progress_notify.clone(),
                progress_callback: opts.on_progress.clone(),
            },
        );

        if let Err(e) = self
            .inner
            .transport
            .send(
                serde_json::to_value(&request).expect("JsonRpcRequest always serializes"),
                SendOptions { related_request_id },
            )
            .await
        {
            self.inner.pending.take(&id);
            return Err(McpError::from(e));
        }

        let timeout = opts.timeout.unwrap_or(self.inner.config.default_timeout);
        let reset_on_progress = opts
            .reset_timeout_on_progress
            .unwrap_or(self.inner.config.reset_timeout_on_progress);

        self.await_response(id, rx, progress_notify, timeout, reset_on_progress).await
    }

    pub async fn send_request(
        &self,
        method: &str,
        params: Option<Value>,
        opts: OutboundRequestOptions,
    ) -> McpResult<Value> {
        self.send_request_for(None, method, params, opts).await
    }

    async fn await_response(
        &self,
        id: RequestId,
        mut rx: oneshot::Receiver<McpResult<Value>>,
        progress_notify: Arc<Notify>,
        timeout: Duration,
        reset_on_progress: bool,
    ) -> McpResult<Value> {
        loop {
            let sleep = tokio::time::sleep(timeout);
            tokio::select! {
                result = &mut rx => {
                    return result.unwrap_or_else(|_| Err(McpError::connection_closed()));
                }
                () = sleep => {
                    self.inner.pending.take(&id);
                    let _ = self
                        .send_notification(
                            mcp_core::constants::methods::CANCELLED,
                            Some(serde_json::json!({"requestId": id, "reason": "timeout"})),
                        )
                        .await;
                    return Err(McpError::request_timeout());
                }
                () = progress_notify.notified(), if reset_on_progress => {
                    // Restart the timer: loop back around and create a
                    // fresh `sleep` for the full duration (spec §4.3).
                    continue;
                }
            }
        }
    }

}

fn parse_request_id(value: &Value) -> Option<RequestId> {
    if let Some(s) = value.as_str() {
        Some(RequestId::String(s.to_owned()))
    } else {
        value.as_i64().map(RequestId::Number)
    }
}

fn error_kind_for_code(code: i32) -> ErrorKind {
    use mcp_core::error::codes;
    match code {
        codes::PARSE_ERROR => ErrorKind::ParseError,
        codes::INVALID_REQUEST => ErrorKind::InvalidRequest,
        codes::METHOD_NOT_FOUND => ErrorKind::MethodNotFound,
        codes::INVALID_PARAMS => ErrorKind::InvalidParams,
        codes::CONNECTION_CLOSED => ErrorKind::ConnectionClosed,
        codes::REQUEST_TIMEOUT => ErrorKind::RequestTimeout,
        _ => ErrorKind::Internal,
    }
}
