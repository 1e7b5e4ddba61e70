//! The axum `Router` implementing the streamable-HTTP transport's single
//! endpoint: POST (send messages), GET (standalone SSE + resumption), DELETE
//! (session termination) (spec §4.4, §6).

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use futures::stream::{self, StreamExt};
use mcp_core::jsonrpc::JsonRpcMessage;
use mcp_core::AuthInfo;
use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

use crate::config::SessionIdMode;
use crate::event_store::{EventId, SharedEventStore};
use crate::manager::SessionManager;
use crate::session::SessionId;

const SESSION_HEADER: &str = "mcp-session-id";
const LAST_EVENT_ID_HEADER: &str = "last-event-id";
const AUTHORIZATION_HEADER: &str = "authorization";

/// Resolve the `AuthInfo` capsule for a request from its `Authorization`
/// header (spec §3). OAuth 2.1 token validation is out of scope here — the
/// bearer token's value is carried as the opaque `subject`, unvalidated,
/// for handlers/middleware further in the stack to interpret.
fn extract_auth(headers: &HeaderMap) -> Option<AuthInfo> {
    let value = header_str(headers, AUTHORIZATION_HEADER)?;
    let token = value.strip_prefix("Bearer ").unwrap_or(value);
    Some(AuthInfo::new(token.to_owned(), Vec::new()))
}

#[derive(Clone)]
pub struct HttpAppState {
    pub manager: Arc<SessionManager>,
    pub event_store: Option<SharedEventStore>,
}

impl std::fmt::Debug for HttpAppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpAppState")
            .field("manager", &self.manager)
            .field("has_event_store", &self.event_store.is_some())
            .finish()
    }
}

pub fn router(state: HttpAppState) -> Router {
    Router::new()
        .route("/mcp", post(handle_post).get(handle_get).delete(handle_delete))
        .with_state(state)
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Forward one SSE stream's messages to the client, assigning resumable
/// event ids from `event_store` (if configured) as each frame is written.
/// `replayed` is prepended verbatim (already-assigned ids from a resumed
/// `Last-Event-ID` reconnect) before any live message is written. A fresh
/// stream (no replay) opens with a priming event carrying `retry_ms`
/// (spec §4.4); a resumption does not repeat it.
fn sse_body(
    rx: tokio::sync::mpsc::Receiver<Value>,
    event_store: Option<SharedEventStore>,
    stream_id: String,
    replayed: Vec<(EventId, Value)>,
    retry_ms: u64,
) -> Body {
    let priming = if replayed.is_empty() {
        Some(crate::sse::SseEvent::priming(retry_ms).encode())
    } else {
        None
    };
    let priming_stream = stream::iter(priming.map(Ok::<_, std::convert::Infallible>));

    let replay_stream = stream::iter(replayed.into_iter().map(|(id, msg)| {
        Ok::<_, std::convert::Infallible>(crate::sse::SseEvent::message(msg).with_id(id).encode())
    }));

    let live_stream = stream::unfold((rx, event_store, stream_id), |(mut rx, store, sid)| async move {
        let msg = rx.recv().await?;
        let event_id = if let Some(store) = &store {
            Some(store.append(&sid, msg.clone()).await)
        } else {
            None
        };
        let mut frame = crate::sse::SseEvent::message(msg);
        if let Some(id) = event_id {
            frame = frame.with_id(id);
        }
        Some((Ok::<_, std::convert::Infallible>(frame.encode()), (rx, store, sid)))
    });

    Body::from_stream(priming_stream.chain(replay_stream).chain(live_stream))
}

async fn resolve_session(
    state: &HttpAppState,
    headers: &HeaderMap,
) -> Result<Option<Arc<crate::manager::SessionHandle>>, Response> {
    if state.manager.config().session_id_mode == SessionIdMode::None {
        return Ok(None);
    }
    let Some(raw) = header_str(headers, SESSION_HEADER) else {
        return Err((StatusCode::BAD_REQUEST, "missing Mcp-Session-Id header").into_response());
    };
    let id = SessionId(raw.to_owned());
    match state.manager.get(&id).await {
        Ok(Some(s)) => Ok(Some(s)),
        Ok(None) => Err((StatusCode::NOT_FOUND, "unknown session").into_response()),
        Err(e) => Err((StatusCode::INTERNAL_SERVER_ERROR, e.message).into_response()),
    }
}

fn check_rebinding(state: &HttpAppState, headers: &HeaderMap) -> Result<(), Response> {
    let host = header_str(headers, "host");
    let origin = header_str(headers, "origin");
    state
        .manager
        .check_rebinding(host, origin)
        .map_err(|e| (StatusCode::FORBIDDEN, e.message).into_response())
}

/// POST: send one or more JSON-RPC messages. A body containing only
/// notifications/responses gets a bare `202 Accepted`; a body carrying at
/// least one request gets either a single JSON response
/// (`enableJsonResponse`) or a dedicated SSE stream of the responses (spec
/// §4.4).
async fn handle_post(
    State(state): State<HttpAppState>,
    headers: HeaderMap,
    body: Json<Value>,
) -> Response {
    if state.manager.is_shutting_down() {
        return (StatusCode::SERVICE_UNAVAILABLE, "server is shutting down").into_response();
    }
    if let Err(resp) = check_rebinding(&state, &headers) {
        return resp;
    }

    let messages: Vec<Value> = match &body.0 {
        Value::Array(items) => items.clone(),
        other => vec![other.clone()],
    };

    let is_initialize = messages.iter().any(|m| {
        m.get("method").and_then(Value::as_str) == Some(mcp_core::constants::methods::INITIALIZE)
    });

    // Stateless mode (spec §4.4: "servers MAY operate without sessions")
    // has no session table to consult at all; every POST gets a fresh,
    // unshared transport/engine pair for just this request/response.
    let session = if state.manager.config().session_id_mode == SessionIdMode::None {
        match state.manager.create_stateless().await {
            Ok(s) => s,
            Err(e) => return (StatusCode::INTERNAL_SERVER_ERROR, e.message).into_response(),
        }
    } else if is_initialize {
        match state.manager.create_session().await {
            Ok(s) => match s {
                Some(s) => s,
                None => return (StatusCode::INTERNAL_SERVER_ERROR, "session creation returned no session".to_string()).into_response(),
            },
            Err(e) => return (StatusCode::INTERNAL_SERVER_ERROR, e.message).into_response(),
        }
    } else {
        match resolve_session(&state, &headers).await {
            Ok(Some(s)) => s,
            Ok(None) => return (StatusCode::INTERNAL_SERVER_ERROR, "session creation returned no session".to_string()).into_response(),
            Err(resp) => return resp,
        }
    };

    let auth = extract_auth(&headers);

    let mut request_ids = Vec::new();
    for m in &messages {
        if let Ok(JsonRpcMessage::Request(req)) = JsonRpcMessage::classify(m.clone()) {
            request_ids.push(req.id);
        }
    }

    if request_ids.is_empty() {
        for m in messages {
            if let Err(e) = session.transport.feed_inbound(m, auth.clone()).await {
                warn!(error = %e, "failed to feed inbound message");
            }
        }
        return StatusCode::ACCEPTED.into_response();
    }

    let stream_id = Uuid::new_v4().to_string();
    let mut rx = session
        .transport
        .open_request_stream(stream_id.clone(), &request_ids);

    for m in messages {
        if let Err(e) = session.transport.feed_inbound(m, auth.clone()).await {
            warn!(error = %e, "failed to feed inbound message");
        }
    }

    let mut headers_out = HeaderMap::new();
    if let Some(sid) = session.transport.session_id() {
        if let Ok(v) = sid.parse() {
            headers_out.insert(SESSION_HEADER, v);
        }
    }

    if state.manager.config().enable_json_response {
        // Single-response shortcut: collect every message this POST's
        // stream produces and return them as one JSON body.
        let mut results = Vec::new();
        while let Some(msg) = rx.recv().await {
            results.push(msg);
        }
        session.transport.close_stream(&stream_id);
        let body = if results.len() == 1 {
            results.into_iter().next().unwrap()
        } else {
            Value::Array(results)
        };
        return (headers_out, Json(body)).into_response();
    }

    let retry_ms = state.manager.config().sse_retry.as_millis() as u64;
    headers_out.insert("content-type", "text/event-stream".parse().unwrap());
    (headers_out, sse_body(rx, state.event_store.clone(), stream_id, Vec::new(), retry_ms)).into_response()
}

/// GET: open the standalone SSE stream for server-initiated messages, with
/// optional `Last-Event-ID` resumption (spec §4.4, §4.6).
async fn handle_get(State(state): State<HttpAppState>, headers: HeaderMap) -> Response {
    if state.manager.is_shutting_down() {
        return (StatusCode::SERVICE_UNAVAILABLE, "server is shutting down").into_response();
    }
    if let Err(resp) = check_rebinding(&state, &headers) {
        return resp;
    }
    let session = match resolve_session(&state, &headers).await {
        Ok(Some(s)) => s,
        Ok(None) => return (StatusCode::BAD_REQUEST, "stateless mode has no standalone stream").into_response(),
        Err(resp) => return resp,
    };

    let stream_id = Uuid::new_v4().to_string();

    let mut replayed: Vec<(EventId, Value)> = Vec::new();
    if let Some(last_event_id) = header_str(&headers, LAST_EVENT_ID_HEADER).and_then(|v| v.parse::<u64>().ok()) {
        if let Some(store) = &state.event_store {
            // Unknown last_event_id replays nothing and is not an error
            // (spec §8); the client simply gets a fresh stream below.
            let buf = std::sync::Mutex::new(Vec::new());
            store
                .replay_after(last_event_id, &|id, msg| buf.lock().unwrap().push((id, msg)))
                .await;
            replayed = buf.into_inner().unwrap();
        }
    }

    let Some(rx) = session.transport.open_standalone_stream(stream_id.clone()) else {
        return (StatusCode::CONFLICT, "standalone stream already open").into_response();
    };

    let retry_ms = state.manager.config().sse_retry.as_millis() as u64;
    let mut headers_out = HeaderMap::new();
    headers_out.insert("content-type", "text/event-stream".parse().unwrap());
    (headers_out, sse_body(rx, state.event_store.clone(), stream_id, replayed, retry_ms)).into_response()
}

/// DELETE: terminate a session. `200` on success, `404` if the session id
/// is unknown (spec §6).
async fn handle_delete(State(state): State<HttpAppState>, headers: HeaderMap) -> Response {
    let Some(raw) = header_str(&headers, SESSION_HEADER) else {
        return (StatusCode::BAD_REQUEST, "missing Mcp-Session-Id header").into_response();
    };
    let id = SessionId(raw.to_owned());
    match state.manager.terminate(&id).await {
        Ok(true) => StatusCode::OK.into_response(),
        Ok(false) => (StatusCode::NOT_FOUND, "unknown session").into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.message).into_response(),
    }
}

/// Background sweep loop for session TTL expiry; spawn once at startup.
pub async fn run_sweeper(manager: Arc<SessionManager>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        manager.sweep().await;
    }
}

/// Await a shutdown signal and drain the session table once it fires;
/// spawn once at startup alongside [`run_sweeper`]. After this resolves,
/// `handle_post`/`handle_get` reject further requests with `503`.
pub async fn run_shutdown_listener(
    manager: Arc<SessionManager>,
    mut shutdown_rx: tokio::sync::broadcast::Receiver<()>,
) {
    let _ = shutdown_rx.recv().await;
    manager.shutdown().await;
}
