//! Integration tests for the streamable-HTTP router covering the boundary
//! behaviors named in spec §8.

use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use mcp_http::{HttpAppState, InMemorySessionStore, SessionManager, StreamableHttpConfig};
use mcp_protocol::ProtocolEngine;
use serde_json::{json, Value};
use tower::ServiceExt;

fn build_app() -> axum::Router {
    let manager = Arc::new(SessionManager::new(
        StreamableHttpConfig::default(),
        Arc::new(InMemorySessionStore::new(Duration::from_secs(3600))),
        Arc::new(|engine: &ProtocolEngine| {
            engine.register_handler(
                "initialize",
                mcp_http::manager::handler_fn(|_params, _ctx| async move {
                    Ok(json!({"protocolVersion": "2025-06-18"}))
                }),
            );
            engine.register_handler(
                "echo",
                mcp_http::manager::handler_fn(|params, _ctx| async move {
                    Ok(params.unwrap_or(Value::Null))
                }),
            );
        }),
    ));
    let state = HttpAppState {
        manager,
        event_store: None,
    };
    mcp_http::router(state)
}

async fn body_string(body: Body) -> String {
    let bytes = to_bytes(body, usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn post_notifications_only_returns_202() {
    let app = build_app();
    let req = Request::post("/mcp")
        .header("content-type", "application/json")
        .body(Body::from(
            json!({"jsonrpc":"2.0","method":"notifications/initialized"}).to_string(),
        ))
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::ACCEPTED);
}

#[tokio::test]
async fn post_with_request_opens_sse_stream_and_creates_session() {
    let app = build_app();
    let req = Request::post("/mcp")
        .header("content-type", "application/json")
        .body(Body::from(
            json!({"jsonrpc":"2.0","id":1,"method":"initialize"}).to_string(),
        ))
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.headers().get("mcp-session-id").is_some());
    assert_eq!(
        resp.headers().get("content-type").unwrap(),
        "text/event-stream"
    );

    let text = body_string(resp.into_body()).await;
    assert!(text.contains("event: message"));
    assert!(text.contains("protocolVersion"));
}

#[tokio::test]
async fn post_with_enable_json_response_returns_single_body() {
    let manager = Arc::new(SessionManager::new(
        StreamableHttpConfig {
            enable_json_response: true,
            ..StreamableHttpConfig::default()
        },
        Arc::new(InMemorySessionStore::new(Duration::from_secs(3600))),
        Arc::new(|engine: &ProtocolEngine| {
            engine.register_handler(
                "initialize",
                mcp_http::manager::handler_fn(|_params, _ctx| async move {
                    Ok(json!({"protocolVersion": "2025-06-18"}))
                }),
            );
        }),
    ));
    let app = mcp_http::router(HttpAppState {
        manager,
        event_store: None,
    });

    let req = Request::post("/mcp")
        .header("content-type", "application/json")
        .body(Body::from(
            json!({"jsonrpc":"2.0","id":1,"method":"initialize"}).to_string(),
        ))
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let content_type = resp.headers().get("content-type").cloned();
    assert_ne!(content_type.unwrap(), "text/event-stream");

    let text = body_string(resp.into_body()).await;
    let parsed: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(parsed["result"]["protocolVersion"], "2025-06-18");
}

async fn create_session(app: &axum::Router) -> String {
    let req = Request::post("/mcp")
        .header("content-type", "application/json")
        .body(Body::from(
            json!({"jsonrpc":"2.0","id":1,"method":"initialize"}).to_string(),
        ))
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    let session_id = resp
        .headers()
        .get("mcp-session-id")
        .unwrap()
        .to_str()
        .unwrap()
        .to_owned();
    // Drain the body so the transport's internal stream bookkeeping settles.
    let _ = body_string(resp.into_body()).await;
    session_id
}

#[tokio::test]
async fn second_standalone_get_is_rejected_with_409() {
    let app = build_app();
    let session_id = create_session(&app).await;

    let req1 = Request::get("/mcp")
        .header("mcp-session-id", &session_id)
        .body(Body::empty())
        .unwrap();
    let resp1 = app.clone().oneshot(req1).await.unwrap();
    assert_eq!(resp1.status(), StatusCode::OK);

    let req2 = Request::get("/mcp")
        .header("mcp-session-id", &session_id)
        .body(Body::empty())
        .unwrap();
    let resp2 = app.clone().oneshot(req2).await.unwrap();
    assert_eq!(resp2.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn unknown_last_event_id_opens_fresh_stream_not_an_error() {
    let app = build_app();
    let session_id = create_session(&app).await;

    let req = Request::get("/mcp")
        .header("mcp-session-id", &session_id)
        .header("last-event-id", "999999")
        .body(Body::empty())
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn delete_unknown_session_returns_404() {
    let app = build_app();
    let req = Request::delete("/mcp")
        .header("mcp-session-id", "nonexistent")
        .body(Body::empty())
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn delete_known_session_terminates_it() {
    let app = build_app();
    let session_id = create_session(&app).await;

    let req = Request::delete("/mcp")
        .header("mcp-session-id", &session_id)
        .body(Body::empty())
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let req2 = Request::delete("/mcp")
        .header("mcp-session-id", &session_id)
        .body(Body::empty())
        .unwrap();
    let resp2 = app.oneshot(req2).await.unwrap();
    assert_eq!(resp2.status(), StatusCode::NOT_FOUND);
}
