//! A minimal stdio MCP server: negotiates a protocol version, answers
//! `ping`, echoes `echo` requests, and exposes the task subsystem so a
//! client can drive a long-running tool through `tasks/*`.
//!
//! Run with: `cargo run -p mcp --example stdio_echo_server`

use std::sync::Arc;

use async_trait::async_trait;
use mcp::prelude::*;
use mcp_tasks::{InMemoryMessageQueue, InMemoryTaskStore};
use mcp_transport::StdioTransport;
use serde_json::{json, Value};
use tracing_subscriber::EnvFilter;

struct Echo;

#[async_trait]
impl Handler for Echo {
    async fn handle(&self, params: Option<Value>, _ctx: RequestContext) -> McpResult<Value> {
        Ok(json!({ "echoed": params }))
    }
}

#[tokio::main]
async fn main() -> McpResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let transport = Arc::new(StdioTransport::new());
    let engine = ProtocolEngine::new(transport, ProtocolEngineConfig::default());

    engine.set_capabilities(mcp_core::ServerCapabilities {
        tasks: Some(mcp_core::capabilities::EmptyCapability {}),
        ..Default::default()
    });

    engine.register_handler("echo", Arc::new(Echo));

    let task_service = TaskService::new(
        Arc::new(InMemoryTaskStore::new()),
        Arc::new(InMemoryMessageQueue::new()),
    );
    install_task_handlers(&engine, task_service);

    let handle = engine.start().await?;
    tracing::info!("stdio MCP server ready");

    // Park forever; the receive loop spawned by `start()` drives everything.
    let _ = handle.send_notification("notifications/initialized", None).await;
    std::future::pending::<()>().await;
    Ok(())
}
