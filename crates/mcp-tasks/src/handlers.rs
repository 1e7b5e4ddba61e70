//! Wires `tasks/create|get|result|cancel|list` onto a [`ProtocolEngine`]
//! (spec §4.7, §6).

use mcp_core::constants::methods;
use mcp_core::{McpError, McpResult};
use mcp_protocol::{ProtocolEngine, RequestContext};
use serde_json::Value;

use crate::service::TaskService;

fn param_str(params: &Option<Value>, key: &str) -> McpResult<String> {
    params
        .as_ref()
        .and_then(|p| p.get(key))
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| McpError::invalid_params(format!("missing `{key}`")))
}

/// Register the five `tasks/*` handlers on `engine`, backed by `service`.
pub fn install_task_handlers(engine: &ProtocolEngine, service: TaskService) {
    let s = service.clone();
    engine.register_handler(
        methods::TASKS_GET,
        std::sync::Arc::new(move |params: Option<Value>, _ctx: RequestContext| {
            let s = s.clone();
            async move {
                let task_id = param_str(&params, "taskId")?;
                let record = s
                    .get(&task_id)
                    .await?
                    .ok_or_else(|| McpError::invalid_params(format!("unknown task: {task_id}")))?;
                Ok(record.to_status_value())
            }
        }),
    );

    let s = service.clone();
    engine.register_handler(
        methods::TASKS_RESULT,
        std::sync::Arc::new(move |params: Option<Value>, ctx: RequestContext| {
            let s = s.clone();
            async move {
                let task_id = param_str(&params, "taskId")?;
                s.result(&task_id, &ctx).await
            }
        }),
    );

    let s = service.clone();
    engine.register_handler(
        methods::TASKS_CANCEL,
        std::sync::Arc::new(move |params: Option<Value>, _ctx: RequestContext| {
            let s = s.clone();
            async move {
                let task_id = param_str(&params, "taskId")?;
                let record = s.cancel(&task_id).await?;
                Ok(record.to_status_value())
            }
        }),
    );

    let s = service.clone();
    engine.register_handler(
        methods::TASKS_LIST,
        std::sync::Arc::new(move |params: Option<Value>, _ctx: RequestContext| {
            let s = s.clone();
            async move {
                let session_id = params
                    .as_ref()
                    .and_then(|p| p.get("sessionId"))
                    .and_then(Value::as_str)
                    .map(str::to_owned);
                let cursor = params
                    .as_ref()
                    .and_then(|p| p.get("cursor"))
                    .and_then(Value::as_str)
                    .map(str::to_owned);
                let limit = params
                    .as_ref()
                    .and_then(|p| p.get("limit"))
                    .and_then(Value::as_u64)
                    .map(|n| n as usize)
                    .unwrap_or(50);

                let page = s.list(session_id.as_deref(), cursor, limit).await?;
                Ok(serde_json::json!({
                    "tasks": page.records.iter().map(|r| r.to_status_value()).collect::<Vec<_>>(),
                    "nextCursor": page.next_cursor,
                }))
            }
        }),
    );

    let s = service.clone();
    engine.register_handler(
        methods::TASKS_CREATE,
        std::sync::Arc::new(move |params: Option<Value>, ctx: RequestContext| {
            let s = s.clone();
            async move {
                let ttl_ms = params.as_ref().and_then(|p| p.get("ttl")).and_then(Value::as_i64);
                let poll_interval_ms = params
                    .as_ref()
                    .and_then(|p| p.get("pollInterval"))
                    .and_then(Value::as_u64);
                let origin_request = params.clone().unwrap_or(Value::Null);
                let record = s
                    .create_task(ttl_ms, poll_interval_ms, ctx.request_id.clone(), origin_request, None)
                    .await?;
                Ok(record.to_status_value())
            }
        }),
    );
}
