//! Inbound handler trait and the per-request execution context (spec §4.3,
//! §9: "per-request context replaces ambient per-connection globals").

use std::sync::Arc;

use async_trait::async_trait;
use mcp_core::{AuthInfo, McpResult, RequestId};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::engine::EngineHandle;

/// Everything a handler needs besides its own `params`, passed explicitly
/// so handlers stay unit-testable without a live connection.
#[derive(Clone)]
pub struct RequestContext {
    pub request_id: RequestId,
    pub cancellation: CancellationToken,
    pub auth: Option<AuthInfo>,
    progress_token: Option<Value>,
    engine: EngineHandle,
}

impl std::fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestContext")
            .field("request_id", &self.request_id)
            .field("auth", &self.auth)
            .field("has_progress_token", &self.progress_token.is_some())
            .finish_non_exhaustive()
    }
}

impl RequestContext {
    pub(crate) fn new(
        request_id: RequestId,
        cancellation: CancellationToken,
        auth: Option<AuthInfo>,
        progress_token: Option<Value>,
        engine: EngineHandle,
    ) -> Self {
        Self {
            request_id,
            cancellation,
            auth,
            progress_token,
            engine,
        }
    }

    /// Send a notification related back to this request.
    pub async fn send_notification(&self, method: &str, params: Option<Value>) -> McpResult<()> {
        self.engine
            .send_notification_for(Some(self.request_id.clone()), method, params)
            .await
    }

    /// Issue a server-initiated request (sampling, elicitation, roots) tied
    /// to this inbound request's stream, awaiting the correlated response.
    pub async fn send_request(
        &self,
        method: &str,
        params: Option<Value>,
        opts: crate::engine::OutboundRequestOptions,
    ) -> McpResult<Value> {
        self.engine
            .send_request_for(Some(self.request_id.clone()), method, params, opts)
            .await
    }

    /// Report progress under this request's progress token, if the caller
    /// supplied one via `_meta.progressToken`. No-ops otherwise.
    pub async fn report_progress(&self, progress: f64, total: Option<f64>, message: Option<String>) {
        let Some(token) = self.progress_token.clone() else {
            return;
        };
        let mut payload = serde_json::json!({
            "progressToken": token,
            "progress": progress,
        });
        if let Some(total) = total {
            payload["total"] = serde_json::json!(total);
        }
        if let Some(message) = message {
            payload["message"] = serde_json::json!(message);
        }
        let _ = self
            .engine
            .send_notification_for(
                Some(self.request_id.clone()),
                mcp_core::constants::methods::PROGRESS,
                Some(payload),
            )
            .await;
    }

    /// Whether the inbound request has been cancelled. Cancellation is
    /// cooperative (spec §4.3): handlers may check this and stop promptly,
    /// or ignore it entirely.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// The running engine, for handlers (namely `initialize`) that need to
    /// record connection-level state such as the peer's declared
    /// capabilities.
    pub fn engine(&self) -> &EngineHandle {
        &self.engine
    }
}

/// A registered inbound method handler.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, params: Option<Value>, ctx: RequestContext) -> McpResult<Value>;
}

#[async_trait]
impl<F, Fut> Handler for F
where
    F: Fn(Option<Value>, RequestContext) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = McpResult<Value>> + Send,
{
    async fn handle(&self, params: Option<Value>, ctx: RequestContext) -> McpResult<Value> {
        (self)(params, ctx).await
    }
}

pub type SharedHandler = Arc<dyn Handler>;
