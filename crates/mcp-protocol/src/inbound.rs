//! Tracking for in-flight inbound requests, so
//! `notifications/cancelled{requestId}` can trip the right signal (spec §4.3).

use dashmap::DashMap;
use mcp_core::RequestId;
use tokio_util::sync::CancellationToken;

#[derive(Default)]
pub(crate) struct InboundTable {
    inner: DashMap<RequestId, CancellationToken>,
}

impl InboundTable {
    pub fn register(&self, id: RequestId, token: CancellationToken) {
        self.inner.insert(id, token);
    }

    pub fn deregister(&self, id: &RequestId) {
        self.inner.remove(id);
    }

    pub fn cancel(&self, id: &RequestId) {
        if let Some(token) = self.inner.get(id) {
            token.cancel();
        }
    }
}
