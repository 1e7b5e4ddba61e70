//! Streamable-HTTP transport configuration (spec §4.4).

use std::time::Duration;

/// How session ids are issued on the first `initialize` POST.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionIdMode {
    /// Generate and require a session id (the default, stateful mode).
    Generate,
    /// Stateless mode: no id is issued, no validation is performed.
    None,
}

#[derive(Debug, Clone)]
pub struct StreamableHttpConfig {
    pub session_id_mode: SessionIdMode,
    /// If set, POSTs carrying at least one request get a single JSON
    /// response body instead of an SSE stream (spec §4.4).
    pub enable_json_response: bool,
    /// `retry:` hint sent on the priming SSE event, when an event store is
    /// configured.
    pub sse_retry: Duration,
    pub session_ttl: Duration,
    /// DNS-rebinding defense (spec §4.4): when non-empty, `Host`/`Origin`
    /// must match one of these. Empty means the check is disabled.
    pub allowed_hosts: Vec<String>,
    pub allowed_origins: Vec<String>,
}

impl Default for StreamableHttpConfig {
    fn default() -> Self {
        Self {
            session_id_mode: SessionIdMode::Generate,
            enable_json_response: false,
            sse_retry: Duration::from_millis(1000),
            session_ttl: Duration::from_secs(3600),
            allowed_hosts: Vec::new(),
            allowed_origins: Vec::new(),
        }
    }
}
