//! Pure, no-I/O SSE event framing (spec §6): `id:`, `event: message`,
//! `data: <json>`, separated by a blank line.

use serde_json::Value;

/// One outbound SSE frame.
#[derive(Debug, Clone)]
pub struct SseEvent {
    pub id: Option<u64>,
    pub data: Value,
    pub retry_ms: Option<u64>,
}

impl SseEvent {
    pub fn message(data: Value) -> Self {
        Self {
            id: None,
            data,
            retry_ms: None,
        }
    }

    pub fn with_id(mut self, id: u64) -> Self {
        self.id = Some(id);
        self
    }

    /// A "priming" event: empty payload, used to open a stream and give
    /// the client a `retry:` hint (spec §4.4).
    pub fn priming(retry_ms: u64) -> Self {
        Self {
            id: None,
            data: Value::Null,
            retry_ms: Some(retry_ms),
        }
    }

    pub fn encode(&self) -> String {
        let mut out = String::new();
        if let Some(id) = self.id {
            out.push_str(&format!("id: {id}\n"));
        }
        if let Some(retry) = self.retry_ms {
            out.push_str(&format!("retry: {retry}\n"));
        }
        out.push_str("event: message\n");
        let payload = if self.data.is_null() {
            String::new()
        } else {
            serde_json::to_string(&self.data).unwrap_or_default()
        };
        out.push_str(&format!("data: {payload}\n\n"));
        out
    }
}
