//! JSON-RPC 2.0 envelope types (C1: message codec).
//!
//! Classifies a parsed envelope into one of request / notification / success
//! response / error response, per spec §4.1. `RequestId` is untagged so a
//! numeric id round-trips as a number, never a string.

use core::fmt;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// The only JSON-RPC version this crate speaks.
pub const JSONRPC_VERSION: &str = "2.0";

/// `jsonrpc` field marker. Always serializes to `"2.0"`; deserialization
/// rejects anything else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct JsonRpcVersion;

impl Serialize for JsonRpcVersion {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(JSONRPC_VERSION)
    }
}

impl<'de> Deserialize<'de> for JsonRpcVersion {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        if s == JSONRPC_VERSION {
            Ok(JsonRpcVersion)
        } else {
            Err(serde::de::Error::custom(format!(
                "unsupported jsonrpc version: {s}"
            )))
        }
    }
}

/// Request/response correlator. Strings and integers are both legal; the
/// wire representation of whichever variant was sent must be preserved.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// String identifier.
    String(String),
    /// Numeric identifier (no fractional ids on the wire).
    Number(i64),
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => write!(f, "{s}"),
            Self::Number(n) => write!(f, "{n}"),
        }
    }
}

impl From<String> for RequestId {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        Self::String(s.to_owned())
    }
}

impl From<i64> for RequestId {
    fn from(n: i64) -> Self {
        Self::Number(n)
    }
}

/// A JSON-RPC request: expects a matching response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: JsonRpcVersion,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    pub id: RequestId,
}

impl JsonRpcRequest {
    pub fn new(method: impl Into<String>, params: Option<Value>, id: impl Into<RequestId>) -> Self {
        Self {
            jsonrpc: JsonRpcVersion,
            method: method.into(),
            params,
            id: id.into(),
        }
    }

    /// The `_meta` object nested in `params`, if any.
    pub fn meta(&self) -> Option<&Value> {
        self.params.as_ref()?.get("_meta")
    }

    /// The `_meta.progressToken`, if the caller asked for progress relay.
    pub fn progress_token(&self) -> Option<Value> {
        self.meta()?.get("progressToken").cloned()
    }

    /// Whether `_meta.task` is present, i.e. the caller accepts a task result.
    pub fn wants_task(&self) -> bool {
        self.meta()
            .and_then(|m| m.get("task"))
            .is_some()
    }
}

/// A JSON-RPC notification: no id, no response expected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    pub jsonrpc: JsonRpcVersion,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcNotification {
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JsonRpcVersion,
            method: method.into(),
            params,
        }
    }
}

/// A successful response to a prior request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: JsonRpcVersion,
    pub id: RequestId,
    pub result: Value,
}

impl JsonRpcResponse {
    pub fn new(id: RequestId, result: Value) -> Self {
        Self {
            jsonrpc: JsonRpcVersion,
            id,
            result,
        }
    }
}

/// A standard JSON-RPC error object, nested in an error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcErrorObject {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// An error response to a prior request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub jsonrpc: JsonRpcVersion,
    pub id: Option<RequestId>,
    pub error: JsonRpcErrorObject,
}

impl JsonRpcError {
    pub fn new(id: Option<RequestId>, code: i32, message: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            jsonrpc: JsonRpcVersion,
            id,
            error: JsonRpcErrorObject {
                code,
                message: message.into(),
                data,
            },
        }
    }
}

/// The four message shapes an envelope classifies into, plus `Invalid` for
/// anything the codec could not place.
#[derive(Debug, Clone)]
pub enum JsonRpcMessage {
    Request(JsonRpcRequest),
    Notification(JsonRpcNotification),
    Response(JsonRpcResponse),
    Error(JsonRpcError),
}

impl JsonRpcMessage {
    /// Classify a raw JSON value into one of the four envelope shapes.
    ///
    /// Rejects anything missing `jsonrpc: "2.0"`. A value carrying `method`
    /// is a request (if it also carries `id`) or a notification (if not); a
    /// value carrying `result` is a success response; a value carrying
    /// `error` is an error response.
    pub fn classify(value: Value) -> Result<Self, crate::error::McpError> {
        let obj = value
            .as_object()
            .ok_or_else(|| crate::error::McpError::parse_error("message is not a JSON object"))?;

        match obj.get("jsonrpc").and_then(Value::as_str) {
            Some(JSONRPC_VERSION) => {}
            _ => {
                return Err(crate::error::McpError::invalid_request(
                    "missing or unsupported jsonrpc version",
                ));
            }
        }

        if obj.contains_key("method") {
            if obj.contains_key("id") {
                let req: JsonRpcRequest = serde_json::from_value(value)
                    .map_err(|e| crate::error::McpError::parse_error(e.to_string()))?;
                Ok(Self::Request(req))
            } else {
                let notif: JsonRpcNotification = serde_json::from_value(value)
                    .map_err(|e| crate::error::McpError::parse_error(e.to_string()))?;
                Ok(Self::Notification(notif))
            }
        } else if obj.contains_key("error") {
            let err: JsonRpcError = serde_json::from_value(value)
                .map_err(|e| crate::error::McpError::parse_error(e.to_string()))?;
            Ok(Self::Error(err))
        } else if obj.contains_key("result") {
            let resp: JsonRpcResponse = serde_json::from_value(value)
                .map_err(|e| crate::error::McpError::parse_error(e.to_string()))?;
            Ok(Self::Response(resp))
        } else {
            Err(crate::error::McpError::invalid_request(
                "message has neither method, result, nor error",
            ))
        }
    }

    /// Serialize back to a raw JSON value. Numeric ids stay numeric.
    pub fn to_value(&self) -> serde_json::Result<Value> {
        match self {
            Self::Request(r) => serde_json::to_value(r),
            Self::Notification(n) => serde_json::to_value(n),
            Self::Response(r) => serde_json::to_value(r),
            Self::Error(e) => serde_json::to_value(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn classifies_request() {
        let v = json!({"jsonrpc":"2.0","id":1,"method":"ping"});
        match JsonRpcMessage::classify(v).unwrap() {
            JsonRpcMessage::Request(r) => assert_eq!(r.id, RequestId::Number(1)),
            _ => panic!("expected request"),
        }
    }

    #[test]
    fn classifies_notification() {
        let v = json!({"jsonrpc":"2.0","method":"notifications/cancelled"});
        assert!(matches!(
            JsonRpcMessage::classify(v).unwrap(),
            JsonRpcMessage::Notification(_)
        ));
    }

    #[test]
    fn rejects_missing_version() {
        let v = json!({"id":1,"method":"ping"});
        assert!(JsonRpcMessage::classify(v).is_err());
    }

    #[test]
    fn numeric_id_round_trips_as_number() {
        let v = json!({"jsonrpc":"2.0","id":1,"method":"ping"});
        let msg = JsonRpcMessage::classify(v.clone()).unwrap();
        let back = msg.to_value().unwrap();
        assert_eq!(back["id"], json!(1));
        assert!(back["id"].is_number());
    }

    #[test]
    fn string_id_round_trips_as_string() {
        let v = json!({"jsonrpc":"2.0","id":"abc","result":{}});
        let msg = JsonRpcMessage::classify(v).unwrap();
        let back = msg.to_value().unwrap();
        assert_eq!(back["id"], json!("abc"));
    }

    #[test]
    fn progress_token_extracted_from_meta() {
        let req = JsonRpcRequest::new(
            "tools/call",
            Some(json!({"_meta": {"progressToken": "tok-1"}})),
            1,
        );
        assert_eq!(req.progress_token(), Some(json!("tok-1")));
    }
}
