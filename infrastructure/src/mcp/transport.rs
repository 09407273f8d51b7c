//! Message classification and the transport abstraction.
//!
//! A [`McpTransport`] carries JSON-RPC requests and notifications to one MCP
//! server. Two implementations exist: newline-delimited stdio
//! ([`RpcChannel`](super::stdio::RpcChannel)) and streamable HTTP
//! ([`HttpTransport`](super::http::HttpTransport)).

use super::error::Result;
use async_trait::async_trait;
use serde_json::Value;

/// Classification of an incoming JSON-RPC message.
#[derive(Debug, PartialEq, Eq)]
pub enum MessageKind {
    /// A response to one of our requests (has `id`, no `method`). Ids we
    /// did not issue (non-numeric) are reported as `None`.
    Response { id: Option<u64> },
    /// A request from the server (has `id` + `method`).
    IncomingRequest { id: Value, method: String },
    /// A notification (has `method`, no `id`).
    Notification { method: String },
    /// Neither `id` nor `method`.
    Invalid,
}

/// Classify a JSON-RPC message by inspecting `id` and `method` fields.
pub fn classify_message(json: &Value) -> MessageKind {
    let id = json.get("id").filter(|v| !v.is_null());
    let method = json.get("method").and_then(Value::as_str);

    match (id, method) {
        (Some(id), Some(method)) => MessageKind::IncomingRequest {
            id: id.clone(),
            method: method.to_string(),
        },
        (Some(id), None) => MessageKind::Response { id: id.as_u64() },
        (None, Some(method)) => MessageKind::Notification {
            method: method.to_string(),
        },
        (None, None) => MessageKind::Invalid,
    }
}

#[async_trait]
pub trait McpTransport: Send + Sync {
    /// Send a request and wait for its result.
    async fn request(&self, method: &str, params: Option<Value>) -> Result<Value>;

    async fn notify(&self, method: &str, params: Option<Value>) -> Result<()>;

    fn is_alive(&self) -> bool;

    /// Tear the channel down. Idempotent.
    async fn close(&self);
}
