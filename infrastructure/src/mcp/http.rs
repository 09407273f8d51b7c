//! Streamable HTTP transport.
//!
//! Every JSON-RPC message is a POST to the endpoint. The server answers with
//! either a JSON body or a short `text/event-stream` carrying the response.
//! A session id handed out in `Mcp-Session-Id` is echoed on later requests
//! and released with a DELETE on close.

use super::error::{McpError, Result};
use super::protocol::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};
use super::transport::{MessageKind, McpTransport, classify_message};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, trace};

const SESSION_HEADER: &str = "mcp-session-id";

pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
    headers: HeaderMap,
    session_id: Mutex<Option<String>>,
    alive: AtomicBool,
}

impl HttpTransport {
    /// `env` entries become request headers (see [`headers_from_env`]).
    pub fn new(
        client: reqwest::Client,
        url: impl Into<String>,
        env: &BTreeMap<String, String>,
    ) -> Result<Self> {
        Ok(Self {
            client,
            url: url.into(),
            headers: headers_from_env(env)?,
            session_id: Mutex::new(None),
            alive: AtomicBool::new(true),
        })
    }

    pub fn session_id(&self) -> Option<String> {
        self.session_id.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    async fn post<T: Serialize>(&self, body: &T) -> Result<reqwest::Response> {
        if !self.alive.load(Ordering::SeqCst) {
            return Err(McpError::TransportClosed);
        }

        let mut request = self
            .client
            .post(&self.url)
            .headers(self.headers.clone())
            .header(ACCEPT, "application/json, text/event-stream")
            .json(body);
        if let Some(id) = self.session_id() {
            request = request.header(SESSION_HEADER, id);
        }

        let response = request.send().await?;

        if let Some(id) = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            *self.session_id.lock().unwrap_or_else(|e| e.into_inner()) = Some(id.to_string());
        }

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(McpError::HttpStatus {
                status: status.as_u16(),
                body: truncate(&body, 200),
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl McpTransport for HttpTransport {
    async fn request(&self, method: &str, params: Option<Value>) -> Result<Value> {
        let request = JsonRpcRequest::new(method, params);
        trace!(url = %self.url, id = request.id, method, "Posting request");

        let response = self.post(&request).await?;
        let is_stream = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("text/event-stream"));
        let body = response.text().await?;

        if is_stream {
            let message = parse_sse_messages(&body)
                .into_iter()
                .find(|m| classify_message(m) == MessageKind::Response { id: Some(request.id) })
                .ok_or_else(|| {
                    McpError::Malformed(format!("event stream carried no response to {}", method))
                })?;
            JsonRpcResponse::into_result(message)
        } else {
            let message: Value =
                serde_json::from_str(&body).map_err(|e| McpError::Malformed(e.to_string()))?;
            JsonRpcResponse::into_result(message)
        }
    }

    async fn notify(&self, method: &str, params: Option<Value>) -> Result<()> {
        self.post(&JsonRpcNotification::new(method, params)).await?;
        Ok(())
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    async fn close(&self) {
        if !self.alive.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(id) = self.session_id() {
            let result = self
                .client
                .delete(&self.url)
                .headers(self.headers.clone())
                .header(SESSION_HEADER, id)
                .send()
                .await;
            if let Err(e) = result {
                debug!(url = %self.url, error = %e, "Session release failed");
            }
        }
    }
}

/// Turn source `env` entries into request headers.
///
/// Keys are lower-cased with `_` mapped to `-`, so `X_API_KEY` is sent as
/// `x-api-key`. The key `AUTHORIZATION_BEARER` is sent as
/// `Authorization: Bearer <value>`.
pub fn headers_from_env(env: &BTreeMap<String, String>) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    for (key, value) in env {
        let (name, value) = if key.eq_ignore_ascii_case("AUTHORIZATION_BEARER") {
            ("authorization".to_string(), format!("Bearer {}", value))
        } else {
            (key.to_ascii_lowercase().replace('_', "-"), value.clone())
        };
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| McpError::InvalidHeader(key.clone()))?;
        let value =
            HeaderValue::from_str(&value).map_err(|_| McpError::InvalidHeader(key.clone()))?;
        headers.insert(name, value);
    }
    Ok(headers)
}

/// Extract the JSON payloads of every `data:` event in an SSE body.
pub fn parse_sse_messages(body: &str) -> Vec<Value> {
    let normalized = body.replace("\r\n", "\n");
    normalized
        .split("\n\n")
        .filter_map(|event| {
            let data: Vec<&str> = event
                .lines()
                .filter_map(|line| line.strip_prefix("data:"))
                .map(|d| d.strip_prefix(' ').unwrap_or(d))
                .collect();
            if data.is_empty() {
                return None;
            }
            serde_json::from_str(&data.join("\n")).ok()
        })
        .collect()
}

fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}
