//! MCP-backed [`ToolConnector`].

use super::error::{McpError, Result};
use super::protocol::{
    CallToolParams, CallToolResult, Implementation, InitializeParams, InitializeResult,
    ListToolsParams, ListToolsResult,
};
use super::stdio::ChildProcess;
use super::transport::McpTransport;
use async_trait::async_trait;
use reagent_application::ToolConnector;
use reagent_domain::{ToolDefinition, ToolInvocationError, ToolOutput};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

/// Upper bound on `tools/list` pages, against servers that loop cursors.
const MAX_LIST_PAGES: usize = 64;

pub struct McpConnector {
    source_name: String,
    transport: Arc<dyn McpTransport>,
    process: Option<ChildProcess>,
    server: Implementation,
    closed: AtomicBool,
}

impl std::fmt::Debug for McpConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpConnector")
            .field("source_name", &self.source_name)
            .field("server", &self.server)
            .field("local", &self.process.is_some())
            .finish()
    }
}

impl McpConnector {
    /// Run the MCP handshake over `transport`.
    ///
    /// On failure the transport is closed and `process`, if any, is killed.
    pub async fn handshake(
        source_name: impl Into<String>,
        client_name: &str,
        transport: Arc<dyn McpTransport>,
        process: Option<ChildProcess>,
    ) -> Result<Self> {
        let source_name = source_name.into();

        let init = async {
            let params = serde_json::to_value(InitializeParams::new(client_name))?;
            let raw = transport.request("initialize", Some(params)).await?;
            let result: InitializeResult =
                serde_json::from_value(raw).map_err(|e| McpError::Malformed(e.to_string()))?;
            transport.notify("notifications/initialized", None).await?;
            Ok::<_, McpError>(result)
        };

        match init.await {
            Ok(result) => {
                info!(
                    source = %source_name,
                    server = %result.server_info.name,
                    server_version = %result.server_info.version,
                    protocol = %result.protocol_version,
                    "Tool source connected"
                );
                Ok(Self {
                    source_name,
                    transport,
                    process,
                    server: result.server_info,
                    closed: AtomicBool::new(false),
                })
            }
            Err(e) => {
                transport.close().await;
                if let Some(process) = &process {
                    process.kill().await;
                }
                Err(e)
            }
        }
    }

    /// Name and version the server reported.
    pub fn server_info(&self) -> &Implementation {
        &self.server
    }

    async fn list_all(&self) -> Result<Vec<ToolDefinition>> {
        let mut tools = Vec::new();
        let mut cursor = None;

        for _ in 0..MAX_LIST_PAGES {
            let params = serde_json::to_value(ListToolsParams { cursor: cursor.take() })?;
            let raw = self.transport.request("tools/list", Some(params)).await?;
            let page: ListToolsResult =
                serde_json::from_value(raw).map_err(|e| McpError::Malformed(e.to_string()))?;

            tools.extend(page.tools.into_iter().map(|t| {
                ToolDefinition::new(t.name, t.description.unwrap_or_default())
                    .with_schema(t.input_schema)
            }));

            match page.next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => return Ok(tools),
            }
        }

        debug!(source = %self.source_name, "tools/list pagination stopped at page limit");
        Ok(tools)
    }
}

#[async_trait]
impl ToolConnector for McpConnector {
    fn source_name(&self) -> &str {
        &self.source_name
    }

    async fn list_operations(&self) -> std::result::Result<Vec<ToolDefinition>, ToolInvocationError> {
        Ok(self.list_all().await?)
    }

    async fn invoke(
        &self,
        operation: &str,
        args: serde_json::Value,
    ) -> std::result::Result<ToolOutput, ToolInvocationError> {
        let params = serde_json::to_value(CallToolParams {
            name: operation,
            arguments: args,
        })
        .map_err(McpError::from)?;
        let raw = self.transport.request("tools/call", Some(params)).await?;
        let result: CallToolResult = serde_json::from_value(raw)
            .map_err(|e| ToolInvocationError::malformed(e.to_string()))?;

        let text = result.text();
        if result.is_error {
            return Err(ToolInvocationError::remote(if text.is_empty() {
                format!("{} reported an error", operation)
            } else {
                text
            }));
        }

        let output = ToolOutput::text(text);
        Ok(match result.structured_content {
            Some(structured) => output.with_structured(structured),
            None => output,
        })
    }

    fn is_alive(&self) -> bool {
        !self.closed.load(Ordering::SeqCst) && self.transport.is_alive()
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.transport.close().await;
        if let Some(process) = &self.process {
            process.kill().await;
        }
        debug!(source = %self.source_name, "Tool source closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::stdio::RpcChannel;
    use reagent_domain::InvocationErrorKind;
    use serde_json::{Value, json};
    use std::time::Duration;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

    /// In-process MCP server speaking newline-delimited JSON-RPC.
    ///
    /// Tools: `add` (sums a and b), `fail` (isError), `garbage` (non-result
    /// payload), `slow` (never answers). `tools/list` is split in two pages.
    async fn fake_server(stream: tokio::io::DuplexStream) {
        let (read, mut write) = tokio::io::split(stream);
        let mut lines = BufReader::new(read).lines();

        while let Ok(Some(line)) = lines.next_line().await {
            let msg: Value = serde_json::from_str(&line).unwrap();
            let Some(id) = msg.get("id").cloned() else {
                continue;
            };
            let result = match msg["method"].as_str().unwrap_or_default() {
                "initialize" => json!({
                    "protocolVersion": "2024-11-05",
                    "serverInfo": { "name": "fake", "version": "1.0" },
                    "capabilities": { "tools": {} }
                }),
                "tools/list" if msg["params"]["cursor"].is_null() => json!({
                    "tools": [{ "name": "add", "description": "Add two numbers",
                                "inputSchema": { "type": "object" } }],
                    "nextCursor": "page-2"
                }),
                "tools/list" => json!({
                    "tools": [{ "name": "fail" }, { "name": "garbage" }, { "name": "slow" }]
                }),
                "tools/call" => match msg["params"]["name"].as_str().unwrap_or_default() {
                    "add" => {
                        let sum = msg["params"]["arguments"]["a"].as_i64().unwrap_or(0)
                            + msg["params"]["arguments"]["b"].as_i64().unwrap_or(0);
                        json!({
                            "content": [{ "type": "text", "text": sum.to_string() }],
                            "structuredContent": { "sum": sum }
                        })
                    }
                    "fail" => json!({
                        "content": [{ "type": "text", "text": "pressure out of range" }],
                        "isError": true
                    }),
                    "garbage" => json!({ "content": "not a list" }),
                    _ => continue,
                },
                other => {
                    let reply = json!({ "jsonrpc": "2.0", "id": id,
                        "error": { "code": -32601, "message": format!("no {}", other) } });
                    write.write_all(format!("{}\n", reply).as_bytes()).await.unwrap();
                    continue;
                }
            };
            let reply = json!({ "jsonrpc": "2.0", "id": id, "result": result });
            write.write_all(format!("{}\n", reply).as_bytes()).await.unwrap();
        }
    }

    async fn connected() -> McpConnector {
        let (client, server) = tokio::io::duplex(64 * 1024);
        tokio::spawn(fake_server(server));
        let (read, write) = tokio::io::split(client);
        let channel = RpcChannel::spawn("fake", read, write);
        McpConnector::handshake("fake", "reagent-test", Arc::new(channel), None)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn handshake_and_paginated_listing() {
        let connector = connected().await;
        assert_eq!(connector.server_info().name, "fake");
        assert!(connector.is_alive());

        let ops = connector.list_operations().await.unwrap();
        let names: Vec<_> = ops.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["add", "fail", "garbage", "slow"]);
        assert_eq!(ops[0].description, "Add two numbers");
    }

    #[tokio::test]
    async fn invoke_maps_results_and_errors() {
        let connector = connected().await;

        let output = connector.invoke("add", json!({ "a": 2, "b": 3 })).await.unwrap();
        assert_eq!(output.text, "5");
        assert_eq!(output.structured, Some(json!({ "sum": 5 })));

        let err = connector.invoke("fail", json!({})).await.unwrap_err();
        assert_eq!(err.kind, InvocationErrorKind::RemoteError);
        assert_eq!(err.message, "pressure out of range");

        let err = connector.invoke("garbage", json!({})).await.unwrap_err();
        assert_eq!(err.kind, InvocationErrorKind::MalformedResponse);
    }

    #[tokio::test]
    async fn timed_out_call_does_not_poison_the_next() {
        let connector = connected().await;

        let slow = tokio::time::timeout(
            Duration::from_millis(50),
            connector.invoke("slow", json!({})),
        )
        .await;
        assert!(slow.is_err());

        let output = connector.invoke("add", json!({ "a": 1, "b": 1 })).await.unwrap();
        assert_eq!(output.text, "2");
    }

    #[tokio::test]
    async fn close_is_idempotent_and_final() {
        let connector = connected().await;
        connector.close().await;
        connector.close().await;
        assert!(!connector.is_alive());
        assert!(connector.invoke("add", json!({})).await.is_err());
    }

    #[tokio::test]
    async fn handshake_failure_closes_transport() {
        let (client, server) = tokio::io::duplex(1024);
        drop(server);
        let (read, write) = tokio::io::split(client);
        let channel = Arc::new(RpcChannel::spawn("dead", read, write));

        let result =
            McpConnector::handshake("dead", "reagent-test", channel.clone(), None).await;
        assert!(result.is_err());
        assert!(!channel.is_alive());
    }
}
