//! Anthropic Messages API backend.
//!
//! Differences from the chat-completions shape:
//! - the system prompt is a top-level field;
//! - tool calls are `tool_use` blocks in assistant messages;
//! - tool results are `tool_result` blocks in the following user message,
//!   all results of one turn in a single message.

use super::naming::ToolNameMap;
use super::status;
use async_trait::async_trait;
use reagent_application::{BackendError, ModelBackend, TurnRequest};
use reagent_domain::util::truncate_str;
use reagent_domain::{ContentBlock, LlmResponse, Message, ModelBackendConfig, StopReason, Usage};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

pub const ANTHROPIC_API_BASE: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct AnthropicBackend {
    client: reqwest::Client,
    config: ModelBackendConfig,
    api_key: String,
    endpoint: String,
}

impl std::fmt::Debug for AnthropicBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicBackend")
            .field("config", &self.config)
            .field("api_key", &"<REDACTED>")
            .finish()
    }
}

impl AnthropicBackend {
    pub fn new(client: reqwest::Client, config: ModelBackendConfig, api_key: String) -> Self {
        let base = config
            .base_url
            .clone()
            .unwrap_or_else(|| ANTHROPIC_API_BASE.to_string());
        let endpoint = format!("{}/v1/messages", base.trim_end_matches('/'));
        Self {
            client,
            config,
            api_key,
            endpoint,
        }
    }

    fn build_body(&self, request: &TurnRequest, names: &ToolNameMap) -> Value {
        let mut body = json!({
            "model": self.config.model,
            "messages": convert_messages(&request.messages, names),
            "max_tokens": self.config.max_tokens,
            "temperature": self.config.temperature,
        });

        if let Some(system) = &request.system_prompt {
            body["system"] = json!(system);
        }
        if !request.tools.is_empty() {
            let tools: Vec<Value> = request
                .tools
                .iter()
                .map(|t| {
                    json!({
                        "name": names.encode(t.name.as_str()),
                        "description": t.description,
                        "input_schema": t.input_schema,
                    })
                })
                .collect();
            body["tools"] = json!(tools);
        }
        body
    }
}

fn convert_messages(messages: &[Message], names: &ToolNameMap) -> Vec<Value> {
    let mut out: Vec<Value> = Vec::with_capacity(messages.len());

    for message in messages {
        match message {
            Message::User { content } => out.push(json!({ "role": "user", "content": content })),
            Message::Assistant {
                content,
                tool_calls,
            } => {
                let mut blocks = Vec::new();
                if !content.is_empty() {
                    blocks.push(json!({ "type": "text", "text": content }));
                }
                for call in tool_calls {
                    blocks.push(json!({
                        "type": "tool_use",
                        "id": call.id.as_str(),
                        "name": names.encode(&call.name),
                        "input": call.arguments,
                    }));
                }
                if blocks.is_empty() {
                    blocks.push(json!({ "type": "text", "text": " " }));
                }
                out.push(json!({ "role": "assistant", "content": blocks }));
            }
            Message::Tool {
                call_id,
                content,
                is_error,
                ..
            } => {
                let block = json!({
                    "type": "tool_result",
                    "tool_use_id": call_id.as_str(),
                    "content": content,
                    "is_error": is_error,
                });
                // Consecutive results belong to the same user message
                match out.last_mut().and_then(tool_result_blocks) {
                    Some(blocks) => blocks.push(block),
                    None => out.push(json!({ "role": "user", "content": [block] })),
                }
            }
        }
    }
    out
}

fn tool_result_blocks(message: &mut Value) -> Option<&mut Vec<Value>> {
    if message["role"] != "user" {
        return None;
    }
    message["content"]
        .as_array_mut()
        .filter(|blocks| blocks.iter().all(|b| b["type"] == "tool_result"))
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    model: Option<String>,
    content: Vec<ResponseBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
    #[serde(default)]
    usage: Option<ResponseUsage>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ResponseBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct ResponseUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

fn parse_response(text: &str, names: &ToolNameMap) -> Result<LlmResponse, BackendError> {
    let response: MessagesResponse = serde_json::from_str(text).map_err(|e| {
        BackendError::MalformedResponse(format!("{}: {}", e, truncate_str(text, 200)))
    })?;

    let content = response
        .content
        .into_iter()
        .filter_map(|block| match block {
            ResponseBlock::Text { text } if !text.is_empty() => Some(ContentBlock::text(text)),
            ResponseBlock::ToolUse { id, name, input } => {
                Some(ContentBlock::tool_use(id, names.decode(&name), input))
            }
            _ => None,
        })
        .collect();

    let stop_reason = response.stop_reason.map(|r| match r.as_str() {
        "end_turn" | "stop_sequence" => StopReason::EndTurn,
        "tool_use" => StopReason::ToolUse,
        "max_tokens" => StopReason::MaxTokens,
        _ => StopReason::Other(r),
    });

    Ok(LlmResponse {
        content,
        stop_reason,
        model: response.model,
        usage: response.usage.map(|u| Usage {
            input_tokens: u.input_tokens,
            output_tokens: u.output_tokens,
        }),
    })
}

#[async_trait]
impl ModelBackend for AnthropicBackend {
    fn config(&self) -> &ModelBackendConfig {
        &self.config
    }

    async fn next_turn(&self, request: TurnRequest) -> Result<LlmResponse, BackendError> {
        let names = ToolNameMap::new(&request.tools);
        let body = self.build_body(&request, &names);

        debug!(
            provider = "anthropic",
            model = %self.config.model,
            message_count = request.messages.len(),
            tool_count = request.tools.len(),
            "Requesting model turn"
        );

        let response = self
            .client
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| status::from_transport("anthropic", e))?;

        let code = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| status::from_transport("anthropic", e))?;
        if !code.is_success() {
            return Err(status::from_status("anthropic", code, &text));
        }

        parse_response(&text, &names)
    }
}
