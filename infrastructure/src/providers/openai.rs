//! OpenAI Chat Completions backend.
//!
//! Also serves Google Gemini through its OpenAI-compatible endpoint.

use super::naming::ToolNameMap;
use super::status;
use async_trait::async_trait;
use reagent_application::{BackendError, ModelBackend, TurnRequest};
use reagent_domain::util::truncate_str;
use reagent_domain::{
    ContentBlock, LlmResponse, Message, ModelBackendConfig, ModelProvider, StopReason, Usage,
};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, warn};

pub const OPENAI_API_BASE: &str = "https://api.openai.com/v1";
pub const GOOGLE_OPENAI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/openai";

pub struct OpenAiBackend {
    client: reqwest::Client,
    config: ModelBackendConfig,
    api_key: String,
    endpoint: String,
}

impl std::fmt::Debug for OpenAiBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiBackend")
            .field("config", &self.config)
            .field("endpoint", &self.endpoint)
            .field("api_key", &"<REDACTED>")
            .finish()
    }
}

impl OpenAiBackend {
    pub fn new(client: reqwest::Client, config: ModelBackendConfig, api_key: String) -> Self {
        let base = config.base_url.clone().unwrap_or_else(|| {
            match config.provider {
                ModelProvider::Google => GOOGLE_OPENAI_API_BASE,
                _ => OPENAI_API_BASE,
            }
            .to_string()
        });
        let endpoint = format!("{}/chat/completions", base.trim_end_matches('/'));
        Self {
            client,
            config,
            api_key,
            endpoint,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn build_body(&self, request: &TurnRequest, names: &ToolNameMap) -> Value {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if let Some(system) = &request.system_prompt {
            messages.push(json!({ "role": "system", "content": system }));
        }
        messages.extend(request.messages.iter().map(|m| convert_message(m, names)));

        let mut body = json!({
            "model": self.config.model,
            "messages": messages,
            "temperature": self.config.temperature,
            "max_tokens": self.config.max_tokens,
        });

        if !request.tools.is_empty() {
            let tools: Vec<Value> = request
                .tools
                .iter()
                .map(|t| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": names.encode(t.name.as_str()),
                            "description": t.description,
                            "parameters": t.input_schema,
                        }
                    })
                })
                .collect();
            body["tools"] = json!(tools);
        }
        body
    }
}

fn convert_message(message: &Message, names: &ToolNameMap) -> Value {
    match message {
        Message::User { content } => json!({ "role": "user", "content": content }),
        Message::Assistant {
            content,
            tool_calls,
        } if tool_calls.is_empty() => json!({ "role": "assistant", "content": content }),
        Message::Assistant {
            content,
            tool_calls,
        } => {
            let calls: Vec<Value> = tool_calls
                .iter()
                .map(|c| {
                    json!({
                        "id": c.id.as_str(),
                        "type": "function",
                        "function": {
                            "name": names.encode(&c.name),
                            "arguments": c.arguments.to_string(),
                        }
                    })
                })
                .collect();
            let content = if content.is_empty() {
                Value::Null
            } else {
                json!(content)
            };
            json!({ "role": "assistant", "content": content, "tool_calls": calls })
        }
        Message::Tool {
            call_id, content, ..
        } => json!({ "role": "tool", "tool_call_id": call_id.as_str(), "content": content }),
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ChatToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ChatToolCall {
    #[serde(default)]
    id: String,
    function: ChatFunction,
}

#[derive(Debug, Deserialize)]
struct ChatFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

fn parse_response(text: &str, names: &ToolNameMap) -> Result<LlmResponse, BackendError> {
    let response: ChatResponse = serde_json::from_str(text).map_err(|e| {
        BackendError::MalformedResponse(format!("{}: {}", e, truncate_str(text, 200)))
    })?;
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| BackendError::MalformedResponse("response has no choices".into()))?;

    let mut content = Vec::new();
    if let Some(text) = choice.message.content.filter(|t| !t.is_empty()) {
        content.push(ContentBlock::text(text));
    }
    for call in choice.message.tool_calls.unwrap_or_default() {
        let input = if call.function.arguments.trim().is_empty() {
            json!({})
        } else {
            serde_json::from_str(&call.function.arguments).unwrap_or_else(|e| {
                warn!(tool = %call.function.name, error = %e, "Tool arguments are not valid JSON");
                json!({ "raw": call.function.arguments })
            })
        };
        content.push(ContentBlock::tool_use(
            call.id,
            names.decode(&call.function.name),
            input,
        ));
    }

    let stop_reason = choice.finish_reason.map(|r| match r.as_str() {
        "stop" => StopReason::EndTurn,
        "tool_calls" | "function_call" => StopReason::ToolUse,
        "length" => StopReason::MaxTokens,
        _ => StopReason::Other(r),
    });

    Ok(LlmResponse {
        content,
        stop_reason,
        model: response.model,
        usage: response.usage.map(|u| Usage {
            input_tokens: u.prompt_tokens,
            output_tokens: u.completion_tokens,
        }),
    })
}

#[async_trait]
impl ModelBackend for OpenAiBackend {
    fn config(&self) -> &ModelBackendConfig {
        &self.config
    }

    async fn next_turn(&self, request: TurnRequest) -> Result<LlmResponse, BackendError> {
        let provider = self.config.provider.as_str();
        let names = ToolNameMap::new(&request.tools);
        let body = self.build_body(&request, &names);

        debug!(
            provider,
            model = %self.config.model,
            message_count = request.messages.len(),
            tool_count = request.tools.len(),
            "Requesting model turn"
        );

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| status::from_transport(provider, e))?;

        let code = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| status::from_transport(provider, e))?;
        if !code.is_success() {
            return Err(status::from_status(provider, code, &text));
        }

        let turn = parse_response(&text, &names)?;
        debug!(
            provider,
            stop_reason = ?turn.stop_reason,
            tool_calls = turn.tool_calls().len(),
            "Model turn received"
        );
        Ok(turn)
    }
}
