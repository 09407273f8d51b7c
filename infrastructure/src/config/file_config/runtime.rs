//! Runtime limits from TOML (`[runtime]` section)

use reagent_application::RuntimeParams;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::FileAgentConfig;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileRuntimeConfig {
    /// Upper bound for one tool call
    pub tool_timeout_secs: u64,
    /// Upper bound for attaching one tool source
    pub connect_timeout_secs: u64,
    /// Model turns requesting tools allowed per message
    pub max_tool_turns: usize,
    /// Events buffered between a running session and its subscriber
    pub event_buffer: usize,
}

impl Default for FileRuntimeConfig {
    fn default() -> Self {
        let params = RuntimeParams::default();
        Self {
            tool_timeout_secs: params.tool_timeout.as_secs(),
            connect_timeout_secs: params.connect_timeout.as_secs(),
            max_tool_turns: params.max_tool_turns,
            event_buffer: params.event_buffer,
        }
    }
}

impl FileRuntimeConfig {
    pub fn to_params(&self, agent: &FileAgentConfig) -> RuntimeParams {
        let mut params = RuntimeParams::default()
            .with_tool_timeout(Duration::from_secs(self.tool_timeout_secs.max(1)))
            .with_connect_timeout(Duration::from_secs(self.connect_timeout_secs.max(1)))
            .with_max_tool_turns(self.max_tool_turns)
            .with_event_buffer(self.event_buffer)
            .with_agent_name(agent.name.clone());
        if let Some(prompt) = &agent.prompt {
            params = params.with_system_prompt(prompt.clone());
        }
        params
    }
}
