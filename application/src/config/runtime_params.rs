//! Runtime parameters: timeouts and loop limits for sessions.
//!
//! [`RuntimeParams`] is shared by every session a supervisor creates. These
//! are application-layer concerns, not domain policy.

use std::time::Duration;

/// Timeouts, limits and agent identity applied to every session.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeParams {
    /// Upper bound for a single tool invocation.
    pub tool_timeout: Duration,
    /// Upper bound for attaching one tool source (connect + list).
    pub connect_timeout: Duration,
    /// Maximum model turns that request tools within one run.
    pub max_tool_turns: usize,
    /// Capacity of the session → multiplexer event channel.
    pub event_buffer: usize,
    /// Agent display name, used in the default system prompt.
    pub agent_name: String,
    /// System prompt override.
    pub system_prompt: Option<String>,
}

impl Default for RuntimeParams {
    fn default() -> Self {
        Self {
            tool_timeout: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(30),
            max_tool_turns: 10,
            event_buffer: 1,
            agent_name: "reagent".to_string(),
            system_prompt: None,
        }
    }
}

impl RuntimeParams {
    // ==================== Builder Methods ====================

    pub fn with_tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = timeout;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_max_tool_turns(mut self, max: usize) -> Self {
        self.max_tool_turns = max;
        self
    }

    pub fn with_event_buffer(mut self, capacity: usize) -> Self {
        self.event_buffer = capacity.max(1);
        self
    }

    pub fn with_agent_name(mut self, name: impl Into<String>) -> Self {
        self.agent_name = name.into();
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// The system prompt sent with every turn.
    ///
    /// Without an override, names the agent and lists the available tools.
    pub fn render_system_prompt(&self, tool_names: &[String]) -> String {
        if let Some(prompt) = &self.system_prompt {
            return prompt.clone();
        }
        let mut prompt = format!(
            "You are {}, an assistant that answers engineering questions. \
             Use the provided tools for calculations instead of estimating.",
            self.agent_name
        );
        if tool_names.is_empty() {
            prompt.push_str(" No tools are currently available.");
        } else {
            prompt.push_str(" Available tools: ");
            prompt.push_str(&tool_names.join(", "));
            prompt.push('.');
        }
        prompt
    }
}
