//! Agent identity from TOML (`[agent]` section)

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileAgentConfig {
    /// Display name, used in the default system prompt
    pub name: String,
    /// System prompt override
    pub prompt: Option<String>,
    /// Keep conversation memory across messages
    pub memory: bool,
}

impl Default for FileAgentConfig {
    fn default() -> Self {
        Self {
            name: "reagent".to_string(),
            prompt: None,
            memory: false,
        }
    }
}
