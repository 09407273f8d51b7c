//! Model backend selection: provider, model name and sampling parameters

use crate::core::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Default sampling temperature.
pub const DEFAULT_TEMPERATURE: f32 = 0.0;
/// Default completion budget.
pub const DEFAULT_MAX_TOKENS: u32 = 2048;

/// Supported LLM providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelProvider {
    #[serde(rename = "openai")]
    OpenAi,
    Anthropic,
    Google,
}

impl ModelProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelProvider::OpenAi => "openai",
            ModelProvider::Anthropic => "anthropic",
            ModelProvider::Google => "google",
        }
    }
}

impl FromStr for ModelProvider {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(ModelProvider::OpenAi),
            "anthropic" => Ok(ModelProvider::Anthropic),
            "google" | "gemini" => Ok(ModelProvider::Google),
            other => Err(ConfigError::UnknownProvider(other.to_string())),
        }
    }
}

impl std::fmt::Display for ModelProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything that identifies the model a session talks to.
///
/// Changing any field of this value requires a full session rebuild.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelBackendConfig {
    pub provider: ModelProvider,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Override of the provider's API endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

impl ModelBackendConfig {
    pub fn new(provider: ModelProvider, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            base_url: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Parse `provider:model` (e.g. `anthropic:claude-sonnet-4-5`).
    pub fn parse_spec(spec: &str) -> Result<Self, ConfigError> {
        let (provider, model) = spec
            .split_once(':')
            .ok_or_else(|| ConfigError::UnknownProvider(spec.to_string()))?;
        Ok(Self::new(provider.parse()?, model.trim()))
    }
}

impl std::fmt::Display for ModelBackendConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.provider, self.model)
    }
}
