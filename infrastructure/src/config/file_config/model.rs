//! Model configuration from TOML (`[model]` section)

use reagent_domain::session::model_backend::{DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE};
use reagent_domain::{ConfigError, ModelBackendConfig, ModelProvider};
use serde::{Deserialize, Serialize};

/// Raw model configuration from TOML
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileModelConfig {
    /// `openai`, `anthropic` or `google`
    pub provider: String,
    /// Provider model name (e.g. "gpt-4o-mini")
    pub name: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Override of the provider endpoint (proxies, local gateways)
    pub base_url: Option<String>,
    /// Environment variable holding the API key, if not the provider default
    pub api_key_env: Option<String>,
}

impl Default for FileModelConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            name: "gpt-4o-mini".to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            base_url: None,
            api_key_env: None,
        }
    }
}

impl FileModelConfig {
    pub fn to_backend_config(&self) -> Result<ModelBackendConfig, ConfigError> {
        let provider: ModelProvider = self.provider.parse()?;
        let mut config = ModelBackendConfig::new(provider, self.name.trim())
            .with_temperature(self.temperature)
            .with_max_tokens(self.max_tokens);
        if let Some(url) = &self.base_url {
            config = config.with_base_url(url.clone());
        }
        Ok(config)
    }
}
