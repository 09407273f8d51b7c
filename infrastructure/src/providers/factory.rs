//! Builds model backends from [`ModelBackendConfig`].

use super::anthropic::AnthropicBackend;
use super::openai::OpenAiBackend;
use reagent_application::{BackendError, BackendFactory, ModelBackend};
use reagent_domain::{ModelBackendConfig, ModelProvider};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

type KeyLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Default API key variables, tried in order.
pub fn default_key_vars(provider: ModelProvider) -> &'static [&'static str] {
    match provider {
        ModelProvider::OpenAi => &["OPENAI_API_KEY"],
        ModelProvider::Google => &["GEMINI_API_KEY", "GOOGLE_API_KEY"],
        ModelProvider::Anthropic => &["ANTHROPIC_API_KEY"],
    }
}

#[derive(Clone)]
pub struct HttpBackendFactory {
    client: reqwest::Client,
    key_overrides: HashMap<ModelProvider, String>,
    lookup: KeyLookup,
}

impl HttpBackendFactory {
    /// Keys are read from the process environment.
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .unwrap_or_default();
        Self {
            client,
            key_overrides: HashMap::new(),
            lookup: Arc::new(|name| std::env::var(name).ok()),
        }
    }

    /// Read `provider`'s key from `var` instead of the default variables.
    pub fn with_api_key_env(mut self, provider: ModelProvider, var: impl Into<String>) -> Self {
        self.key_overrides.insert(provider, var.into());
        self
    }

    /// Replace the environment lookup.
    pub fn with_key_lookup(
        mut self,
        lookup: impl Fn(&str) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        self.lookup = Arc::new(lookup);
        self
    }

    fn api_key(&self, provider: ModelProvider) -> Result<String, BackendError> {
        let vars: Vec<&str> = match self.key_overrides.get(&provider) {
            Some(var) => vec![var.as_str()],
            None => default_key_vars(provider).to_vec(),
        };
        vars.iter()
            .find_map(|var| (self.lookup)(var).filter(|k| !k.trim().is_empty()))
            .ok_or_else(|| {
                BackendError::Authentication(format!(
                    "no API key for {} (set {})",
                    provider,
                    vars.join(" or ")
                ))
            })
    }
}

impl Default for HttpBackendFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for HttpBackendFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpBackendFactory")
            .field("key_overrides", &self.key_overrides)
            .finish()
    }
}

impl BackendFactory for HttpBackendFactory {
    fn create(&self, config: &ModelBackendConfig) -> Result<Arc<dyn ModelBackend>, BackendError> {
        let api_key = self.api_key(config.provider)?;
        debug!(backend = %config, "Creating model backend");
        Ok(match config.provider {
            ModelProvider::OpenAi | ModelProvider::Google => Arc::new(OpenAiBackend::new(
                self.client.clone(),
                config.clone(),
                api_key,
            )),
            ModelProvider::Anthropic => Arc::new(AnthropicBackend::new(
                self.client.clone(),
                config.clone(),
                api_key,
            )),
        })
    }
}
