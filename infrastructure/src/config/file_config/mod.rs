//! Raw TOML configuration data types
//!
//! These structs mirror the config file one-to-one. Conversion into domain
//! and application types happens through the `to_*` methods, so that a bad
//! value is reported with its TOML location.

mod agent;
mod logging;
mod model;
mod runtime;
mod tools;

pub use agent::FileAgentConfig;
pub use logging::FileLoggingConfig;
pub use model::FileModelConfig;
pub use runtime::FileRuntimeConfig;
pub use tools::{FileToolsConfig, to_snapshot};

use reagent_domain::{ModelProvider, ToolRegistrySnapshot};
use serde::{Deserialize, Serialize};

/// Complete file configuration (raw TOML structure)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub model: FileModelConfig,
    pub agent: FileAgentConfig,
    pub tools: FileToolsConfig,
    pub runtime: FileRuntimeConfig,
    pub logging: FileLoggingConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// The value is ignored or replaced by a default.
    Warning,
    /// The configuration cannot be used.
    Error,
}

/// One problem found by [`FileConfig::validate`].
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigIssue {
    pub severity: Severity,
    /// Dotted TOML path, e.g. `runtime.tool_timeout_secs`.
    pub field: String,
    pub message: String,
}

impl ConfigIssue {
    fn warning(field: &str, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            field: field.to_string(),
            message: message.into(),
        }
    }

    fn error(field: &str, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            field: field.to_string(),
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl std::fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl FileConfig {
    /// Validate the entire configuration, returning all detected issues.
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();

        if let Err(e) = self.model.provider.parse::<ModelProvider>() {
            issues.push(ConfigIssue::error("model.provider", e.to_string()));
        }
        if self.model.name.trim().is_empty() {
            issues.push(ConfigIssue::error("model.name", "model name cannot be empty"));
        }
        if !(0.0..=2.0).contains(&self.model.temperature) {
            issues.push(ConfigIssue::warning(
                "model.temperature",
                format!("{} is outside 0.0..=2.0", self.model.temperature),
            ));
        }
        if self.model.max_tokens == 0 {
            issues.push(ConfigIssue::error("model.max_tokens", "must be greater than 0"));
        }

        if self.runtime.tool_timeout_secs == 0 {
            issues.push(ConfigIssue::warning(
                "runtime.tool_timeout_secs",
                "0 is not a usable timeout, using 1s",
            ));
        }
        if self.runtime.connect_timeout_secs == 0 {
            issues.push(ConfigIssue::warning(
                "runtime.connect_timeout_secs",
                "0 is not a usable timeout, using 1s",
            ));
        }
        if self.runtime.event_buffer == 0 {
            issues.push(ConfigIssue::warning("runtime.event_buffer", "0 is raised to 1"));
        }

        if let Err(e) = self.tool_snapshot() {
            issues.push(ConfigIssue::error("tools", e.to_string()));
        }

        issues
    }

    /// The configured tool sources as a snapshot.
    pub fn tool_snapshot(&self) -> Result<ToolRegistrySnapshot, reagent_domain::ConfigError> {
        to_snapshot(&self.tools)
    }
}
