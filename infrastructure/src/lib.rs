//! Infrastructure layer for reagent
//!
//! Adapters that implement the ports defined in the application layer:
//! MCP tool connectors, HTTP model backends, the JSONL transcript logger and
//! configuration file loading.

pub mod config;
pub mod logging;
pub mod mcp;
pub mod providers;

// Re-export commonly used types
pub use config::{
    ConfigIssue, ConfigLoader, FileAgentConfig, FileConfig, FileLoggingConfig, FileModelConfig,
    FileRuntimeConfig, FileToolsConfig, Severity,
};
pub use logging::JsonlConversationLogger;
pub use mcp::{McpConnector, McpConnectorFactory, McpError};
pub use providers::{AnthropicBackend, HttpBackendFactory, OpenAiBackend};
