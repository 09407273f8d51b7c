//! Tool connector port
//!
//! Defines the uniform capability every tool source exposes, regardless of
//! whether it is a remote HTTP endpoint or a spawned local process.

use async_trait::async_trait;
use reagent_domain::{ErrorKind, ToolDefinition, ToolInvocationError, ToolOutput, ToolSourceConfig};
use std::sync::Arc;
use thiserror::Error;

/// Errors raised while attaching a tool source.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectError {
    #[error("cannot reach '{source_name}': {message}")]
    Connection {
        source_name: String,
        message: String,
    },

    #[error("cannot start '{source_name}': {message}")]
    Spawn {
        source_name: String,
        message: String,
    },
}

impl ConnectError {
    pub fn connection(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        ConnectError::Connection {
            source_name: source_name.into(),
            message: message.into(),
        }
    }

    pub fn spawn(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        ConnectError::Spawn {
            source_name: source_name.into(),
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ConnectError::Connection { .. } => ErrorKind::ConnectionError,
            ConnectError::Spawn { .. } => ErrorKind::SpawnError,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ConnectError::Connection { message, .. } | ConnectError::Spawn { message, .. } => {
                message
            }
        }
    }
}

/// A live connection to one tool source.
///
/// A connector is owned by exactly one session. Implementations must keep
/// calls independent: a timed-out or failed `invoke` may not leave data
/// behind that a later call would read.
#[async_trait]
pub trait ToolConnector: Send + Sync {
    /// Name of the source this connector is attached to.
    fn source_name(&self) -> &str;

    /// Operations the source currently offers.
    async fn list_operations(&self) -> Result<Vec<ToolDefinition>, ToolInvocationError>;

    /// Invoke one operation with JSON arguments.
    async fn invoke(
        &self,
        operation: &str,
        args: serde_json::Value,
    ) -> Result<ToolOutput, ToolInvocationError>;

    /// Whether the underlying channel is still usable.
    fn is_alive(&self) -> bool;

    /// Release the connection. Idempotent.
    async fn close(&self);
}

/// Creates connectors from validated source configs.
#[async_trait]
pub trait ConnectorFactory: Send + Sync {
    /// Attach to a source. Has no effect on any registry.
    async fn connect(
        &self,
        config: &ToolSourceConfig,
    ) -> Result<Arc<dyn ToolConnector>, ConnectError>;
}
