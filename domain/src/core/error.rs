//! Domain error types and the stable error taxonomy exposed to clients

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stable classification of every failure that can reach a client.
///
/// The serialized form (`snake_case`) is part of the boundary contract:
/// clients switch on these tags, so variants are never renamed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed or conflicting tool-source definitions.
    ConfigError,
    /// A remote tool source could not be reached.
    ConnectionError,
    /// A local tool process could not be started.
    SpawnError,
    /// A single tool call failed (timeout, remote error, bad response).
    ToolInvocationError,
    /// The caller violated the session state machine.
    InvalidState,
    /// A queued reconfiguration was superseded by a newer one.
    Busy,
    /// The run was cancelled by the client.
    Cancelled,
    /// Unrecoverable session failure; the session is closed.
    SessionError,
    /// Recoverable model backend failure for one run.
    BackendError,
    /// The model kept requesting tools past the configured turn limit.
    TurnLimit,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ConfigError => "config_error",
            ErrorKind::ConnectionError => "connection_error",
            ErrorKind::SpawnError => "spawn_error",
            ErrorKind::ToolInvocationError => "tool_invocation_error",
            ErrorKind::InvalidState => "invalid_state",
            ErrorKind::Busy => "busy",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::SessionError => "session_error",
            ErrorKind::BackendError => "backend_error",
            ErrorKind::TurnLimit => "turn_limit",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised while loading or merging tool-source definitions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("duplicate tool source name: {0}")]
    DuplicateName(String),

    #[error("tool source '{name}': unknown transport '{transport}'")]
    UnknownTransport { name: String, transport: String },

    #[error("tool source '{name}': transport '{transport}' is not allowed in the {partition} collection")]
    TransportMismatch {
        name: String,
        transport: String,
        partition: &'static str,
    },

    #[error("tool source '{name}': missing required field '{field}'")]
    MissingField { name: String, field: &'static str },

    #[error("tool source name must not be empty")]
    EmptyName,

    #[error("tool source name '{0}' must not contain '/'")]
    InvalidName(String),

    #[error("unknown model provider '{0}' (expected openai, google or anthropic)")]
    UnknownProvider(String),
}

impl ConfigError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::ConfigError
    }
}
