//! Tool domain value objects: call results, call errors and resolution warnings

use crate::core::error::ErrorKind;
use serde::{Deserialize, Serialize};

/// Why a single tool call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvocationErrorKind {
    /// The call did not complete within the tool timeout.
    Timeout,
    /// The source reported an error (JSON-RPC error or `isError` result).
    RemoteError,
    /// The source answered with something that could not be parsed.
    MalformedResponse,
    /// The model asked for an operation the toolset does not contain.
    UnknownTool,
}

/// Failure of one tool call. Recoverable: the model sees it as the call result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{kind:?}: {message}")]
pub struct ToolInvocationError {
    pub kind: InvocationErrorKind,
    pub message: String,
}

impl ToolInvocationError {
    pub fn new(kind: InvocationErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn timeout(operation: &str, secs: u64) -> Self {
        Self::new(
            InvocationErrorKind::Timeout,
            format!("{} did not respond within {}s", operation, secs),
        )
    }

    pub fn remote(message: impl Into<String>) -> Self {
        Self::new(InvocationErrorKind::RemoteError, message)
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(InvocationErrorKind::MalformedResponse, message)
    }

    pub fn unknown_tool(name: &str) -> Self {
        Self::new(
            InvocationErrorKind::UnknownTool,
            format!("no tool named '{}' in the current toolset", name),
        )
    }

    pub fn error_kind(&self) -> ErrorKind {
        ErrorKind::ToolInvocationError
    }
}

/// Successful output of a tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutput {
    /// Text content, joined from the source's content blocks.
    pub text: String,
    /// Structured content when the source provides it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured: Option<serde_json::Value>,
}

impl ToolOutput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            structured: None,
        }
    }

    pub fn with_structured(mut self, value: serde_json::Value) -> Self {
        self.structured = Some(value);
        self
    }
}

/// A source that could not be attached during resolution.
///
/// Non-fatal: the rest of the toolset resolves normally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolUnavailable {
    pub source: String,
    /// `connection_error` or `spawn_error`.
    pub kind: ErrorKind,
    pub reason: String,
}

impl std::fmt::Display for ToolUnavailable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} unavailable ({}): {}", self.source, self.kind, self.reason)
    }
}
