//! Tool domain entities: operations offered by sources and calls to them

use crate::core::ids::CallId;
use serde::{Deserialize, Serialize};

/// Separator between source name and operation name in a qualified name.
pub const QUALIFIED_SEPARATOR: char = '/';

/// Toolset key `source/operation`.
///
/// Source names never contain `/` (validated on load), so the first
/// separator always splits source from operation even when the operation
/// name itself contains slashes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QualifiedName(String);

impl QualifiedName {
    pub fn new(source: &str, operation: &str) -> Self {
        Self(format!("{}{}{}", source, QUALIFIED_SEPARATOR, operation))
    }

    /// Parse `source/operation`; `None` if either half is missing.
    pub fn parse(s: &str) -> Option<Self> {
        let (source, operation) = s.split_once(QUALIFIED_SEPARATOR)?;
        if source.is_empty() || operation.is_empty() {
            return None;
        }
        Some(Self(s.to_string()))
    }

    pub fn source(&self) -> &str {
        self.0
            .split_once(QUALIFIED_SEPARATOR)
            .map(|(s, _)| s)
            .unwrap_or(&self.0)
    }

    pub fn operation(&self) -> &str {
        self.0
            .split_once(QUALIFIED_SEPARATOR)
            .map(|(_, op)| op)
            .unwrap_or("")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One operation a tool source advertises.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Operation name as the source knows it (unqualified).
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// JSON Schema describing accepted arguments.
    pub input_schema: serde_json::Value,
}

impl ToolDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema: serde_json::json!({"type": "object", "properties": {}}),
        }
    }

    pub fn with_schema(mut self, schema: serde_json::Value) -> Self {
        self.input_schema = schema;
        self
    }
}

/// A qualified operation as presented to a model backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: QualifiedName,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: CallId,
    /// Qualified name the model asked for. May name a tool that does not exist.
    pub name: String,
    /// Arguments as a JSON object.
    pub arguments: serde_json::Value,
}

impl ToolCall {
    pub fn new(id: CallId, name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            id,
            name: name.into(),
            arguments,
        }
    }
}
