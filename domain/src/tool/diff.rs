//! Difference between two resolved toolsets

use super::entities::QualifiedName;
use super::value_objects::ToolUnavailable;
use serde::{Deserialize, Serialize};

/// Result of a reconfiguration, expressed at source and at tool granularity.
///
/// Source-level lists are sorted by name. A source appears in at most one of
/// `added`, `removed`, `unchanged` and `reconnected`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolsetDiff {
    /// Sources newly attached.
    pub added: Vec<String>,
    /// Sources detached (disabled, deleted, or failed to reconnect).
    pub removed: Vec<String>,
    /// Sources whose live connector was kept as-is.
    pub unchanged: Vec<String>,
    /// Sources whose connection settings changed and were re-attached.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reconnected: Vec<String>,
    /// Qualified operations that became available.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub added_tools: Vec<QualifiedName>,
    /// Qualified operations that are no longer available.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub removed_tools: Vec<QualifiedName>,
    /// Enabled sources that could not be attached.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<ToolUnavailable>,
}

impl ToolsetDiff {
    /// True when no source or tool changed.
    pub fn is_noop(&self) -> bool {
        self.added.is_empty()
            && self.removed.is_empty()
            && self.reconnected.is_empty()
            && self.added_tools.is_empty()
            && self.removed_tools.is_empty()
    }

    /// Sort every list so diffs compare deterministically.
    pub fn normalize(&mut self) {
        self.added.sort();
        self.removed.sort();
        self.unchanged.sort();
        self.reconnected.sort();
        self.added_tools.sort();
        self.removed_tools.sort();
        self.warnings.sort_by(|a, b| a.source.cmp(&b.source));
    }
}

impl std::fmt::Display for ToolsetDiff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "+{} -{} ={} ~{}",
            self.added.len(),
            self.removed.len(),
            self.unchanged.len(),
            self.reconnected.len()
        )
    }
}
