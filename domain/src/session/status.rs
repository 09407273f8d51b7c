//! Agent session lifecycle states

use serde::{Deserialize, Serialize};

/// Where a session is in its lifecycle.
///
/// ```text
///          submit            run ends
///   Idle ─────────▶ Running ─────────▶ Idle
///   Idle ─────────▶ Rebuilding ──────▶ Idle
///        reconfigure          swapped
///   any ─────────▶ Closed   (terminal)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Idle,
    Running,
    Rebuilding,
    Closed,
}

impl SessionStatus {
    pub fn is_busy(&self) -> bool {
        matches!(self, SessionStatus::Running | SessionStatus::Rebuilding)
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, SessionStatus::Closed)
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SessionStatus::Idle => "idle",
            SessionStatus::Running => "running",
            SessionStatus::Rebuilding => "rebuilding",
            SessionStatus::Closed => "closed",
        };
        f.write_str(s)
    }
}
