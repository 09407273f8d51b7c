//! Domain layer for reagent
//!
//! Pure types shared by every other layer: tool sources and versioned
//! registry snapshots, toolset diffs, agent events and their boundary
//! encoding, session status, model backend selection, conversation memory,
//! and the stable error taxonomy. No I/O happens here.

pub mod core;
pub mod event;
pub mod session;
pub mod tool;
pub mod util;

// Re-export commonly used types
pub use crate::core::{
    error::{ConfigError, ErrorKind},
    ids::{CallId, ConnectionId, SessionId},
};
pub use event::{AgentEvent, EventRecord, ToolCallOutcome};
pub use session::{
    memory::{ConversationMemory, Turn},
    message::Message,
    model_backend::{ModelBackendConfig, ModelProvider},
    response::{ContentBlock, LlmResponse, StopReason, Usage},
    status::SessionStatus,
};
pub use tool::{
    diff::ToolsetDiff,
    entities::{QualifiedName, ToolCall, ToolDefinition, ToolSpec},
    registry::{ToolRegistrySnapshot, ToolSourceInput, ToolSourcesDocument},
    source::{Partition, SourceDescriptor, SourceEntry, SourceTransport, ToolSourceConfig},
    value_objects::{InvocationErrorKind, ToolInvocationError, ToolOutput, ToolUnavailable},
};
