//! Application layer for reagent
//!
//! This crate contains use cases, port definitions, and application configuration.
//! It depends only on the domain layer.

pub mod config;
pub mod ports;
pub mod use_cases;

// Re-export commonly used types
pub use config::RuntimeParams;
pub use ports::{
    conversation_logger::{ConversationEvent, ConversationLogger, NoConversationLogger},
    event_sink::{ChannelEventSink, EventSink, SinkClosed},
    model_backend::{BackendError, BackendFactory, ModelBackend, TurnRequest},
    tool_connector::{ConnectError, ConnectorFactory, ToolConnector},
};
pub use use_cases::agent_session::{AgentSession, EventStream, InvalidStateError};
pub use use_cases::multiplexer::{EventMultiplexer, RunSummary};
pub use use_cases::resolve_tools::{
    AttachedSource, Reconciliation, Resolution, ToolHandle, ToolResolver, Toolset,
};
pub use use_cases::supervisor::{
    SessionReply, SessionRequest, SessionStarted, SessionSupervisor, SupervisorError,
    ToolSelection,
};
