//! Port for structured conversation logging.
//!
//! Records session lifecycle, toolset changes and every agent event to a
//! machine-readable transcript. This is separate from `tracing`: tracing
//! carries diagnostics for operators, the transcript carries what the agent
//! actually did.

use serde_json::Value;

/// A structured transcript event.
pub struct ConversationEvent {
    /// Event type identifier (e.g. "session_started", "agent_event").
    pub event_type: &'static str,
    /// Event-specific fields.
    pub payload: Value,
}

impl ConversationEvent {
    pub fn new(event_type: &'static str, payload: Value) -> Self {
        Self {
            event_type,
            payload,
        }
    }
}

/// Sink for transcript events.
///
/// `log` is synchronous and infallible; write failures are swallowed so a
/// full disk never interrupts a run.
pub trait ConversationLogger: Send + Sync {
    fn log(&self, event: ConversationEvent);
}

/// No-op implementation for tests and when the transcript is disabled.
pub struct NoConversationLogger;

impl ConversationLogger for NoConversationLogger {
    fn log(&self, _event: ConversationEvent) {}
}
