//! Agent events and their client-boundary encoding.
//!
//! A run produces a strictly ordered sequence of [`AgentEvent`]s that ends
//! with exactly one terminal event (`FinalAnswer` or `SessionError`). The
//! multiplexer stamps each with a sequence number and hands an
//! [`EventRecord`] to the client transport.

use crate::core::error::ErrorKind;
use crate::core::ids::CallId;
use crate::tool::entities::QualifiedName;
use crate::tool::value_objects::{ToolInvocationError, ToolOutput};
use serde::{Deserialize, Serialize};

/// Result of one tool call as reported to the client.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolCallOutcome {
    Success(ToolOutput),
    Failure(ToolInvocationError),
}

impl ToolCallOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ToolCallOutcome::Success(_))
    }

    /// Text fed back to the model as the tool result.
    pub fn as_model_text(&self) -> String {
        match self {
            ToolCallOutcome::Success(output) => output.text.clone(),
            ToolCallOutcome::Failure(err) => format!("Error: {}", err),
        }
    }
}

impl From<Result<ToolOutput, ToolInvocationError>> for ToolCallOutcome {
    fn from(result: Result<ToolOutput, ToolInvocationError>) -> Self {
        match result {
            Ok(output) => ToolCallOutcome::Success(output),
            Err(err) => ToolCallOutcome::Failure(err),
        }
    }
}

/// One unit of output produced during a run.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    /// Intermediate model text accompanying tool calls.
    Reasoning { text: String },
    ToolCallStarted {
        qualified_name: QualifiedName,
        args: serde_json::Value,
        call_id: CallId,
    },
    ToolCallFinished {
        call_id: CallId,
        outcome: ToolCallOutcome,
    },
    FinalAnswer { text: String },
    SessionError { kind: ErrorKind, message: String },
}

impl AgentEvent {
    pub fn reasoning(text: impl Into<String>) -> Self {
        AgentEvent::Reasoning { text: text.into() }
    }

    pub fn final_answer(text: impl Into<String>) -> Self {
        AgentEvent::FinalAnswer { text: text.into() }
    }

    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        AgentEvent::SessionError {
            kind,
            message: message.into(),
        }
    }

    pub fn cancelled() -> Self {
        Self::error(ErrorKind::Cancelled, "run cancelled by client")
    }

    /// Boundary type tag.
    pub fn type_tag(&self) -> &'static str {
        match self {
            AgentEvent::Reasoning { .. } => "reasoning",
            AgentEvent::ToolCallStarted { .. } => "tool_call_started",
            AgentEvent::ToolCallFinished { .. } => "tool_call_finished",
            AgentEvent::FinalAnswer { .. } => "final_answer",
            AgentEvent::SessionError { .. } => "session_error",
        }
    }

    /// True for the event that ends a run.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AgentEvent::FinalAnswer { .. } | AgentEvent::SessionError { .. }
        )
    }

    pub fn call_id(&self) -> Option<&CallId> {
        match self {
            AgentEvent::ToolCallStarted { call_id, .. }
            | AgentEvent::ToolCallFinished { call_id, .. } => Some(call_id),
            _ => None,
        }
    }

    /// Boundary payload of this event, without the type tag.
    pub fn payload(&self) -> serde_json::Value {
        match self {
            AgentEvent::Reasoning { text } | AgentEvent::FinalAnswer { text } => {
                serde_json::json!({ "text": text })
            }
            AgentEvent::ToolCallStarted {
                qualified_name,
                args,
                ..
            } => serde_json::json!({
                "name": qualified_name,
                "source": qualified_name.source(),
                "operation": qualified_name.operation(),
                "args": args,
            }),
            AgentEvent::ToolCallFinished { outcome, .. } => match outcome {
                ToolCallOutcome::Success(output) => serde_json::json!({
                    "status": "ok",
                    "output": output,
                }),
                ToolCallOutcome::Failure(err) => serde_json::json!({
                    "status": "error",
                    "errorKind": ErrorKind::ToolInvocationError,
                    "error": err,
                }),
            },
            AgentEvent::SessionError { kind, message } => serde_json::json!({
                "kind": kind,
                "message": message,
            }),
        }
    }
}

/// Boundary encoding of one event: `{type, payload, callId?, seq}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    #[serde(rename = "type")]
    pub event_type: String,
    pub payload: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,
    /// Position in the connection's event sequence, starting at 0.
    pub seq: u64,
}

impl EventRecord {
    pub fn from_event(seq: u64, event: &AgentEvent) -> Self {
        Self {
            event_type: event.type_tag().to_string(),
            payload: event.payload(),
            call_id: event.call_id().map(|c| c.to_string()),
            seq,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.event_type == "final_answer" || self.event_type == "session_error"
    }
}
