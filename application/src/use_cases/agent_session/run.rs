//! The run loop: drives the model backend and tools for one submitted message.
//!
//! ```text
//! next_turn ─┬─ text only ──────────────▶ FinalAnswer
//!            └─ tool calls ─▶ Reasoning? ─▶ ToolCallStarted × n
//!                                         ─▶ ToolCallFinished × n (issue order)
//!                                         ─▶ next_turn ...
//! ```
//!
//! Tool calls of one turn execute concurrently as separate tasks; their
//! `ToolCallFinished` events are emitted in the order the model issued the
//! calls, buffering results that complete early.

use super::AgentSession;
use crate::ports::model_backend::TurnRequest;
use crate::use_cases::resolve_tools::Toolset;
use futures::StreamExt;
use futures::stream::FuturesOrdered;
use reagent_domain::{
    AgentEvent, CallId, ErrorKind, Message, QualifiedName, ToolCall, ToolCallOutcome,
    ToolInvocationError,
};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// How a run ended.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum RunEnd {
    Answer(String),
    Cancelled,
    /// Recoverable failure; the session returns to idle.
    Failed { kind: ErrorKind, message: String },
    /// Unrecoverable failure; the session closes.
    Fatal { message: String },
}

impl RunEnd {
    pub(crate) fn label(&self) -> &'static str {
        match self {
            RunEnd::Answer(_) => "answer",
            RunEnd::Cancelled => "cancelled",
            RunEnd::Failed { .. } => "failed",
            RunEnd::Fatal { .. } => "fatal",
        }
    }

    fn into_event(self) -> AgentEvent {
        match self {
            RunEnd::Answer(text) => AgentEvent::final_answer(text),
            RunEnd::Cancelled => AgentEvent::cancelled(),
            RunEnd::Failed { kind, message } => AgentEvent::error(kind, message),
            RunEnd::Fatal { message } => AgentEvent::error(ErrorKind::SessionError, message),
        }
    }
}

pub(crate) struct RunLoop {
    pub(crate) session: Arc<AgentSession>,
    pub(crate) toolset: Arc<Toolset>,
    pub(crate) history: Vec<Message>,
    pub(crate) tx: mpsc::Sender<AgentEvent>,
    pub(crate) cancel: CancellationToken,
    detached: bool,
}

impl RunLoop {
    pub(crate) fn new(
        session: Arc<AgentSession>,
        toolset: Arc<Toolset>,
        history: Vec<Message>,
        tx: mpsc::Sender<AgentEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            session,
            toolset,
            history,
            tx,
            cancel,
            detached: false,
        }
    }

    pub(crate) async fn execute(mut self, user_text: String) {
        let mut transcript = vec![Message::user(user_text)];
        let end = self.drive(&mut transcript).await;
        info!(
            session = %self.session.id(),
            outcome = end.label(),
            "Run finished"
        );

        // The session must be idle (or closed) before the client sees the
        // terminal event, so an immediate follow-up submit is accepted.
        self.session.finish_run(&end, transcript).await;
        self.emit(end.into_event()).await;
    }

    async fn drive(&mut self, transcript: &mut Vec<Message>) -> RunEnd {
        let specs = self.toolset.specs();
        let system_prompt = self
            .session
            .params()
            .render_system_prompt(&self.toolset.tool_names());
        let max_tool_turns = self.session.params().max_tool_turns;
        let mut tool_turns = 0usize;

        loop {
            if self.cancel.is_cancelled() {
                return RunEnd::Cancelled;
            }

            let mut messages = self.history.clone();
            messages.extend(transcript.iter().cloned());
            let request = TurnRequest {
                system_prompt: Some(system_prompt.clone()),
                messages,
                tools: specs.clone(),
            };

            let response = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return RunEnd::Cancelled,
                r = self.session.backend().next_turn(request) => r,
            };

            let response = match response {
                Ok(r) => r,
                Err(e) if e.is_unrecoverable() => {
                    warn!(session = %self.session.id(), error = %e, "Model backend failed permanently");
                    return RunEnd::Fatal {
                        message: e.to_string(),
                    };
                }
                Err(e) => {
                    warn!(session = %self.session.id(), error = %e, "Model backend turn failed");
                    return RunEnd::Failed {
                        kind: e.kind(),
                        message: e.to_string(),
                    };
                }
            };

            let text = response.text_content();
            let calls = unique_call_ids(response.tool_calls());
            if calls.is_empty() {
                transcript.push(Message::assistant(text.clone()));
                return RunEnd::Answer(text);
            }

            tool_turns += 1;
            if tool_turns > max_tool_turns {
                return RunEnd::Failed {
                    kind: ErrorKind::TurnLimit,
                    message: format!("model requested tools for more than {} turns", max_tool_turns),
                };
            }

            if !text.trim().is_empty() {
                self.emit(AgentEvent::reasoning(text.clone())).await;
            }
            transcript.push(Message::assistant_with_calls(text, calls.clone()));

            // No new tool calls once cancellation was requested.
            if self.cancel.is_cancelled() {
                return RunEnd::Cancelled;
            }

            let results = self.run_tool_calls(calls).await;
            transcript.extend(results);
        }
    }

    async fn run_tool_calls(&mut self, calls: Vec<ToolCall>) -> Vec<Message> {
        let mut pending = FuturesOrdered::new();

        for call in calls {
            let handle = self.toolset.get(&call.name).cloned();
            let qualified_name = match &handle {
                Some(h) => h.qualified_name().clone(),
                None => QualifiedName::parse(&call.name)
                    .unwrap_or_else(|| QualifiedName::new("unknown", &call.name)),
            };
            let started = AgentEvent::ToolCallStarted {
                qualified_name,
                args: call.arguments.clone(),
                call_id: call.id.clone(),
            };
            // After a cancel only the calls already issued are awaited.
            if !self.announce(started).await {
                debug!(session = %self.session.id(), call_id = %call.id, "Cancelled, not issuing call");
                break;
            }
            debug!(call_id = %call.id, tool = %call.name, "Issued tool call");

            let ToolCall {
                id,
                name,
                arguments,
            } = call;
            let tool_name = name.clone();
            let task = tokio::spawn(async move {
                match handle {
                    Some(h) => h.invoke(arguments).await,
                    None => Err(ToolInvocationError::unknown_tool(&name)),
                }
            });
            pending.push_back(async move {
                let result = task.await.unwrap_or_else(|e| {
                    Err(ToolInvocationError::remote(format!("tool task failed: {}", e)))
                });
                (id, tool_name, ToolCallOutcome::from(result))
            });
        }

        let mut messages = Vec::new();
        while let Some((call_id, name, outcome)) = pending.next().await {
            messages.push(Message::tool_result(
                call_id.clone(),
                name,
                outcome.as_model_text(),
                !outcome.is_success(),
            ));
            self.emit(AgentEvent::ToolCallFinished { call_id, outcome }).await;
        }
        messages
    }

    /// Deliver an event that starts work, unless the run is cancelled first.
    /// Returns whether it was delivered.
    async fn announce(&mut self, event: AgentEvent) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        let logged = event.clone();
        let sent = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            sent = self.tx.send(event) => Some(sent.is_ok()),
        };
        match sent {
            Some(true) => {
                self.session.log_event(&logged);
                true
            }
            Some(false) => {
                debug!(session = %self.session.id(), "Event subscriber gone, cancelling run");
                self.detached = true;
                self.cancel.cancel();
                false
            }
            None => false,
        }
    }

    /// Deliver one event. A vanished subscriber cancels the run; the run then
    /// winds down without delivering anything further.
    async fn emit(&mut self, event: AgentEvent) {
        self.session.log_event(&event);
        if self.detached {
            return;
        }
        if self.tx.send(event).await.is_err() {
            debug!(session = %self.session.id(), "Event subscriber gone, cancelling run");
            self.detached = true;
            self.cancel.cancel();
        }
    }
}

/// Give every call of one turn a distinct id, so each `ToolCallStarted` has
/// exactly one `ToolCallFinished`. Repeats get a fresh id.
fn unique_call_ids(mut calls: Vec<ToolCall>) -> Vec<ToolCall> {
    let mut seen = HashSet::new();
    for call in &mut calls {
        if !seen.insert(call.id.clone()) {
            let fresh = CallId::generate();
            warn!(call_id = %call.id, replacement = %fresh, "Model repeated a tool call id");
            call.id = fresh.clone();
            seen.insert(fresh);
        }
    }
    calls
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn repeated_call_ids_are_replaced() {
        let calls = vec![
            ToolCall::new(CallId::new("c1"), "flash-calc/pt_flash", json!({})),
            ToolCall::new(CallId::new("c1"), "eos-models/pr_z", json!({})),
            ToolCall::new(CallId::new("c2"), "eos-models/pr_z", json!({})),
        ];

        let calls = unique_call_ids(calls);

        assert_eq!(calls[0].id, CallId::new("c1"));
        assert_ne!(calls[1].id, CallId::new("c1"));
        assert_eq!(calls[2].id, CallId::new("c2"));
        assert_eq!(calls[1].name, "eos-models/pr_z");
    }
}
