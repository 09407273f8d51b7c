//! Agent session: one model backend, one toolset, one conversation.
//!
//! A session owns its toolset (and therefore its connectors) exclusively. It
//! runs one message at a time; [`AgentSession::reconfigure`] swaps the toolset
//! between runs while conversation memory and session id stay put.

mod run;
mod stream;

pub use stream::EventStream;

use crate::config::RuntimeParams;
use crate::ports::conversation_logger::{ConversationEvent, ConversationLogger};
use crate::ports::model_backend::ModelBackend;
use crate::use_cases::resolve_tools::{close_connectors, Reconciliation, ToolResolver, Toolset};
use reagent_domain::{
    AgentEvent, ConversationMemory, ErrorKind, Message, ModelBackendConfig, SessionId,
    SessionStatus, ToolRegistrySnapshot, ToolsetDiff, Turn,
};
use run::{RunEnd, RunLoop};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// The operation is not allowed in the session's current state.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("session is {status}")]
pub struct InvalidStateError {
    pub status: SessionStatus,
}

impl InvalidStateError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::InvalidState
    }
}

struct SessionState {
    toolset: Arc<Toolset>,
    memory: ConversationMemory,
    memory_mode: bool,
    /// Cancellation handle of the active run.
    run: Option<CancellationToken>,
}

pub struct AgentSession {
    id: SessionId,
    backend: Arc<dyn ModelBackend>,
    resolver: ToolResolver,
    params: RuntimeParams,
    status: watch::Sender<SessionStatus>,
    state: Mutex<SessionState>,
    logger: Arc<dyn ConversationLogger>,
}

impl AgentSession {
    /// Create an idle session with an empty toolset. Attach tools with
    /// [`reconfigure`](Self::reconfigure).
    pub fn new(
        backend: Arc<dyn ModelBackend>,
        resolver: ToolResolver,
        params: RuntimeParams,
        memory_mode: bool,
        logger: Arc<dyn ConversationLogger>,
    ) -> Arc<Self> {
        let (status, _) = watch::channel(SessionStatus::Idle);
        let session = Arc::new(Self {
            id: SessionId::new(),
            backend,
            resolver,
            params,
            status,
            state: Mutex::new(SessionState {
                toolset: Arc::new(Toolset::empty()),
                memory: ConversationMemory::new(),
                memory_mode,
                run: None,
            }),
            logger,
        });

        info!(session = %session.id, model = %session.backend.config(), memory_mode, "Session started");
        session.logger.log(ConversationEvent::new(
            "session_started",
            serde_json::json!({
                "session_id": session.id.to_string(),
                "model": session.backend.config().to_string(),
                "memory_mode": memory_mode,
            }),
        ));
        session
    }

    // ==================== Accessors ====================

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn status(&self) -> SessionStatus {
        *self.status.borrow()
    }

    /// Watch status transitions.
    pub fn subscribe_status(&self) -> watch::Receiver<SessionStatus> {
        self.status.subscribe()
    }

    pub fn backend(&self) -> &Arc<dyn ModelBackend> {
        &self.backend
    }

    pub fn backend_config(&self) -> &ModelBackendConfig {
        self.backend.config()
    }

    pub fn params(&self) -> &RuntimeParams {
        &self.params
    }

    pub fn toolset(&self) -> Arc<Toolset> {
        Arc::clone(&self.lock_state().toolset)
    }

    pub fn memory(&self) -> ConversationMemory {
        self.lock_state().memory.clone()
    }

    pub fn memory_mode(&self) -> bool {
        self.lock_state().memory_mode
    }

    /// Toggle memory mode. Turning it off forgets nothing; remembered turns
    /// are simply not sent until it is turned back on.
    pub fn set_memory_mode(&self, enabled: bool) {
        self.lock_state().memory_mode = enabled;
    }

    /// Forget all remembered turns.
    pub fn clear_memory(&self) {
        self.lock_state().memory = ConversationMemory::new();
    }

    /// Cancel the active run, if any. Returns whether a run was signalled.
    pub fn cancel_run(&self) -> bool {
        match &self.lock_state().run {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    // ==================== Operations ====================

    /// Start a run for `text`.
    ///
    /// Fails without side effects unless the session is idle. The returned
    /// stream ends with `final_answer` or `session_error`; by the time that
    /// terminal event is delivered the session is idle again (or closed).
    pub fn submit(self: &Arc<Self>, text: impl Into<String>) -> Result<EventStream, InvalidStateError> {
        self.transition(SessionStatus::Idle, SessionStatus::Running)?;

        let cancel = CancellationToken::new();
        let (toolset, history) = {
            let mut state = self.lock_state();
            state.run = Some(cancel.clone());
            // A concurrent close may have slipped in after the transition.
            if self.status().is_closed() {
                cancel.cancel();
            }
            let history = if state.memory_mode {
                state.memory.history()
            } else {
                Vec::new()
            };
            (Arc::clone(&state.toolset), history)
        };

        let (tx, rx) = mpsc::channel(self.params.event_buffer);
        let run = RunLoop::new(Arc::clone(self), toolset, history, tx, cancel.clone());
        tokio::spawn(run.execute(text.into()));

        Ok(EventStream::new(rx, cancel))
    }

    /// Resolve `snapshot` against the current toolset and swap it in.
    ///
    /// Unchanged live connectors are kept, removed ones are closed after the
    /// swap. Memory and session id are untouched.
    pub async fn reconfigure(
        &self,
        snapshot: &ToolRegistrySnapshot,
    ) -> Result<ToolsetDiff, InvalidStateError> {
        self.transition(SessionStatus::Idle, SessionStatus::Rebuilding)?;
        let _restore = RestoreIdle(&self.status);

        let current = self.toolset();
        let Reconciliation {
            toolset,
            diff,
            retired,
        } = self.resolver.reconcile(&current, snapshot).await;

        let orphaned = {
            let mut state = self.lock_state();
            if self.status() == SessionStatus::Rebuilding {
                state.toolset = Arc::new(toolset);
                None
            } else {
                Some(toolset)
            }
        };
        if let Some(orphaned) = orphaned {
            debug!(session = %self.id, "Session closed during reconfiguration, dropping new toolset");
            orphaned.close_all().await;
            return Err(InvalidStateError {
                status: SessionStatus::Closed,
            });
        }
        close_connectors(retired).await;

        for warning in &diff.warnings {
            self.logger.log(ConversationEvent::new(
                "tool_unavailable",
                serde_json::json!({
                    "session_id": self.id.to_string(),
                    "source": warning.source,
                    "kind": warning.kind,
                    "reason": warning.reason,
                }),
            ));
        }
        info!(session = %self.id, version = snapshot.version(), diff = %diff, "Toolset reconfigured");
        self.logger.log(ConversationEvent::new(
            "toolset_reconfigured",
            serde_json::json!({
                "session_id": self.id.to_string(),
                "snapshot_version": snapshot.version(),
                "diff": diff,
            }),
        ));
        Ok(diff)
    }

    /// Close the session: cancel any run and release every connector.
    /// Idempotent.
    pub async fn close(&self) {
        if self.status.send_replace(SessionStatus::Closed).is_closed() {
            return;
        }
        let (toolset, run) = {
            let mut state = self.lock_state();
            (std::mem::take(&mut state.toolset), state.run.take())
        };
        if let Some(run) = run {
            run.cancel();
        }
        toolset.close_all().await;

        info!(session = %self.id, "Session closed");
        self.logger.log(ConversationEvent::new(
            "session_closed",
            serde_json::json!({ "session_id": self.id.to_string() }),
        ));
    }

    // ==================== Internals ====================

    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn transition(&self, from: SessionStatus, to: SessionStatus) -> Result<(), InvalidStateError> {
        let mut observed = from;
        let moved = self.status.send_if_modified(|status| {
            if *status == from {
                *status = to;
                true
            } else {
                observed = *status;
                false
            }
        });
        if moved {
            Ok(())
        } else {
            Err(InvalidStateError { status: observed })
        }
    }

    async fn finish_run(&self, end: &RunEnd, transcript: Vec<Message>) {
        {
            let mut state = self.lock_state();
            state.run = None;
            if matches!(end, RunEnd::Answer(_)) && state.memory_mode {
                state.memory.push(Turn::new(transcript));
            }
        }
        match end {
            RunEnd::Fatal { .. } => self.close().await,
            _ => {
                let _ = self.transition(SessionStatus::Running, SessionStatus::Idle);
            }
        }
    }

    fn log_event(&self, event: &AgentEvent) {
        self.logger.log(ConversationEvent::new(
            "agent_event",
            serde_json::json!({
                "session_id": self.id.to_string(),
                "type": event.type_tag(),
                "call_id": event.call_id().map(|c| c.to_string()),
                "payload": event.payload(),
            }),
        ));
    }
}

impl std::fmt::Debug for AgentSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentSession")
            .field("id", &self.id)
            .field("status", &self.status())
            .field("backend", self.backend.config())
            .finish()
    }
}

/// Returns a rebuilding session to idle when reconfiguration ends, even if
/// the reconfiguring future is dropped part-way.
struct RestoreIdle<'a>(&'a watch::Sender<SessionStatus>);

impl Drop for RestoreIdle<'_> {
    fn drop(&mut self) {
        self.0.send_if_modified(|status| {
            if *status == SessionStatus::Rebuilding {
                *status = SessionStatus::Idle;
                true
            } else {
                false
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::conversation_logger::NoConversationLogger;
    use crate::ports::model_backend::BackendError;
    use crate::use_cases::test_support::{
        MockFactory, Scripted, ScriptedBackend, snapshot_of, text_turn, tool_turn,
    };
    use reagent_domain::{CallId, InvocationErrorKind, ToolCallOutcome};
    use std::time::Duration;

    fn factory() -> Arc<MockFactory> {
        Arc::new(
            MockFactory::new()
                .with_source("eos-models", &["pr_z", "srk_z"])
                .with_source("flash-calc", &["pt_flash", "fail_flash", "slow_flash"])
                .unreachable("broken")
                .call_delay("slow_flash", Duration::from_millis(150)),
        )
    }

    fn session_with(
        factory: Arc<MockFactory>,
        script: Vec<Scripted>,
        memory_mode: bool,
    ) -> (Arc<AgentSession>, Arc<ScriptedBackend>) {
        let params = RuntimeParams::default()
            .with_tool_timeout(Duration::from_millis(500))
            .with_connect_timeout(Duration::from_millis(500))
            .with_max_tool_turns(3);
        let backend = Arc::new(ScriptedBackend::new(script));
        let session = AgentSession::new(
            Arc::clone(&backend) as Arc<dyn ModelBackend>,
            ToolResolver::new(factory, &params),
            params,
            memory_mode,
            Arc::new(NoConversationLogger),
        );
        (session, backend)
    }

    fn all_sources() -> ToolRegistrySnapshot {
        snapshot_of(&[("eos-models", true), ("flash-calc", true), ("broken", true)])
    }

    #[tokio::test]
    async fn run_with_tool_call_pairs_started_and_finished() {
        let (session, _) = session_with(
            factory(),
            vec![
                tool_turn("Flashing the feed.", &[("c1", "flash-calc/pt_flash")]),
                text_turn("Vapour fraction is 0.42."),
            ],
            false,
        );
        let diff = session.reconfigure(&all_sources()).await.unwrap();
        assert_eq!(diff.added, vec!["eos-models", "flash-calc"]);
        assert_eq!(diff.warnings.len(), 1);

        let events = session.submit("flash it").unwrap().collect().await;
        let tags: Vec<_> = events.iter().map(|e| e.type_tag()).collect();
        assert_eq!(
            tags,
            vec!["reasoning", "tool_call_started", "tool_call_finished", "final_answer"]
        );
        match &events[1] {
            AgentEvent::ToolCallStarted {
                qualified_name,
                call_id,
                ..
            } => {
                assert_eq!(qualified_name.as_str(), "flash-calc/pt_flash");
                assert_eq!(call_id, &CallId::new("c1"));
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert_eq!(events[2].call_id(), Some(&CallId::new("c1")));
        assert_eq!(session.status(), SessionStatus::Idle);
    }

    #[tokio::test]
    async fn concurrent_calls_finish_in_issue_order() {
        let (session, _) = session_with(
            factory(),
            vec![
                tool_turn(
                    "",
                    &[("slow", "flash-calc/slow_flash"), ("fast", "eos-models/pr_z")],
                ),
                text_turn("done"),
            ],
            false,
        );
        session.reconfigure(&all_sources()).await.unwrap();

        let events = session.submit("go").unwrap().collect().await;
        let finished: Vec<_> = events
            .iter()
            .filter(|e| matches!(e, AgentEvent::ToolCallFinished { .. }))
            .filter_map(|e| e.call_id().map(|c| c.as_str().to_string()))
            .collect();
        assert_eq!(finished, vec!["slow", "fast"]);
    }

    #[tokio::test]
    async fn tool_failures_are_results_not_run_errors() {
        let (session, backend) = session_with(
            factory(),
            vec![
                tool_turn("", &[("c1", "flash-calc/fail_flash"), ("c2", "nope/missing")]),
                text_turn("Both calls failed."),
            ],
            false,
        );
        session.reconfigure(&all_sources()).await.unwrap();

        let events = session.submit("go").unwrap().collect().await;
        let outcomes: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                AgentEvent::ToolCallFinished { outcome, .. } => Some(outcome.clone()),
                _ => None,
            })
            .collect();
        assert!(matches!(
            &outcomes[0],
            ToolCallOutcome::Failure(e) if e.kind == InvocationErrorKind::RemoteError
        ));
        assert!(matches!(
            &outcomes[1],
            ToolCallOutcome::Failure(e) if e.kind == InvocationErrorKind::UnknownTool
        ));
        assert!(matches!(events.last(), Some(AgentEvent::FinalAnswer { .. })));

        // The second turn saw both failures as tool results.
        let second = &backend.requests()[1];
        let tool_messages = second
            .messages
            .iter()
            .filter(|m| matches!(m, Message::Tool { is_error: true, .. }))
            .count();
        assert_eq!(tool_messages, 2);
    }

    #[tokio::test]
    async fn submit_while_running_is_rejected() {
        let (session, _) = session_with(factory(), vec![Scripted::Hang], false);
        let mut stream = session.submit("first").unwrap();

        let err = session.submit("second").unwrap_err();
        assert_eq!(err.status, SessionStatus::Running);

        stream.cancel();
        let last = stream.collect().await.pop();
        assert_eq!(last, Some(AgentEvent::cancelled()));
    }

    #[tokio::test]
    async fn reconfigure_while_running_leaves_toolset_untouched() {
        let (session, _) = session_with(factory(), vec![Scripted::Hang], false);
        session
            .reconfigure(&snapshot_of(&[("flash-calc", true)]))
            .await
            .unwrap();
        let before = session.toolset().tool_names();

        let stream = session.submit("hang").unwrap();
        let err = session.reconfigure(&all_sources()).await.unwrap_err();

        assert_eq!(err.status, SessionStatus::Running);
        assert_eq!(session.status(), SessionStatus::Running);
        assert_eq!(session.toolset().tool_names(), before);
        drop(stream);
    }

    #[tokio::test]
    async fn reconfigure_preserves_memory_and_id() {
        let (session, _) = session_with(
            factory(),
            vec![text_turn("first answer"), text_turn("second answer")],
            true,
        );
        session.reconfigure(&all_sources()).await.unwrap();
        session.submit("q1").unwrap().collect().await;
        session.submit("q2").unwrap().collect().await;
        let id = session.id();
        let memory = session.memory();
        assert_eq!(memory.len(), 2);

        let diff = session
            .reconfigure(&snapshot_of(&[("eos-models", false), ("flash-calc", true)]))
            .await
            .unwrap();

        assert_eq!(diff.removed, vec!["eos-models"]);
        assert!(diff.added.is_empty());
        assert_eq!(diff.unchanged, vec!["flash-calc"]);
        assert_eq!(session.id(), id);
        assert_eq!(session.memory(), memory);
    }

    #[tokio::test]
    async fn removed_sources_are_closed_kept_sources_are_not() {
        let factory = factory();
        let (session, _) = session_with(Arc::clone(&factory), vec![], false);
        session.reconfigure(&all_sources()).await.unwrap();

        session
            .reconfigure(&snapshot_of(&[("flash-calc", true)]))
            .await
            .unwrap();

        assert_eq!(factory.connector("eos-models").unwrap().close_count(), 1);
        assert_eq!(factory.connector("flash-calc").unwrap().close_count(), 0);
        assert_eq!(factory.connect_count("flash-calc"), 1);
    }

    #[tokio::test]
    async fn memory_feeds_later_turns_only_in_memory_mode() {
        let (session, backend) =
            session_with(factory(), vec![text_turn("a1"), text_turn("a2")], false);
        session.submit("q1").unwrap().collect().await;
        session.submit("q2").unwrap().collect().await;

        assert!(session.memory().is_empty());
        assert_eq!(backend.requests()[1].messages, vec![Message::user("q2")]);

        let (session, backend) =
            session_with(factory(), vec![text_turn("a1"), text_turn("a2")], true);
        session.submit("q1").unwrap().collect().await;
        session.submit("q2").unwrap().collect().await;

        assert_eq!(session.memory().len(), 2);
        assert_eq!(
            backend.requests()[1].messages,
            vec![Message::user("q1"), Message::assistant("a1"), Message::user("q2")]
        );
    }

    #[tokio::test]
    async fn cancel_mid_run_lets_in_flight_call_finish() {
        let factory = factory();
        let (session, backend) = session_with(
            Arc::clone(&factory),
            vec![
                tool_turn("", &[("c1", "flash-calc/slow_flash")]),
                text_turn("never sent"),
            ],
            false,
        );
        session.reconfigure(&all_sources()).await.unwrap();

        let mut stream = session.submit("go").unwrap();
        let mut events = Vec::new();
        while let Some(event) = stream.next_event().await {
            if matches!(event, AgentEvent::ToolCallStarted { .. }) {
                stream.cancel();
            }
            events.push(event);
        }

        let tags: Vec<_> = events.iter().map(|e| e.type_tag()).collect();
        assert_eq!(
            tags,
            vec!["tool_call_started", "tool_call_finished", "session_error"]
        );
        assert_eq!(events.last(), Some(&AgentEvent::cancelled()));
        assert_eq!(backend.requests().len(), 1);
        assert_eq!(session.status(), SessionStatus::Idle);
    }

    #[tokio::test]
    async fn cancel_stops_issuing_the_rest_of_the_turn() {
        let factory = factory();
        let (session, backend) = session_with(
            Arc::clone(&factory),
            vec![
                tool_turn(
                    "",
                    &[
                        ("a", "flash-calc/slow_flash"),
                        ("b", "eos-models/pr_z"),
                        ("c", "flash-calc/pt_flash"),
                    ],
                ),
                text_turn("never sent"),
            ],
            false,
        );
        session.reconfigure(&all_sources()).await.unwrap();

        let mut stream = session.submit("go").unwrap();
        let mut events = Vec::new();
        while let Some(event) = stream.next_event().await {
            if events.is_empty() && matches!(event, AgentEvent::ToolCallStarted { .. }) {
                stream.cancel();
            }
            events.push(event);
        }

        let tags: Vec<_> = events.iter().map(|e| e.type_tag()).collect();
        assert_eq!(
            tags,
            vec!["tool_call_started", "tool_call_finished", "session_error"]
        );
        assert_eq!(events[1].call_id(), Some(&CallId::new("a")));
        assert_eq!(events.last(), Some(&AgentEvent::cancelled()));

        let invoked: Vec<_> = ["flash-calc", "eos-models"]
            .iter()
            .flat_map(|name| factory.connector(name).unwrap().calls())
            .map(|(operation, _)| operation)
            .collect();
        assert_eq!(invoked, vec!["slow_flash"]);
        assert_eq!(backend.requests().len(), 1);
        assert_eq!(session.status(), SessionStatus::Idle);
    }

    #[tokio::test]
    async fn repeated_call_ids_still_pair_started_and_finished() {
        let (session, backend) = session_with(
            factory(),
            vec![
                tool_turn("", &[("dup", "eos-models/pr_z"), ("dup", "flash-calc/pt_flash")]),
                text_turn("done"),
            ],
            false,
        );
        session.reconfigure(&all_sources()).await.unwrap();

        let events = session.submit("go").unwrap().collect().await;
        let started: Vec<_> = events
            .iter()
            .filter(|e| matches!(e, AgentEvent::ToolCallStarted { .. }))
            .filter_map(|e| e.call_id().cloned())
            .collect();
        let finished: Vec<_> = events
            .iter()
            .filter(|e| matches!(e, AgentEvent::ToolCallFinished { .. }))
            .filter_map(|e| e.call_id().cloned())
            .collect();
        assert_eq!(started.len(), 2);
        assert_ne!(started[0], started[1]);
        assert_eq!(started, finished);

        // Tool results reach the model under the same ids.
        let results: Vec<_> = backend.requests()[1]
            .messages
            .iter()
            .filter_map(|m| match m {
                Message::Tool { call_id, .. } => Some(call_id.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(results, finished);
    }

    #[tokio::test]
    async fn dropping_the_stream_cancels_the_run() {
        let (session, _) = session_with(factory(), vec![Scripted::Hang], false);
        let mut status = session.subscribe_status();
        let stream = session.submit("hang").unwrap();
        drop(stream);

        tokio::time::timeout(
            Duration::from_secs(1),
            status.wait_for(|s| *s == SessionStatus::Idle),
        )
        .await
        .unwrap()
        .unwrap();
    }

    #[tokio::test]
    async fn turn_limit_ends_run_with_error() {
        let ids: Vec<String> = (0..5).map(|i| format!("c{}", i)).collect();
        let script = ids
            .iter()
            .map(|id| tool_turn("", &[(id.as_str(), "eos-models/pr_z")]))
            .collect();
        let (session, _) = session_with(factory(), script, false);
        session.reconfigure(&all_sources()).await.unwrap();

        let events = session.submit("loop").unwrap().collect().await;
        match events.last() {
            Some(AgentEvent::SessionError { kind, .. }) => assert_eq!(*kind, ErrorKind::TurnLimit),
            other => panic!("unexpected terminal event {:?}", other),
        }
        assert_eq!(session.status(), SessionStatus::Idle);
    }

    #[tokio::test]
    async fn recoverable_backend_error_keeps_session_open() {
        let (session, _) = session_with(
            factory(),
            vec![Scripted::Fail(BackendError::RateLimited("slow down".into()))],
            false,
        );
        let events = session.submit("hi").unwrap().collect().await;

        assert!(matches!(
            events.last(),
            Some(AgentEvent::SessionError { kind: ErrorKind::BackendError, .. })
        ));
        assert_eq!(session.status(), SessionStatus::Idle);
    }

    #[tokio::test]
    async fn authentication_failure_closes_session() {
        let factory = factory();
        let (session, _) = session_with(
            Arc::clone(&factory),
            vec![Scripted::Fail(BackendError::Authentication("bad key".into()))],
            false,
        );
        session.reconfigure(&all_sources()).await.unwrap();

        let events = session.submit("hi").unwrap().collect().await;

        assert!(matches!(
            events.last(),
            Some(AgentEvent::SessionError { kind: ErrorKind::SessionError, .. })
        ));
        assert_eq!(session.status(), SessionStatus::Closed);
        assert_eq!(factory.connector("flash-calc").unwrap().close_count(), 1);
        assert!(session.submit("again").is_err());
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let factory = factory();
        let (session, _) = session_with(Arc::clone(&factory), vec![], false);
        session.reconfigure(&all_sources()).await.unwrap();

        session.close().await;
        session.close().await;

        assert_eq!(session.status(), SessionStatus::Closed);
        assert_eq!(factory.connector("eos-models").unwrap().close_count(), 1);
        assert!(session.toolset().is_empty());
    }
}
