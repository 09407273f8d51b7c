//! Session supervisor: one agent session per client connection.
//!
//! The supervisor keeps an explicit session table keyed by connection, and
//! serializes everything that changes a session:
//!
//! - `send_message` is rejected with `invalid_state` while a run is active.
//! - `update_tools` during a run is queued. At most one request waits; a newer
//!   one replaces it and the replaced caller gets `busy`.
//! - `update_backend` (or `start_session` with a different backend) rebuilds
//!   the session: new id, fresh memory, fresh connectors.
//! - Losing the connection closes the session and its connectors.

use crate::config::RuntimeParams;
use crate::ports::conversation_logger::{ConversationEvent, ConversationLogger, NoConversationLogger};
use crate::ports::model_backend::{BackendError, BackendFactory};
use crate::ports::tool_connector::ConnectorFactory;
use crate::use_cases::agent_session::{AgentSession, EventStream, InvalidStateError};
use crate::use_cases::resolve_tools::ToolResolver;
use reagent_domain::{
    ConfigError, ConnectionId, ErrorKind, ModelBackendConfig, SessionId, SessionStatus,
    ToolRegistrySnapshot, ToolSourceInput, ToolsetDiff,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// Errors returned by the supervisor's control surface.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SupervisorError {
    #[error("unknown session {0}")]
    UnknownSession(String),

    #[error("invalid tool configuration: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    InvalidState(#[from] InvalidStateError),

    /// A queued reconfiguration was replaced by a newer one.
    #[error("reconfiguration superseded by a newer request")]
    Busy,

    #[error("model backend unavailable: {0}")]
    Backend(#[from] BackendError),
}

impl SupervisorError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SupervisorError::UnknownSession(_) | SupervisorError::InvalidState(_) => {
                ErrorKind::InvalidState
            }
            SupervisorError::Config(_) => ErrorKind::ConfigError,
            SupervisorError::Busy => ErrorKind::Busy,
            SupervisorError::Backend(e) => e.kind(),
        }
    }

    fn closed() -> Self {
        SupervisorError::InvalidState(InvalidStateError {
            status: SessionStatus::Closed,
        })
    }
}

/// Which tool sources a session should use.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum ToolSelection {
    /// The supervisor's configured sources.
    #[default]
    Inherit,
    /// These descriptors merged over the session's current sources (the
    /// configured ones for a new session).
    Overrides(ToolSourceInput),
    /// Exactly these descriptors. An empty map means no tools.
    Replace(ToolSourceInput),
}

/// Reply of [`SessionSupervisor::start_session`] and
/// [`SessionSupervisor::update_backend`].
#[derive(Debug, Clone, PartialEq)]
pub struct SessionStarted {
    pub session_id: SessionId,
    /// Toolset changes; `warnings` names the sources that could not attach.
    pub diff: ToolsetDiff,
}

/// A client request addressed by connection.
#[derive(Debug, Clone)]
pub enum SessionRequest {
    Start {
        backend: ModelBackendConfig,
        tools: ToolSelection,
        memory_mode: bool,
    },
    Message(String),
    Reconfigure(ToolSelection),
    ChangeBackend(ModelBackendConfig),
    Cancel,
    Close,
}

#[derive(Debug)]
pub enum SessionReply {
    Started(SessionStarted),
    Events(EventStream),
    Reconfigured(ToolsetDiff),
    Cancelled(bool),
    Closed,
}

struct PendingReconfigure {
    snapshot: ToolRegistrySnapshot,
    reply: oneshot::Sender<Result<ToolsetDiff, SupervisorError>>,
}

/// Everything the supervisor tracks for one connection.
struct SessionSlot {
    connection: ConnectionId,
    session: RwLock<Arc<AgentSession>>,
    /// Snapshot the current toolset was resolved from.
    snapshot: Mutex<ToolRegistrySnapshot>,
    pending: Mutex<Option<PendingReconfigure>>,
    /// Held while a session is submitted to, reconfigured or rebuilt.
    gate: tokio::sync::Mutex<()>,
}

impl SessionSlot {
    fn session(&self) -> Arc<AgentSession> {
        Arc::clone(&self.session.read().unwrap_or_else(|e| e.into_inner()))
    }

    fn replace_session(&self, session: Arc<AgentSession>) -> Arc<AgentSession> {
        let mut current = self.session.write().unwrap_or_else(|e| e.into_inner());
        std::mem::replace(&mut *current, session)
    }

    fn snapshot(&self) -> ToolRegistrySnapshot {
        self.snapshot.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn set_snapshot(&self, snapshot: ToolRegistrySnapshot) {
        *self.snapshot.lock().unwrap_or_else(|e| e.into_inner()) = snapshot;
    }

    /// Queue `pending`, returning the request it replaces.
    fn enqueue(&self, pending: PendingReconfigure) -> Option<PendingReconfigure> {
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .replace(pending)
    }

    fn take_pending(&self) -> Option<PendingReconfigure> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner()).take()
    }

    /// Apply the queued reconfiguration once no run is active.
    async fn drain(self: Arc<Self>) {
        let _gate = self.gate.lock().await;
        let session = self.session();
        let mut status = session.subscribe_status();
        let _ = status.wait_for(|s| *s != SessionStatus::Running).await;

        // An earlier drain may already have applied it.
        let Some(pending) = self.take_pending() else {
            return;
        };
        let result = session
            .reconfigure(&pending.snapshot)
            .await
            .map_err(SupervisorError::from);
        if result.is_ok() {
            self.set_snapshot(pending.snapshot);
        }
        let _ = pending.reply.send(result);
    }

    async fn close(&self) {
        if let Some(pending) = self.take_pending() {
            let _ = pending.reply.send(Err(SupervisorError::closed()));
        }
        self.session().close().await;
    }
}

#[derive(Default)]
struct SessionTable {
    by_connection: HashMap<ConnectionId, Arc<SessionSlot>>,
    by_session: HashMap<SessionId, ConnectionId>,
}

/// Owns every connection's session.
pub struct SessionSupervisor {
    connectors: Arc<dyn ConnectorFactory>,
    backends: Arc<dyn BackendFactory>,
    params: RuntimeParams,
    logger: Arc<dyn ConversationLogger>,
    /// Sources from configuration; the base for [`ToolSelection::Inherit`].
    base: ToolRegistrySnapshot,
    table: Mutex<SessionTable>,
}

impl SessionSupervisor {
    pub fn new(
        connectors: Arc<dyn ConnectorFactory>,
        backends: Arc<dyn BackendFactory>,
        params: RuntimeParams,
        base: ToolRegistrySnapshot,
    ) -> Self {
        Self {
            connectors,
            backends,
            params,
            logger: Arc::new(NoConversationLogger),
            base,
            table: Mutex::new(SessionTable::default()),
        }
    }

    pub fn with_logger(mut self, logger: Arc<dyn ConversationLogger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn base_snapshot(&self) -> &ToolRegistrySnapshot {
        &self.base
    }

    pub fn params(&self) -> &RuntimeParams {
        &self.params
    }

    /// The live session with `id`.
    pub fn session(&self, id: SessionId) -> Option<Arc<AgentSession>> {
        self.slot_by_session(id).ok().map(|slot| slot.session())
    }

    /// The session currently bound to `connection`.
    pub fn session_for(&self, connection: ConnectionId) -> Option<Arc<AgentSession>> {
        self.lock_table()
            .by_connection
            .get(&connection)
            .map(|slot| slot.session())
    }

    /// Number of connections with a session.
    pub fn len(&self) -> usize {
        self.lock_table().by_connection.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot the tool sources of session `id` currently resolve from.
    pub fn current_snapshot(&self, id: SessionId) -> Result<ToolRegistrySnapshot, SupervisorError> {
        Ok(self.slot_by_session(id)?.snapshot())
    }

    // ==================== Control surface ====================

    /// Start (or restart) the session of `connection`.
    ///
    /// If the connection already has a session with the same backend, only
    /// its tools are reconfigured and its id and memory survive. A different
    /// backend rebuilds it.
    pub async fn start_session(
        &self,
        connection: ConnectionId,
        backend: ModelBackendConfig,
        tools: ToolSelection,
        memory_mode: bool,
    ) -> Result<SessionStarted, SupervisorError> {
        let existing = self.lock_table().by_connection.get(&connection).cloned();
        // A session closed by a fatal error is replaced, not reused.
        let existing = existing.filter(|slot| !slot.session().status().is_closed());

        if let Some(slot) = existing {
            let session = slot.session();
            let snapshot = self.select(&tools, &slot.snapshot())?;
            if session.backend_config() == &backend {
                session.set_memory_mode(memory_mode);
                let diff = self.update_tools_in(&slot, snapshot).await?;
                return Ok(SessionStarted {
                    session_id: session.id(),
                    diff,
                });
            }
            return self.rebuild(&slot, &backend, snapshot, memory_mode).await;
        }

        let snapshot = self.select(&tools, &self.base)?;
        let model = self.backends.create(&backend)?;
        let session = AgentSession::new(
            model,
            self.resolver(),
            self.params.clone(),
            memory_mode,
            Arc::clone(&self.logger),
        );
        let diff = session.reconfigure(&snapshot).await?;
        let session_id = session.id();

        let slot = Arc::new(SessionSlot {
            connection,
            session: RwLock::new(Arc::clone(&session)),
            snapshot: Mutex::new(snapshot),
            pending: Mutex::new(None),
            gate: tokio::sync::Mutex::new(()),
        });
        let replaced = {
            let mut table = self.lock_table();
            table.by_session.insert(session_id, connection);
            table.by_connection.insert(connection, slot)
        };
        // Two concurrent starts for one connection: the later one wins.
        if let Some(replaced) = replaced {
            self.forget(&replaced);
            replaced.close().await;
        }

        info!(connection = %connection, session = %session_id, "Session registered");
        Ok(SessionStarted { session_id, diff })
    }

    /// Submit `text` to session `id`.
    pub async fn send_message(
        &self,
        id: SessionId,
        text: impl Into<String>,
    ) -> Result<EventStream, SupervisorError> {
        let slot = self.slot_by_session(id)?;
        let _gate = slot.gate.lock().await;
        let session = slot.session();
        if session.id() != id {
            return Err(SupervisorError::UnknownSession(id.to_string()));
        }
        Ok(session.submit(text)?)
    }

    /// Change the tool sources of session `id`.
    ///
    /// Waits for an active run to end first. While waiting, a newer
    /// `update_tools` for the same session replaces this one, which then
    /// fails with [`SupervisorError::Busy`].
    pub async fn update_tools(
        &self,
        id: SessionId,
        tools: ToolSelection,
    ) -> Result<ToolsetDiff, SupervisorError> {
        let slot = self.slot_by_session(id)?;
        let snapshot = self.select(&tools, &slot.snapshot())?;
        self.update_tools_in(&slot, snapshot).await
    }

    /// Switch session `id` to another model backend. This is a rebuild: the
    /// returned session has a new id and empty memory.
    pub async fn update_backend(
        &self,
        id: SessionId,
        backend: ModelBackendConfig,
    ) -> Result<SessionStarted, SupervisorError> {
        let slot = self.slot_by_session(id)?;
        let session = slot.session();
        let memory_mode = session.memory_mode();
        self.rebuild(&slot, &backend, slot.snapshot(), memory_mode)
            .await
    }

    /// Cancel the active run of session `id`, if any.
    pub fn cancel(&self, id: SessionId) -> Result<bool, SupervisorError> {
        Ok(self.slot_by_session(id)?.session().cancel_run())
    }

    /// Close session `id` and release its connectors.
    pub async fn close_session(&self, id: SessionId) -> Result<(), SupervisorError> {
        let slot = self.slot_by_session(id)?;
        self.remove(slot.connection).await;
        Ok(())
    }

    /// The client connection went away.
    pub async fn disconnect(&self, connection: ConnectionId) {
        debug!(connection = %connection, "Connection lost");
        self.remove(connection).await;
    }

    /// Close every session.
    pub async fn shutdown(&self) {
        let slots: Vec<_> = {
            let mut table = self.lock_table();
            table.by_session.clear();
            table.by_connection.drain().map(|(_, slot)| slot).collect()
        };
        for slot in slots {
            slot.close().await;
        }
    }

    /// Dispatch one request from `connection`.
    pub async fn handle_request(
        &self,
        connection: ConnectionId,
        request: SessionRequest,
    ) -> Result<SessionReply, SupervisorError> {
        let session_id = || {
            self.session_for(connection)
                .map(|s| s.id())
                .ok_or_else(|| SupervisorError::UnknownSession(connection.to_string()))
        };
        match request {
            SessionRequest::Start {
                backend,
                tools,
                memory_mode,
            } => self
                .start_session(connection, backend, tools, memory_mode)
                .await
                .map(SessionReply::Started),
            SessionRequest::Message(text) => self
                .send_message(session_id()?, text)
                .await
                .map(SessionReply::Events),
            SessionRequest::Reconfigure(tools) => self
                .update_tools(session_id()?, tools)
                .await
                .map(SessionReply::Reconfigured),
            SessionRequest::ChangeBackend(backend) => self
                .update_backend(session_id()?, backend)
                .await
                .map(SessionReply::Started),
            SessionRequest::Cancel => self.cancel(session_id()?).map(SessionReply::Cancelled),
            SessionRequest::Close => {
                self.close_session(session_id()?).await?;
                Ok(SessionReply::Closed)
            }
        }
    }

    // ==================== Internals ====================

    fn lock_table(&self) -> std::sync::MutexGuard<'_, SessionTable> {
        self.table.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn resolver(&self) -> ToolResolver {
        ToolResolver::new(Arc::clone(&self.connectors), &self.params)
    }

    fn slot_by_session(&self, id: SessionId) -> Result<Arc<SessionSlot>, SupervisorError> {
        let table = self.lock_table();
        table
            .by_session
            .get(&id)
            .and_then(|connection| table.by_connection.get(connection))
            .cloned()
            .ok_or_else(|| SupervisorError::UnknownSession(id.to_string()))
    }

    fn select(
        &self,
        tools: &ToolSelection,
        current: &ToolRegistrySnapshot,
    ) -> Result<ToolRegistrySnapshot, SupervisorError> {
        Ok(match tools {
            ToolSelection::Inherit => self.base.clone(),
            ToolSelection::Overrides(input) => {
                ToolRegistrySnapshot::merge(current, &ToolRegistrySnapshot::from_input(input)?)
            }
            ToolSelection::Replace(input) => ToolRegistrySnapshot::from_input(input)?,
        })
    }

    async fn update_tools_in(
        &self,
        slot: &Arc<SessionSlot>,
        snapshot: ToolRegistrySnapshot,
    ) -> Result<ToolsetDiff, SupervisorError> {
        let (reply, rx) = oneshot::channel();
        let version = snapshot.version();
        if let Some(superseded) = slot.enqueue(PendingReconfigure { snapshot, reply }) {
            debug!(
                session = %slot.session().id(),
                superseded = superseded.snapshot.version(),
                by = version,
                "Queued reconfiguration replaced"
            );
            let _ = superseded.reply.send(Err(SupervisorError::Busy));
        }

        tokio::spawn(Arc::clone(slot).drain());
        rx.await.unwrap_or_else(|_| Err(SupervisorError::closed()))
    }

    async fn rebuild(
        &self,
        slot: &Arc<SessionSlot>,
        backend: &ModelBackendConfig,
        snapshot: ToolRegistrySnapshot,
        memory_mode: bool,
    ) -> Result<SessionStarted, SupervisorError> {
        let model = self.backends.create(backend)?;
        let _gate = slot.gate.lock().await;

        let old = slot.session();
        if !old.status().is_closed() {
            old.close().await;
        }

        let session = AgentSession::new(
            model,
            self.resolver(),
            self.params.clone(),
            memory_mode,
            Arc::clone(&self.logger),
        );
        let diff = session.reconfigure(&snapshot).await?;
        let session_id = session.id();

        slot.replace_session(Arc::clone(&session));
        slot.set_snapshot(snapshot);
        {
            let mut table = self.lock_table();
            table.by_session.remove(&old.id());
            table.by_session.insert(session_id, slot.connection);
        }

        info!(previous = %old.id(), session = %session_id, model = %backend, "Session rebuilt");
        self.logger.log(ConversationEvent::new(
            "session_rebuilt",
            serde_json::json!({
                "previous_session_id": old.id().to_string(),
                "session_id": session_id.to_string(),
                "model": backend.to_string(),
            }),
        ));
        Ok(SessionStarted { session_id, diff })
    }

    async fn remove(&self, connection: ConnectionId) {
        let slot = self.lock_table().by_connection.remove(&connection);
        match slot {
            Some(slot) => {
                self.forget(&slot);
                slot.close().await;
            }
            None => warn!(connection = %connection, "No session to close"),
        }
    }

    fn forget(&self, slot: &SessionSlot) {
        let id = slot.session().id();
        let mut table = self.lock_table();
        if table.by_session.get(&id) == Some(&slot.connection) {
            table.by_session.remove(&id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::use_cases::test_support::{
        MockFactory, Scripted, ScriptedBackendFactory, input_of, snapshot_of, text_turn,
        tool_turn,
    };
    use reagent_domain::{AgentEvent, ModelProvider, SourceDescriptor};
    use std::time::Duration;

    fn flash_then_answer() -> Vec<Scripted> {
        vec![
            tool_turn("", &[("c1", "flash-calc/pt_flash")]),
            text_turn("Vapour fraction 0.42."),
        ]
    }

    fn slow_flash_then_answer() -> Vec<Scripted> {
        vec![
            tool_turn("", &[("c1", "flash-calc/slow_flash")]),
            text_turn("done"),
        ]
    }

    fn hang() -> Vec<Scripted> {
        vec![Scripted::Hang]
    }

    struct Fixture {
        supervisor: Arc<SessionSupervisor>,
        connectors: Arc<MockFactory>,
        backends: Arc<ScriptedBackendFactory>,
    }

    fn fixture(script: fn() -> Vec<Scripted>) -> Fixture {
        let connectors = Arc::new(
            MockFactory::new()
                .with_source("eos-models", &["pr_z"])
                .with_source("flash-calc", &["pt_flash", "slow_flash"])
                .unreachable("broken")
                .call_delay("slow_flash", Duration::from_millis(200)),
        );
        let backends = Arc::new(ScriptedBackendFactory::new(script));
        let params = RuntimeParams::default()
            .with_connect_timeout(Duration::from_millis(500))
            .with_tool_timeout(Duration::from_secs(2));
        let base = snapshot_of(&[("eos-models", true), ("flash-calc", true), ("broken", true)]);
        let supervisor = Arc::new(SessionSupervisor::new(
            Arc::clone(&connectors) as Arc<dyn ConnectorFactory>,
            Arc::clone(&backends) as Arc<dyn BackendFactory>,
            params,
            base,
        ));
        Fixture {
            supervisor,
            connectors,
            backends,
        }
    }

    fn openai() -> ModelBackendConfig {
        ModelBackendConfig::new(ModelProvider::OpenAi, "gpt-4o-mini")
    }

    #[tokio::test]
    async fn end_to_end_scenario() {
        let fx = fixture(flash_then_answer);
        let connection = ConnectionId::next();

        let started = fx
            .supervisor
            .start_session(connection, openai(), ToolSelection::Inherit, true)
            .await
            .unwrap();
        assert_eq!(started.diff.added, vec!["eos-models", "flash-calc"]);
        assert_eq!(started.diff.warnings.len(), 1);
        assert_eq!(started.diff.warnings[0].source, "broken");

        let events = fx
            .supervisor
            .send_message(started.session_id, "flash the feed")
            .await
            .unwrap()
            .collect()
            .await;
        let started_call = events.iter().find_map(|e| match e {
            AgentEvent::ToolCallStarted { qualified_name, .. } => Some(qualified_name.to_string()),
            _ => None,
        });
        assert_eq!(started_call.as_deref(), Some("flash-calc/pt_flash"));
        assert!(matches!(events.last(), Some(AgentEvent::FinalAnswer { .. })));

        let session = fx.supervisor.session(started.session_id).unwrap();
        let memory = session.memory();
        assert_eq!(memory.len(), 1);

        let diff = fx
            .supervisor
            .update_tools(
                started.session_id,
                ToolSelection::Overrides(input_of(&[("eos-models", false)])),
            )
            .await
            .unwrap();
        assert_eq!(diff.removed, vec!["eos-models"]);
        assert!(diff.added.is_empty());
        assert_eq!(diff.unchanged, vec!["flash-calc"]);

        let session = fx.supervisor.session(started.session_id).unwrap();
        assert_eq!(session.memory(), memory);
        assert_eq!(session.toolset().tool_names(), vec!["flash-calc/pt_flash", "flash-calc/slow_flash"]);
    }

    #[tokio::test]
    async fn backend_change_rebuilds_with_new_id_and_fresh_memory() {
        let fx = fixture(|| vec![text_turn("hello")]);
        let connection = ConnectionId::next();
        let started = fx
            .supervisor
            .start_session(connection, openai(), ToolSelection::Inherit, true)
            .await
            .unwrap();
        fx.supervisor
            .send_message(started.session_id, "hi")
            .await
            .unwrap()
            .collect()
            .await;

        let rebuilt = fx
            .supervisor
            .update_backend(
                started.session_id,
                ModelBackendConfig::new(ModelProvider::Anthropic, "claude-sonnet-4-5"),
            )
            .await
            .unwrap();

        assert_ne!(rebuilt.session_id, started.session_id);
        assert!(fx.supervisor.session(started.session_id).is_none());
        let session = fx.supervisor.session(rebuilt.session_id).unwrap();
        assert!(session.memory().is_empty());
        assert!(session.memory_mode());
        assert_eq!(session.backend_config().provider, ModelProvider::Anthropic);
        assert_eq!(fx.connectors.connect_count("flash-calc"), 2);
        assert_eq!(fx.backends.created().len(), 2);
    }

    #[tokio::test]
    async fn session_closed_by_auth_failure_can_be_replaced() {
        let fx = fixture(|| {
            vec![Scripted::Fail(BackendError::Authentication("bad key".into()))]
        });
        let connection = ConnectionId::next();
        let started = fx
            .supervisor
            .start_session(connection, openai(), ToolSelection::Inherit, false)
            .await
            .unwrap();

        let events = fx
            .supervisor
            .send_message(started.session_id, "hi")
            .await
            .unwrap()
            .collect()
            .await;
        assert!(matches!(
            events.last(),
            Some(AgentEvent::SessionError { kind: ErrorKind::SessionError, .. })
        ));

        let rebuilt = fx
            .supervisor
            .update_backend(
                started.session_id,
                ModelBackendConfig::new(ModelProvider::Anthropic, "claude-sonnet-4-5"),
            )
            .await
            .unwrap();
        assert_ne!(rebuilt.session_id, started.session_id);
        let session = fx.supervisor.session(rebuilt.session_id).unwrap();
        assert_eq!(session.status(), SessionStatus::Idle);
        assert!(fx.supervisor.session(started.session_id).is_none());

        // The rebuilt session fails the same way; a plain restart recovers too.
        fx.supervisor
            .send_message(rebuilt.session_id, "hi again")
            .await
            .unwrap()
            .collect()
            .await;
        let restarted = fx
            .supervisor
            .start_session(connection, openai(), ToolSelection::Inherit, false)
            .await
            .unwrap();
        assert_ne!(restarted.session_id, rebuilt.session_id);
        assert_eq!(restarted.diff.added, vec!["eos-models", "flash-calc"]);
        let session = fx.supervisor.session(restarted.session_id).unwrap();
        assert_eq!(session.status(), SessionStatus::Idle);
        assert!(fx.supervisor.session(rebuilt.session_id).is_none());
        assert!(
            fx.supervisor
                .send_message(restarted.session_id, "third time")
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn restart_with_same_backend_keeps_session_id() {
        let fx = fixture(|| vec![]);
        let connection = ConnectionId::next();
        let first = fx
            .supervisor
            .start_session(connection, openai(), ToolSelection::Inherit, false)
            .await
            .unwrap();

        let second = fx
            .supervisor
            .start_session(
                connection,
                openai(),
                ToolSelection::Replace(input_of(&[("flash-calc", true)])),
                false,
            )
            .await
            .unwrap();

        assert_eq!(second.session_id, first.session_id);
        assert_eq!(second.diff.removed, vec!["eos-models"]);
        assert_eq!(fx.supervisor.len(), 1);
    }

    #[tokio::test]
    async fn queued_reconfigure_waits_for_run_and_last_writer_wins() {
        let fx = fixture(slow_flash_then_answer);
        let connection = ConnectionId::next();
        let id = fx
            .supervisor
            .start_session(connection, openai(), ToolSelection::Inherit, false)
            .await
            .unwrap()
            .session_id;

        let stream = fx.supervisor.send_message(id, "go").await.unwrap();

        let first = tokio::spawn({
            let supervisor = Arc::clone(&fx.supervisor);
            async move {
                supervisor
                    .update_tools(id, ToolSelection::Replace(input_of(&[("flash-calc", true)])))
                    .await
            }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        let second = tokio::spawn({
            let supervisor = Arc::clone(&fx.supervisor);
            async move {
                supervisor
                    .update_tools(id, ToolSelection::Replace(input_of(&[("eos-models", true)])))
                    .await
            }
        });

        let events = stream.collect().await;
        assert!(matches!(events.last(), Some(AgentEvent::FinalAnswer { .. })));

        assert_eq!(first.await.unwrap(), Err(SupervisorError::Busy));
        let diff = second.await.unwrap().unwrap();
        assert_eq!(diff.removed, vec!["flash-calc"]);
        assert_eq!(diff.unchanged, vec!["eos-models"]);

        let session = fx.supervisor.session(id).unwrap();
        assert_eq!(session.id(), id);
        assert_eq!(session.toolset().source_names(), vec!["eos-models"]);
    }

    #[tokio::test]
    async fn message_while_running_is_rejected() {
        let fx = fixture(hang);
        let connection = ConnectionId::next();
        let id = fx
            .supervisor
            .start_session(connection, openai(), ToolSelection::Inherit, false)
            .await
            .unwrap()
            .session_id;

        let _stream = fx.supervisor.send_message(id, "first").await.unwrap();
        let err = fx.supervisor.send_message(id, "second").await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InvalidState);
        assert!(fx.supervisor.cancel(id).unwrap());
    }

    #[tokio::test]
    async fn disconnect_closes_session_and_connectors() {
        let fx = fixture(hang);
        let connection = ConnectionId::next();
        let id = fx
            .supervisor
            .start_session(connection, openai(), ToolSelection::Inherit, false)
            .await
            .unwrap()
            .session_id;
        let session = fx.supervisor.session(id).unwrap();
        let stream = fx.supervisor.send_message(id, "hang").await.unwrap();

        fx.supervisor.disconnect(connection).await;

        assert_eq!(session.status(), SessionStatus::Closed);
        assert!(fx.supervisor.is_empty());
        assert_eq!(fx.connectors.connector("flash-calc").unwrap().close_count(), 1);
        assert_eq!(fx.connectors.connector("eos-models").unwrap().close_count(), 1);
        assert_eq!(stream.collect().await.last(), Some(&AgentEvent::cancelled()));
        assert!(matches!(
            fx.supervisor.send_message(id, "again").await,
            Err(SupervisorError::UnknownSession(_))
        ));
    }

    #[tokio::test]
    async fn invalid_tool_input_is_a_config_error() {
        let fx = fixture(|| vec![]);
        let id = fx
            .supervisor
            .start_session(ConnectionId::next(), openai(), ToolSelection::Inherit, false)
            .await
            .unwrap()
            .session_id;
        let before = fx.supervisor.session(id).unwrap().toolset().tool_names();

        let mut descriptor = SourceDescriptor::remote("mock://pigeon");
        descriptor.transport = Some("carrier-pigeon".to_string());
        let input = [("pigeon".to_string(), descriptor)].into_iter().collect();
        let err = fx
            .supervisor
            .update_tools(id, ToolSelection::Overrides(input))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ConfigError);
        assert_eq!(fx.supervisor.session(id).unwrap().toolset().tool_names(), before);
    }

    #[tokio::test]
    async fn backend_creation_failure_is_reported() {
        let fx = fixture(|| vec![]);
        let err = fx
            .supervisor
            .start_session(
                ConnectionId::next(),
                ModelBackendConfig::new(ModelProvider::OpenAi, "bad-key"),
                ToolSelection::Inherit,
                false,
            )
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::SessionError);
        assert!(fx.supervisor.is_empty());
        assert_eq!(fx.connectors.connect_count("flash-calc"), 0);
    }

    #[tokio::test]
    async fn requests_are_dispatched_by_connection() {
        let fx = fixture(|| vec![text_turn("42")]);
        let connection = ConnectionId::next();

        let reply = fx
            .supervisor
            .handle_request(
                connection,
                SessionRequest::Start {
                    backend: openai(),
                    tools: ToolSelection::Replace(Default::default()),
                    memory_mode: false,
                },
            )
            .await
            .unwrap();
        assert!(matches!(reply, SessionReply::Started(ref s) if s.diff.is_noop()));

        let SessionReply::Events(stream) = fx
            .supervisor
            .handle_request(connection, SessionRequest::Message("answer?".into()))
            .await
            .unwrap()
        else {
            panic!("expected an event stream");
        };
        assert_eq!(
            stream.collect().await,
            vec![AgentEvent::final_answer("42")]
        );

        let reply = fx
            .supervisor
            .handle_request(connection, SessionRequest::Close)
            .await
            .unwrap();
        assert!(matches!(reply, SessionReply::Closed));
        assert!(matches!(
            fx.supervisor
                .handle_request(connection, SessionRequest::Cancel)
                .await,
            Err(SupervisorError::UnknownSession(_))
        ));
    }
}
