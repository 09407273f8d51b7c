//! Test doubles shared by the use case tests

use crate::ports::event_sink::{EventSink, SinkClosed};
use crate::ports::model_backend::{BackendError, BackendFactory, ModelBackend, TurnRequest};
use crate::ports::tool_connector::{ConnectError, ConnectorFactory, ToolConnector};
use async_trait::async_trait;
use reagent_domain::{
    ContentBlock, EventRecord, LlmResponse, ModelBackendConfig, ModelProvider, SourceDescriptor, StopReason,
    ToolDefinition, ToolInvocationError, ToolOutput, ToolRegistrySnapshot, ToolSourceConfig,
    ToolSourceInput,
};
use serde_json::Value;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ==================== Tool connectors ====================

pub(crate) struct MockConnector {
    name: String,
    operations: Vec<String>,
    call_delays: HashMap<String, Duration>,
    alive: AtomicBool,
    closes: AtomicUsize,
    calls: Mutex<Vec<(String, Value)>>,
}

impl MockConnector {
    pub(crate) fn kill(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }

    pub(crate) fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub(crate) fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ToolConnector for MockConnector {
    fn source_name(&self) -> &str {
        &self.name
    }

    async fn list_operations(&self) -> Result<Vec<ToolDefinition>, ToolInvocationError> {
        Ok(self
            .operations
            .iter()
            .map(|op| ToolDefinition::new(op.clone(), format!("{} on {}", op, self.name)))
            .collect())
    }

    async fn invoke(&self, operation: &str, args: Value) -> Result<ToolOutput, ToolInvocationError> {
        self.calls
            .lock()
            .unwrap()
            .push((operation.to_string(), args.clone()));
        if let Some(delay) = self.call_delays.get(operation) {
            tokio::time::sleep(*delay).await;
        }
        if operation.starts_with("fail") {
            return Err(ToolInvocationError::remote(format!("{} exploded", operation)));
        }
        Ok(ToolOutput::text(format!("{}({})", operation, args)))
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    async fn close(&self) {
        self.alive.store(false, Ordering::SeqCst);
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub(crate) struct MockFactory {
    operations: HashMap<String, Vec<String>>,
    unreachable: HashSet<String>,
    connect_delays: HashMap<String, Duration>,
    call_delays: HashMap<String, Duration>,
    connects: Mutex<HashMap<String, usize>>,
    latest: Mutex<HashMap<String, Arc<MockConnector>>>,
}

impl MockFactory {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_source(mut self, name: &str, operations: &[&str]) -> Self {
        self.operations.insert(
            name.to_string(),
            operations.iter().map(|s| s.to_string()).collect(),
        );
        self
    }

    pub(crate) fn unreachable(mut self, name: &str) -> Self {
        self.unreachable.insert(name.to_string());
        self
    }

    pub(crate) fn connect_delay(mut self, name: &str, delay: Duration) -> Self {
        self.connect_delays.insert(name.to_string(), delay);
        self
    }

    pub(crate) fn call_delay(mut self, operation: &str, delay: Duration) -> Self {
        self.call_delays.insert(operation.to_string(), delay);
        self
    }

    pub(crate) fn connect_count(&self, name: &str) -> usize {
        self.connects.lock().unwrap().get(name).copied().unwrap_or(0)
    }

    /// Most recently created connector for `name`.
    pub(crate) fn connector(&self, name: &str) -> Option<Arc<MockConnector>> {
        self.latest.lock().unwrap().get(name).cloned()
    }
}

#[async_trait]
impl ConnectorFactory for MockFactory {
    async fn connect(
        &self,
        config: &ToolSourceConfig,
    ) -> Result<Arc<dyn ToolConnector>, ConnectError> {
        *self
            .connects
            .lock()
            .unwrap()
            .entry(config.name.clone())
            .or_default() += 1;

        if let Some(delay) = self.connect_delays.get(&config.name) {
            tokio::time::sleep(*delay).await;
        }
        if self.unreachable.contains(&config.name) {
            return Err(ConnectError::connection(&config.name, "connection refused"));
        }
        let Some(operations) = self.operations.get(&config.name) else {
            return Err(ConnectError::spawn(&config.name, "no such mock source"));
        };

        let connector = Arc::new(MockConnector {
            name: config.name.clone(),
            operations: operations.clone(),
            call_delays: self.call_delays.clone(),
            alive: AtomicBool::new(true),
            closes: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
        });
        self.latest
            .lock()
            .unwrap()
            .insert(config.name.clone(), Arc::clone(&connector));
        Ok(connector)
    }
}

/// Remote sources named after `entries`, each pointing at a mock URL.
pub(crate) fn snapshot_of(entries: &[(&str, bool)]) -> ToolRegistrySnapshot {
    ToolRegistrySnapshot::from_input(&input_of(entries)).unwrap()
}

pub(crate) fn input_of(entries: &[(&str, bool)]) -> ToolSourceInput {
    entries
        .iter()
        .map(|(name, enabled)| {
            let descriptor = SourceDescriptor::remote(format!("mock://{}", name));
            let descriptor = if *enabled {
                descriptor
            } else {
                descriptor.disabled()
            };
            (name.to_string(), descriptor)
        })
        .collect()
}

// ==================== Model backend ====================

pub(crate) enum Scripted {
    Reply(LlmResponse),
    Fail(BackendError),
    /// Never answers; only cancellation ends the turn.
    Hang,
}

/// A model backend that replays a fixed script of turns.
pub(crate) struct ScriptedBackend {
    config: ModelBackendConfig,
    script: Mutex<VecDeque<Scripted>>,
    requests: Mutex<Vec<TurnRequest>>,
}

impl ScriptedBackend {
    pub(crate) fn new(script: Vec<Scripted>) -> Self {
        Self::with_config(ModelBackendConfig::new(ModelProvider::OpenAi, "scripted"), script)
    }

    pub(crate) fn with_config(config: ModelBackendConfig, script: Vec<Scripted>) -> Self {
        Self {
            config,
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn requests(&self) -> Vec<TurnRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelBackend for ScriptedBackend {
    fn config(&self) -> &ModelBackendConfig {
        &self.config
    }

    async fn next_turn(&self, request: TurnRequest) -> Result<LlmResponse, BackendError> {
        self.requests.lock().unwrap().push(request);
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Scripted::Reply(response)) => Ok(response),
            Some(Scripted::Fail(err)) => Err(err),
            Some(Scripted::Hang) => std::future::pending().await,
            None => Ok(LlmResponse::from_text("(no more responses)")),
        }
    }
}

/// Hands out a fresh [`ScriptedBackend`] per `create`, each with a copy of
/// the same script.
pub(crate) struct ScriptedBackendFactory {
    script: fn() -> Vec<Scripted>,
    created: Mutex<Vec<Arc<ScriptedBackend>>>,
}

impl ScriptedBackendFactory {
    pub(crate) fn new(script: fn() -> Vec<Scripted>) -> Self {
        Self {
            script,
            created: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn created(&self) -> Vec<Arc<ScriptedBackend>> {
        self.created.lock().unwrap().clone()
    }
}

impl BackendFactory for ScriptedBackendFactory {
    fn create(&self, config: &ModelBackendConfig) -> Result<Arc<dyn ModelBackend>, BackendError> {
        if config.model == "bad-key" {
            return Err(BackendError::Authentication("missing API key".to_string()));
        }
        let backend = Arc::new(ScriptedBackend::with_config(config.clone(), (self.script)()));
        self.created.lock().unwrap().push(Arc::clone(&backend));
        Ok(backend)
    }
}

/// A turn requesting the given `(call_id, qualified_name)` tool calls.
pub(crate) fn tool_turn(text: &str, calls: &[(&str, &str)]) -> Scripted {
    let mut content = Vec::new();
    if !text.is_empty() {
        content.push(ContentBlock::text(text));
    }
    for (id, name) in calls {
        content.push(ContentBlock::tool_use(*id, *name, serde_json::json!({"t": 300})));
    }
    Scripted::Reply(LlmResponse {
        content,
        stop_reason: Some(StopReason::ToolUse),
        model: None,
        usage: None,
    })
}

pub(crate) fn text_turn(text: &str) -> Scripted {
    Scripted::Reply(LlmResponse::from_text(text))
}

// ==================== Event sinks ====================

/// Records everything it receives. Can be slowed down or made to hang up.
#[derive(Default)]
pub(crate) struct RecordingSink {
    records: Mutex<Vec<EventRecord>>,
    delay: Option<Duration>,
    close_after: Option<usize>,
}

impl RecordingSink {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub(crate) fn closing_after(n: usize) -> Self {
        Self {
            close_after: Some(n),
            ..Self::default()
        }
    }

    pub(crate) fn records(&self) -> Vec<EventRecord> {
        self.records.lock().unwrap().clone()
    }

    pub(crate) fn types(&self) -> Vec<String> {
        self.records()
            .into_iter()
            .map(|r| r.event_type)
            .collect()
    }
}

#[async_trait]
impl EventSink for RecordingSink {
    async fn send(&self, record: EventRecord) -> Result<(), SinkClosed> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let mut records = self.records.lock().unwrap();
        if self.close_after.is_some_and(|n| records.len() >= n) {
            return Err(SinkClosed);
        }
        records.push(record);
        Ok(())
    }
}
