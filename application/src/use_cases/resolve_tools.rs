//! Toolset resolution: from a registry snapshot to callable tool handles.
//!
//! [`ToolResolver::resolve`] attaches every enabled source concurrently. A
//! source that fails to connect (or to list its operations) is left out and
//! reported as a [`ToolUnavailable`] warning; it never aborts the others.
//!
//! [`ToolResolver::reconcile`] does the same against an existing toolset,
//! keeping live connectors whose connection settings did not change.

use crate::config::RuntimeParams;
use crate::ports::tool_connector::{ConnectorFactory, ToolConnector};
use futures::future::join_all;
use reagent_domain::{
    ErrorKind, QualifiedName, ToolDefinition, ToolInvocationError, ToolOutput,
    ToolRegistrySnapshot, ToolSourceConfig, ToolSpec, ToolUnavailable, ToolsetDiff,
};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// A resolved, connected operation bound to its source's connector.
#[derive(Clone)]
pub struct ToolHandle {
    name: QualifiedName,
    definition: ToolDefinition,
    connector: Arc<dyn ToolConnector>,
    timeout: Duration,
}

impl ToolHandle {
    pub fn qualified_name(&self) -> &QualifiedName {
        &self.name
    }

    pub fn source_name(&self) -> &str {
        self.name.source()
    }

    pub fn operation_name(&self) -> &str {
        &self.definition.name
    }

    pub fn description(&self) -> &str {
        &self.definition.description
    }

    pub fn input_schema(&self) -> &serde_json::Value {
        &self.definition.input_schema
    }

    pub fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name.clone(),
            description: self.definition.description.clone(),
            input_schema: self.definition.input_schema.clone(),
        }
    }

    /// Invoke the operation, failing with `timeout` after the tool timeout.
    pub async fn invoke(&self, args: serde_json::Value) -> Result<ToolOutput, ToolInvocationError> {
        match tokio::time::timeout(
            self.timeout,
            self.connector.invoke(&self.definition.name, args),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(ToolInvocationError::timeout(
                self.name.as_str(),
                self.timeout.as_secs(),
            )),
        }
    }
}

impl std::fmt::Debug for ToolHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolHandle")
            .field("name", &self.name)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// One attached source: its config, live connector and advertised operations.
#[derive(Clone)]
pub struct AttachedSource {
    pub config: ToolSourceConfig,
    pub connector: Arc<dyn ToolConnector>,
    pub operations: Vec<ToolDefinition>,
}

/// The connected operations available to one session.
///
/// Handles are ordered by qualified name. A toolset is never shared between
/// sessions; the session swaps it as a whole on reconfiguration.
#[derive(Clone, Default)]
pub struct Toolset {
    sources: BTreeMap<String, AttachedSource>,
    handles: BTreeMap<QualifiedName, ToolHandle>,
    snapshot_version: Option<u64>,
}

impl Toolset {
    pub fn empty() -> Self {
        Self::default()
    }

    fn from_sources(
        sources: BTreeMap<String, AttachedSource>,
        timeout: Duration,
        snapshot_version: Option<u64>,
    ) -> Self {
        let mut handles = BTreeMap::new();
        for attached in sources.values() {
            for definition in &attached.operations {
                let name = QualifiedName::new(&attached.config.name, &definition.name);
                if handles.contains_key(&name) {
                    warn!(tool = %name, "Duplicate operation advertised, keeping the first");
                    continue;
                }
                handles.insert(
                    name.clone(),
                    ToolHandle {
                        name,
                        definition: definition.clone(),
                        connector: Arc::clone(&attached.connector),
                        timeout,
                    },
                );
            }
        }
        Self {
            sources,
            handles,
            snapshot_version,
        }
    }

    pub fn get(&self, qualified_name: &str) -> Option<&ToolHandle> {
        QualifiedName::parse(qualified_name).and_then(|name| self.handles.get(&name))
    }

    pub fn handles(&self) -> impl Iterator<Item = &ToolHandle> {
        self.handles.values()
    }

    pub fn specs(&self) -> Vec<ToolSpec> {
        self.handles.values().map(ToolHandle::spec).collect()
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.handles.keys().map(|n| n.to_string()).collect()
    }

    pub fn source_names(&self) -> Vec<String> {
        self.sources.keys().cloned().collect()
    }

    pub fn source(&self, name: &str) -> Option<&AttachedSource> {
        self.sources.get(name)
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Version of the snapshot this toolset was resolved from.
    pub fn snapshot_version(&self) -> Option<u64> {
        self.snapshot_version
    }

    /// Close every connector. Safe to call more than once.
    pub async fn close_all(&self) {
        close_connectors(self.sources.values().map(|s| Arc::clone(&s.connector))).await;
    }
}

pub(crate) async fn close_connectors(connectors: impl IntoIterator<Item = Arc<dyn ToolConnector>>) {
    join_all(connectors.into_iter().map(|c| async move {
        debug!(source = c.source_name(), "Closing tool connector");
        c.close().await;
    }))
    .await;
}

/// Outcome of [`ToolResolver::resolve`].
pub struct Resolution {
    pub toolset: Toolset,
    pub warnings: Vec<ToolUnavailable>,
}

/// Outcome of [`ToolResolver::reconcile`].
pub struct Reconciliation {
    pub toolset: Toolset,
    pub diff: ToolsetDiff,
    /// Connectors no longer referenced by `toolset`. The caller closes them
    /// once the swap is done.
    pub retired: Vec<Arc<dyn ToolConnector>>,
}

/// Attaches snapshot entries through a [`ConnectorFactory`].
#[derive(Clone)]
pub struct ToolResolver {
    factory: Arc<dyn ConnectorFactory>,
    connect_timeout: Duration,
    tool_timeout: Duration,
}

impl ToolResolver {
    pub fn new(factory: Arc<dyn ConnectorFactory>, params: &RuntimeParams) -> Self {
        Self {
            factory,
            connect_timeout: params.connect_timeout,
            tool_timeout: params.tool_timeout,
        }
    }

    /// Attach every enabled source of `snapshot`.
    pub async fn resolve(&self, snapshot: &ToolRegistrySnapshot) -> Resolution {
        let configs: Vec<ToolSourceConfig> = snapshot.enabled().cloned().collect();
        let results = join_all(configs.into_iter().map(|c| self.attach(c))).await;

        let mut sources = BTreeMap::new();
        let mut warnings = Vec::new();
        for result in results {
            match result {
                Ok(attached) => {
                    sources.insert(attached.config.name.clone(), attached);
                }
                Err(warning) => warnings.push(warning),
            }
        }

        let toolset = Toolset::from_sources(sources, self.tool_timeout, Some(snapshot.version()));
        info!(
            version = snapshot.version(),
            sources = toolset.sources.len(),
            tools = toolset.len(),
            unavailable = warnings.len(),
            "Resolved toolset"
        );
        Resolution { toolset, warnings }
    }

    /// Resolve `snapshot` against `current`, reusing unchanged live connectors.
    pub async fn reconcile(
        &self,
        current: &Toolset,
        snapshot: &ToolRegistrySnapshot,
    ) -> Reconciliation {
        let mut diff = ToolsetDiff::default();
        let mut kept = BTreeMap::new();
        let mut retired: Vec<Arc<dyn ToolConnector>> = Vec::new();
        let mut to_attach: Vec<(ToolSourceConfig, bool)> = Vec::new();

        for config in snapshot.enabled() {
            match current.sources.get(&config.name) {
                Some(existing)
                    if existing.config.same_connection(config) && existing.connector.is_alive() =>
                {
                    let mut attached = existing.clone();
                    attached.config = config.clone();
                    kept.insert(config.name.clone(), attached);
                    diff.unchanged.push(config.name.clone());
                }
                Some(existing) => {
                    debug!(source = %config.name, "Connection settings changed or connector dead, reattaching");
                    retired.push(Arc::clone(&existing.connector));
                    to_attach.push((config.clone(), true));
                }
                None => to_attach.push((config.clone(), false)),
            }
        }

        for (name, existing) in &current.sources {
            let still_enabled = snapshot.get(name).is_some_and(|c| c.enabled);
            if !still_enabled {
                retired.push(Arc::clone(&existing.connector));
                diff.removed.push(name.clone());
            }
        }

        let results = join_all(to_attach.iter().map(|(c, _)| self.attach(c.clone()))).await;
        for ((config, was_attached), result) in to_attach.into_iter().zip(results) {
            match result {
                Ok(attached) => {
                    if was_attached {
                        diff.reconnected.push(config.name.clone());
                    } else {
                        diff.added.push(config.name.clone());
                    }
                    kept.insert(config.name.clone(), attached);
                }
                Err(warning) => {
                    if was_attached {
                        diff.removed.push(config.name.clone());
                    }
                    diff.warnings.push(warning);
                }
            }
        }

        let toolset = Toolset::from_sources(kept, self.tool_timeout, Some(snapshot.version()));

        let before: BTreeSet<&QualifiedName> = current.handles.keys().collect();
        let after: BTreeSet<&QualifiedName> = toolset.handles.keys().collect();
        diff.added_tools = after.difference(&before).map(|n| (*n).clone()).collect();
        diff.removed_tools = before.difference(&after).map(|n| (*n).clone()).collect();
        diff.normalize();

        Reconciliation {
            toolset,
            diff,
            retired,
        }
    }

    async fn attach(&self, config: ToolSourceConfig) -> Result<AttachedSource, ToolUnavailable> {
        let name = config.name.clone();
        let attempt = async {
            let connector = self
                .factory
                .connect(&config)
                .await
                .map_err(|e| (e.kind(), e.message().to_string()))?;
            match connector.list_operations().await {
                Ok(operations) => Ok(AttachedSource {
                    config,
                    connector,
                    operations,
                }),
                Err(e) => {
                    connector.close().await;
                    Err((
                        ErrorKind::ConnectionError,
                        format!("listing operations failed: {}", e.message),
                    ))
                }
            }
        };

        let outcome = match tokio::time::timeout(self.connect_timeout, attempt).await {
            Ok(outcome) => outcome,
            Err(_) => Err((
                ErrorKind::ConnectionError,
                format!("timed out after {}s", self.connect_timeout.as_secs()),
            )),
        };

        outcome
            .map(|attached| {
                debug!(
                    source = %name,
                    operations = attached.operations.len(),
                    "Attached tool source"
                );
                attached
            })
            .map_err(|(kind, reason)| {
                warn!(source = %name, kind = %kind, error = %reason, "Tool source unavailable");
                ToolUnavailable {
                    source: name,
                    kind,
                    reason,
                }
            })
    }
}
