//! Versioned, immutable snapshots of the tool-source registry.
//!
//! Every edit produces a new [`ToolRegistrySnapshot`]; existing snapshots are
//! never mutated, so sessions can reconfigure against a specific version
//! while the registry keeps moving.

use super::source::{Partition, SourceDescriptor, SourceEntry, ToolSourceConfig};
use crate::core::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

static SNAPSHOT_VERSION: AtomicU64 = AtomicU64::new(1);

fn next_version() -> u64 {
    SNAPSHOT_VERSION.fetch_add(1, Ordering::SeqCst)
}

/// The two-collection tool source document found in configuration.
///
/// ```toml
/// [[tools.remote]]
/// name = "eos-models"
/// transport = "streamable_http"
/// url = "http://127.0.0.1:8000/mcp"
///
/// [[tools.local]]
/// name = "flash-calc"
/// transport = "stdio"
/// command = "python"
/// args = ["-m", "flash_calc.server"]
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolSourcesDocument {
    pub remote: Vec<SourceEntry>,
    pub local: Vec<SourceEntry>,
}

/// Client-supplied tool map: source name to connection descriptor.
pub type ToolSourceInput = BTreeMap<String, SourceDescriptor>;

/// An immutable, versioned mapping from source name to [`ToolSourceConfig`].
///
/// Cloning is cheap and clones share the same version.
#[derive(Debug, Clone)]
pub struct ToolRegistrySnapshot {
    version: u64,
    sources: Arc<BTreeMap<String, ToolSourceConfig>>,
}

impl ToolRegistrySnapshot {
    /// A snapshot with no sources ("no tools").
    pub fn empty() -> Self {
        Self::from_sources(BTreeMap::new())
    }

    fn from_sources(sources: BTreeMap<String, ToolSourceConfig>) -> Self {
        Self {
            version: next_version(),
            sources: Arc::new(sources),
        }
    }

    /// Validate a configuration document into a snapshot.
    ///
    /// Fails on the first duplicate name, unknown transport or missing field.
    pub fn load(document: &ToolSourcesDocument) -> Result<Self, ConfigError> {
        let mut sources = BTreeMap::new();
        let entries = document
            .remote
            .iter()
            .map(|e| (e, Partition::Remote))
            .chain(document.local.iter().map(|e| (e, Partition::Local)));

        for (entry, partition) in entries {
            let config = ToolSourceConfig::from_descriptor(&entry.name, &entry.descriptor, partition)?;
            if sources.contains_key(&config.name) {
                return Err(ConfigError::DuplicateName(config.name));
            }
            sources.insert(config.name.clone(), config);
        }

        Ok(Self::from_sources(sources))
    }

    /// Validate a client-supplied tool map into a snapshot.
    pub fn from_input(input: &ToolSourceInput) -> Result<Self, ConfigError> {
        let mut sources = BTreeMap::new();
        for (name, descriptor) in input {
            let config = ToolSourceConfig::from_descriptor(name, descriptor, Partition::Any)?;
            // Names that differ only by surrounding whitespace collapse to the same key.
            if sources.contains_key(&config.name) {
                return Err(ConfigError::DuplicateName(config.name));
            }
            sources.insert(config.name.clone(), config);
        }
        Ok(Self::from_sources(sources))
    }

    /// New snapshot where `overrides` replace `base` entries of the same name.
    pub fn merge(base: &ToolRegistrySnapshot, overrides: &ToolRegistrySnapshot) -> Self {
        let mut sources = (*base.sources).clone();
        for (name, config) in overrides.sources.iter() {
            sources.insert(name.clone(), config.clone());
        }
        Self::from_sources(sources)
    }

    /// New snapshot with one source's `enabled` flag changed.
    ///
    /// Returns `None` when no source has that name.
    pub fn with_enabled(&self, name: &str, enabled: bool) -> Option<Self> {
        let mut sources = (*self.sources).clone();
        sources.get_mut(name)?.enabled = enabled;
        Some(Self::from_sources(sources))
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn get(&self, name: &str) -> Option<&ToolSourceConfig> {
        self.sources.get(name)
    }

    /// All sources in name order.
    pub fn iter(&self) -> impl Iterator<Item = &ToolSourceConfig> {
        self.sources.values()
    }

    /// Enabled sources in name order.
    pub fn enabled(&self) -> impl Iterator<Item = &ToolSourceConfig> {
        self.sources.values().filter(|s| s.enabled)
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}
