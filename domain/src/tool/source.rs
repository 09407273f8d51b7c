//! Tool source descriptors: where a toolset's operations come from.
//!
//! A [`SourceDescriptor`] is the permissive, as-written shape (config file
//! entry or client-supplied map value). [`ToolSourceConfig`] is the validated
//! form the rest of the system works with.

use crate::core::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Which collection of the configuration document an entry came from.
///
/// Entries in the `remote` collection must use an HTTP transport and entries
/// in the `local` collection must use `stdio`. Programmatic input may use
/// either.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Partition {
    Remote,
    Local,
    Any,
}

impl Partition {
    fn label(&self) -> &'static str {
        match self {
            Partition::Remote => "remote",
            Partition::Local => "local",
            Partition::Any => "ad hoc",
        }
    }
}

/// Connection details for one tool source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceTransport {
    /// MCP server reachable over streamable HTTP.
    RemoteHttp {
        url: String,
        /// Forwarded as request headers.
        #[serde(default)]
        env: BTreeMap<String, String>,
    },
    /// MCP server spawned as a child process, spoken to over stdio.
    LocalProcess {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        env: BTreeMap<String, String>,
    },
}

impl SourceTransport {
    pub fn kind_label(&self) -> &'static str {
        match self {
            SourceTransport::RemoteHttp { .. } => "remote-http",
            SourceTransport::LocalProcess { .. } => "local-process",
        }
    }

    /// Short human-readable target (URL or command line).
    pub fn target(&self) -> String {
        match self {
            SourceTransport::RemoteHttp { url, .. } => url.clone(),
            SourceTransport::LocalProcess { command, args, .. } => {
                if args.is_empty() {
                    command.clone()
                } else {
                    format!("{} {}", command, args.join(" "))
                }
            }
        }
    }
}

/// A validated tool source. `name` is the stable key within a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolSourceConfig {
    pub name: String,
    pub transport: SourceTransport,
    pub enabled: bool,
    pub description: String,
}

impl ToolSourceConfig {
    /// Validate a descriptor into a config.
    pub fn from_descriptor(
        name: &str,
        descriptor: &SourceDescriptor,
        partition: Partition,
    ) -> Result<Self, ConfigError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ConfigError::EmptyName);
        }
        if name.contains('/') {
            return Err(ConfigError::InvalidName(name.to_string()));
        }

        let kind = match descriptor.transport.as_deref() {
            Some(t) => TransportKind::parse(t).ok_or_else(|| ConfigError::UnknownTransport {
                name: name.to_string(),
                transport: t.to_string(),
            })?,
            None => match partition {
                Partition::Remote => TransportKind::Remote,
                Partition::Local => TransportKind::Local,
                Partition::Any if descriptor.url.is_some() => TransportKind::Remote,
                Partition::Any if descriptor.command.is_some() => TransportKind::Local,
                Partition::Any => {
                    return Err(ConfigError::MissingField {
                        name: name.to_string(),
                        field: "transport",
                    });
                }
            },
        };

        let allowed = match partition {
            Partition::Remote => kind == TransportKind::Remote,
            Partition::Local => kind == TransportKind::Local,
            Partition::Any => true,
        };
        if !allowed {
            return Err(ConfigError::TransportMismatch {
                name: name.to_string(),
                transport: descriptor.transport.clone().unwrap_or_default(),
                partition: partition.label(),
            });
        }

        let transport = match kind {
            TransportKind::Remote => SourceTransport::RemoteHttp {
                url: required(name, "url", descriptor.url.as_deref())?,
                env: descriptor.env.clone(),
            },
            TransportKind::Local => SourceTransport::LocalProcess {
                command: required(name, "command", descriptor.command.as_deref())?,
                args: descriptor.args.clone(),
                env: descriptor.env.clone(),
            },
        };

        Ok(Self {
            name: name.to_string(),
            transport,
            enabled: descriptor.enabled,
            description: descriptor.description.clone(),
        })
    }

    pub fn is_remote(&self) -> bool {
        matches!(self.transport, SourceTransport::RemoteHttp { .. })
    }

    /// Same connection target and settings, ignoring `enabled`/`description`.
    ///
    /// Two configs that connect identically can share a live connector
    /// across reconfigurations.
    pub fn same_connection(&self, other: &ToolSourceConfig) -> bool {
        self.name == other.name && self.transport == other.transport
    }

    /// The descriptor that validates back into this config.
    pub fn to_descriptor(&self) -> SourceDescriptor {
        let mut descriptor = match &self.transport {
            SourceTransport::RemoteHttp { url, env } => SourceDescriptor {
                env: env.clone(),
                ..SourceDescriptor::remote(url.clone())
            },
            SourceTransport::LocalProcess { command, args, env } => SourceDescriptor {
                env: env.clone(),
                ..SourceDescriptor::stdio(command.clone(), args.clone())
            },
        };
        descriptor.enabled = self.enabled;
        descriptor.description = self.description.clone();
        descriptor
    }
}

fn required(name: &str, field: &'static str, value: Option<&str>) -> Result<String, ConfigError> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(ConfigError::MissingField {
            name: name.to_string(),
            field,
        }),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TransportKind {
    Remote,
    Local,
}

impl TransportKind {
    fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "stdio" => Some(TransportKind::Local),
            "streamable_http" | "streamable-http" | "http" | "sse" => Some(TransportKind::Remote),
            _ => None,
        }
    }
}

/// The as-written shape of a tool source, before validation.
///
/// Used both for configuration file entries (see [`SourceEntry`]) and for
/// programmatic tool maps supplied by a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceDescriptor {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transport: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    pub enabled: bool,
    pub description: String,
}

impl Default for SourceDescriptor {
    fn default() -> Self {
        Self {
            transport: None,
            url: None,
            command: None,
            args: Vec::new(),
            env: BTreeMap::new(),
            enabled: true,
            description: String::new(),
        }
    }
}

impl SourceDescriptor {
    pub fn remote(url: impl Into<String>) -> Self {
        Self {
            transport: Some("streamable_http".to_string()),
            url: Some(url.into()),
            ..Default::default()
        }
    }

    pub fn stdio(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            transport: Some("stdio".to_string()),
            command: Some(command.into()),
            args,
            ..Default::default()
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// One entry of a configuration document collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceEntry {
    pub name: String,
    #[serde(flatten)]
    pub descriptor: SourceDescriptor,
}
