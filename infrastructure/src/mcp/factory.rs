//! [`ConnectorFactory`] for MCP tool sources.

use super::connector::McpConnector;
use super::http::HttpTransport;
use super::stdio::spawn_process;
use async_trait::async_trait;
use reagent_application::{ConnectError, ConnectorFactory, ToolConnector};
use reagent_domain::{SourceTransport, ToolSourceConfig};
use std::sync::Arc;
use tracing::{debug, warn};

/// Attaches to MCP servers over stdio or streamable HTTP.
#[derive(Debug, Clone)]
pub struct McpConnectorFactory {
    http: reqwest::Client,
    client_name: String,
}

impl McpConnectorFactory {
    /// `client_name` is announced to servers in `initialize`.
    pub fn new(client_name: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            client_name: client_name.into(),
        }
    }

    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }
}

impl Default for McpConnectorFactory {
    fn default() -> Self {
        Self::new("reagent")
    }
}

#[async_trait]
impl ConnectorFactory for McpConnectorFactory {
    async fn connect(
        &self,
        config: &ToolSourceConfig,
    ) -> Result<Arc<dyn ToolConnector>, ConnectError> {
        let name = config.name.as_str();
        debug!(
            source = %name,
            transport = config.transport.kind_label(),
            target = %config.transport.target(),
            "Connecting tool source"
        );

        let connector = match &config.transport {
            SourceTransport::LocalProcess { command, args, env } => {
                let (process, channel) = spawn_process(name, command, args, env)
                    .map_err(|e| ConnectError::spawn(name, e.to_string()))?;
                McpConnector::handshake(name, &self.client_name, Arc::new(channel), Some(process))
                    .await
            }
            SourceTransport::RemoteHttp { url, env } => {
                let transport = HttpTransport::new(self.http.clone(), url.clone(), env)
                    .map_err(|e| ConnectError::connection(name, e.to_string()))?;
                McpConnector::handshake(name, &self.client_name, Arc::new(transport), None).await
            }
        };

        match connector {
            Ok(connector) => Ok(Arc::new(connector)),
            Err(e) => {
                warn!(source = %name, error = %e, "Tool source handshake failed");
                Err(ConnectError::connection(name, e.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reagent_domain::{ErrorKind, Partition, SourceDescriptor};

    fn config(name: &str, descriptor: SourceDescriptor) -> ToolSourceConfig {
        ToolSourceConfig::from_descriptor(name, &descriptor, Partition::Any).unwrap()
    }

    #[tokio::test]
    async fn missing_command_is_a_spawn_error() {
        let factory = McpConnectorFactory::default();
        let cfg = config(
            "ghost",
            SourceDescriptor::stdio("/nonexistent/reagent-tool-server", vec![]),
        );

        let err = factory.connect(&cfg).await.err().expect("expected connect to fail");
        assert_eq!(err.kind(), ErrorKind::SpawnError);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn process_that_exits_is_a_connection_error() {
        let factory = McpConnectorFactory::default();
        let cfg = config("quitter", SourceDescriptor::stdio("true", vec![]));

        let err = factory.connect(&cfg).await.err().expect("expected connect to fail");
        assert_eq!(err.kind(), ErrorKind::ConnectionError);
    }

    #[tokio::test]
    async fn unreachable_url_is_a_connection_error() {
        let factory = McpConnectorFactory::default();
        let cfg = config("offline", SourceDescriptor::remote("http://127.0.0.1:9/mcp"));

        let err = factory.connect(&cfg).await.err().expect("expected connect to fail");
        assert_eq!(err.kind(), ErrorKind::ConnectionError);
    }
}
