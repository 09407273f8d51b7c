//! MCP (Model Context Protocol) client adapter.
//!
//! Tool sources are MCP servers reached either as a spawned child process
//! (newline-delimited JSON-RPC on stdin/stdout) or over streamable HTTP.
//! Both transports share the same handshake and tool mapping in
//! [`McpConnector`].

pub mod connector;
pub mod error;
pub mod factory;
pub mod http;
pub mod protocol;
pub mod stdio;
pub mod transport;

pub use connector::McpConnector;
pub use error::McpError;
pub use factory::McpConnectorFactory;
pub use http::HttpTransport;
pub use stdio::{ChildProcess, RpcChannel, spawn_process};
pub use transport::McpTransport;
