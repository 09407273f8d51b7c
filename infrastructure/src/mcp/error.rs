//! Error types for the MCP adapter

use reagent_domain::ToolInvocationError;
use thiserror::Error;

/// Result type alias for MCP operations
pub type Result<T> = std::result::Result<T, McpError>;

/// Errors that can occur when talking to an MCP server
#[derive(Error, Debug)]
pub enum McpError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("JSON-RPC error (code {code}): {message}")]
    Rpc { code: i64, message: String },

    #[error("HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid header '{0}'")]
    InvalidHeader(String),

    #[error("transport closed")]
    TransportClosed,
}

impl From<McpError> for ToolInvocationError {
    fn from(err: McpError) -> Self {
        match err {
            McpError::Malformed(_) | McpError::Serialization(_) => {
                ToolInvocationError::malformed(err.to_string())
            }
            McpError::Http(ref e) if e.is_timeout() => {
                ToolInvocationError::new(reagent_domain::InvocationErrorKind::Timeout, err.to_string())
            }
            _ => ToolInvocationError::remote(err.to_string()),
        }
    }
}
