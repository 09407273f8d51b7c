//! Model backend port
//!
//! A model backend turns a conversation plus a tool catalogue into the next
//! model turn. The session's run loop drives it repeatedly, executing the
//! requested tools between turns.

use async_trait::async_trait;
use reagent_domain::{ErrorKind, LlmResponse, Message, ModelBackendConfig, ToolSpec};
use std::sync::Arc;
use thiserror::Error;

/// Errors returned by a model backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// Credentials missing or rejected. Unrecoverable for the session.
    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("request failed: {0}")]
    RequestFailed(String),

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("request timed out")]
    Timeout,
}

impl BackendError {
    /// Errors after which the session cannot continue.
    pub fn is_unrecoverable(&self) -> bool {
        matches!(self, BackendError::Authentication(_))
    }

    pub fn kind(&self) -> ErrorKind {
        if self.is_unrecoverable() {
            ErrorKind::SessionError
        } else {
            ErrorKind::BackendError
        }
    }
}

/// Input for one model turn.
#[derive(Debug, Clone, Default)]
pub struct TurnRequest {
    pub system_prompt: Option<String>,
    /// Conversation so far, oldest first. Ends with a user or tool message.
    pub messages: Vec<Message>,
    /// Tools the model may call, keyed by qualified name.
    pub tools: Vec<ToolSpec>,
}

/// One configured model (provider + model + sampling parameters).
#[async_trait]
pub trait ModelBackend: Send + Sync {
    fn config(&self) -> &ModelBackendConfig;

    /// Produce the next turn.
    async fn next_turn(&self, request: TurnRequest) -> Result<LlmResponse, BackendError>;

    /// Cheap reachability and credential check.
    async fn ping(&self) -> Result<(), BackendError> {
        let request = TurnRequest {
            system_prompt: None,
            messages: vec![Message::user("ping")],
            tools: Vec::new(),
        };
        self.next_turn(request).await.map(|_| ())
    }
}

/// Builds backends from configuration.
pub trait BackendFactory: Send + Sync {
    fn create(&self, config: &ModelBackendConfig) -> Result<Arc<dyn ModelBackend>, BackendError>;
}
