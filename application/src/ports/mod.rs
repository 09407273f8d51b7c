//! Port definitions (interfaces for external adapters)
//!
//! Ports define the contracts that infrastructure and presentation adapters
//! implement: tool connectors, model backends, event sinks and the
//! transcript logger.

pub mod conversation_logger;
pub mod event_sink;
pub mod model_backend;
pub mod tool_connector;
