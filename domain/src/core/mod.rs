//! Core domain concepts shared across all subdomains.
//!
//! - [`error::ErrorKind`]: stable error tags surfaced to clients
//! - [`error::ConfigError`]: tool-source and model configuration errors
//! - [`ids`]: session, connection and tool-call identifiers

pub mod error;
pub mod ids;
