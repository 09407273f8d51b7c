//! Use cases
//!
//! Application-level operations that orchestrate domain logic:
//!
//! - [`resolve_tools`]: snapshot → connected toolset, and reconciliation
//! - [`agent_session`]: runs and reconfiguration of one session
//! - [`supervisor`]: one session per client connection
//! - [`multiplexer`]: ordered, cancellable delivery of run events

pub mod agent_session;
pub mod multiplexer;
pub mod resolve_tools;
pub mod supervisor;

#[cfg(test)]
pub(crate) mod test_support;
