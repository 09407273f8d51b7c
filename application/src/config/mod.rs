//! Application-level configuration.
//!
//! - [`RuntimeParams`]: timeouts, tool-turn limit, event buffer, agent identity

pub mod runtime_params;

pub use runtime_params::RuntimeParams;
