//! Tool domain: sources, registry snapshots, operations and call results.
//!
//! ```text
//! ToolSourcesDocument ──load──▶ ToolRegistrySnapshot ──resolve──▶ toolset
//!      (config file)               (immutable, versioned)     (ToolHandles)
//!                                        ▲
//! ToolSourceInput ──from_input──▶ overrides ──merge──┘
//! ```

pub mod diff;
pub mod entities;
pub mod registry;
pub mod source;
pub mod value_objects;
