//! Tool sources from TOML (`[tools]` section)
//!
//! ```toml
//! [[tools.remote]]
//! name = "flash-calc"
//! transport = "streamable_http"
//! url = "https://tools.example.com/flash/mcp"
//!
//! [[tools.local]]
//! name = "eos-models"
//! transport = "stdio"
//! command = "eos-server"
//! args = ["--stdio"]
//! ```

use reagent_domain::{ConfigError, ToolRegistrySnapshot, ToolSourcesDocument};

/// The `[tools]` section is the two-collection source document itself.
pub type FileToolsConfig = ToolSourcesDocument;

/// Validate the section into a snapshot.
pub fn to_snapshot(tools: &FileToolsConfig) -> Result<ToolRegistrySnapshot, ConfigError> {
    ToolRegistrySnapshot::load(tools)
}
