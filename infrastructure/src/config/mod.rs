//! Configuration file loading for reagent
//!
//! This module handles file I/O and merging of configuration from multiple
//! sources. The priority order (highest to lowest):
//!
//! 1. `REAGENT_*` environment variables, nested with `__`
//! 2. `--config <path>` specified file
//! 3. Project root: `./reagent.toml` or `./.reagent.toml`
//! 4. Global: `<config dir>/reagent/config.toml`
//! 5. Default values

mod file_config;
mod loader;

pub use file_config::{
    ConfigIssue, FileAgentConfig, FileConfig, FileLoggingConfig, FileModelConfig,
    FileRuntimeConfig, FileToolsConfig, Severity,
};
pub use loader::ConfigLoader;
