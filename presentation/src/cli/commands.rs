//! CLI command definitions

use clap::Parser;
use std::path::PathBuf;

/// CLI arguments for reagent
#[derive(Parser, Debug)]
#[command(name = "reagent")]
#[command(author, version, about = "Agent runtime with hot-swappable MCP tool sources")]
#[command(long_about = r#"
reagent runs a tool-using LLM agent against MCP tool sources. Sources can be
remote (streamable HTTP) or local (a spawned stdio process) and can be enabled
or disabled between messages without restarting the agent.

Configuration files are loaded from (lowest priority first):
1. ~/.config/reagent/config.toml          Global config
2. ./reagent.toml or ./.reagent.toml      Project-level config
3. --config <path>                        Explicit config file
4. REAGENT_* environment variables        (e.g. REAGENT_MODEL__NAME)

Example:
  reagent "What is the compressibility factor of CO2 at 300 K and 50 bar?"
  reagent --model anthropic:claude-sonnet-4-5 --memory
  reagent --list-tools
"#)]
pub struct Cli {
    /// Message to send. Without it the interactive REPL starts.
    pub message: Option<String>,

    /// Model to use, as provider:name (overrides [model] in config)
    #[arg(short, long, value_name = "PROVIDER:NAME")]
    pub model: Option<String>,

    /// Keep conversation memory between messages
    #[arg(long)]
    pub memory: bool,

    /// Start without any tool sources
    #[arg(long)]
    pub no_tools: bool,

    /// Verbosity level (-v = info, -vv = debug, -vvv = trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Write diagnostics to this file as well
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Print events as JSON lines instead of formatted text
    #[arg(long)]
    pub json: bool,

    /// Suppress spinners
    #[arg(short, long)]
    pub quiet: bool,

    /// Path to configuration file
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Check configuration and backend credentials, then exit
    #[arg(long)]
    pub check: bool,

    /// Resolve the configured tool sources, print the toolset and exit
    #[arg(long)]
    pub list_tools: bool,

    /// Show configuration file locations and exit
    #[arg(long)]
    pub show_config: bool,
}
