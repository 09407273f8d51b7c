//! Presentation layer for reagent
//!
//! This crate contains the CLI definition, console event rendering and the
//! interactive chat REPL.

pub mod chat;
pub mod cli;
pub mod output;

// Re-export commonly used types
pub use chat::{ChatRepl, ReplCommand};
pub use cli::commands::Cli;
pub use output::console::{ConsoleEventSink, JsonEventSink, format_record};
pub use output::formatter::ConsoleFormatter;
