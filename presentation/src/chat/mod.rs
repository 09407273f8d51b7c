//! Interactive chat module
//!
//! Provides a reedline-based REPL over one supervised session.

mod commands;
mod repl;

pub use commands::ReplCommand;
pub use repl::ChatRepl;
