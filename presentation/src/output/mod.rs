//! Terminal output: event rendering and toolset formatting

pub mod console;
pub mod formatter;
