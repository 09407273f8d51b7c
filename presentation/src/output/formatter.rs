//! Plain-text formatting of toolsets, diffs and session details

use colored::Colorize;
use reagent_application::{AgentSession, Toolset};
use reagent_domain::{ToolRegistrySnapshot, ToolUnavailable, ToolsetDiff};
use std::fmt::Write;

/// Formats results for console display
pub struct ConsoleFormatter;

impl ConsoleFormatter {
    /// Attached sources with their operations, followed by sources that
    /// are configured but not attached.
    pub fn toolset(toolset: &Toolset, snapshot: &ToolRegistrySnapshot) -> String {
        let mut out = String::new();

        if snapshot.is_empty() {
            let _ = writeln!(out, "{}", "No tool sources configured.".dimmed());
            return out;
        }

        for config in snapshot.iter() {
            let status = match (config.enabled, toolset.source(&config.name)) {
                (true, Some(_)) => "attached".green(),
                (true, None) => "unavailable".yellow(),
                (false, _) => "disabled".dimmed(),
            };
            let _ = writeln!(
                out,
                "{} [{}] {} {}",
                config.name.bold(),
                status,
                config.transport.kind_label(),
                config.transport.target().dimmed()
            );
            if let Some(attached) = toolset.source(&config.name) {
                for op in &attached.operations {
                    let _ = writeln!(
                        out,
                        "  {}/{}  {}",
                        config.name,
                        op.name.cyan(),
                        first_line(&op.description).dimmed()
                    );
                }
            }
        }
        let _ = write!(out, "{} tool(s) available", toolset.len());
        out
    }

    pub fn diff(diff: &ToolsetDiff) -> String {
        let mut lines = Vec::new();
        for name in &diff.added {
            lines.push(format!("{} {}", "+".green(), name));
        }
        for name in &diff.reconnected {
            lines.push(format!("{} {} (reconnected)", "~".yellow(), name));
        }
        for name in &diff.removed {
            lines.push(format!("{} {}", "-".red(), name));
        }
        for warning in &diff.warnings {
            lines.push(Self::warning(warning));
        }
        if lines.is_empty() {
            return "Toolset unchanged".dimmed().to_string();
        }
        if !diff.added_tools.is_empty() || !diff.removed_tools.is_empty() {
            lines.push(
                format!(
                    "{} tool(s) added, {} removed",
                    diff.added_tools.len(),
                    diff.removed_tools.len()
                )
                .dimmed()
                .to_string(),
            );
        }
        lines.join("\n")
    }

    pub fn warning(warning: &ToolUnavailable) -> String {
        format!(
            "{} {} unavailable ({}): {}",
            "!".yellow().bold(),
            warning.source,
            warning.kind,
            warning.reason
        )
    }

    pub fn session(session: &AgentSession) -> String {
        let memory = session.memory();
        format!(
            "session  {}\nstatus   {}\nmodel    {}\nmemory   {} ({} turn(s))\ntools    {}",
            session.id(),
            session.status(),
            session.backend_config(),
            if session.memory_mode() { "on" } else { "off" },
            memory.len(),
            session.toolset().len()
        )
    }
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or_default()
}
