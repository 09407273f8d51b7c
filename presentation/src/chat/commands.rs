//! Slash commands understood by the REPL

/// A parsed `/command`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    Tools,
    Enable(String),
    Disable(String),
    /// `None` shows the memory state, `Some` switches memory mode.
    Memory(Option<bool>),
    Session,
    /// `provider:name`
    Model(String),
    Clear,
    Help,
    Quit,
}

impl ReplCommand {
    pub fn parse(line: &str) -> Result<Self, String> {
        let mut parts = line.split_whitespace();
        let head = parts.next().unwrap_or_default();
        let arg = parts.next();
        if parts.next().is_some() {
            return Err(format!("Too many arguments for {}", head));
        }

        let required = |what: &str| {
            arg.map(str::to_string)
                .ok_or_else(|| format!("Usage: {} <{}>", head, what))
        };

        match head {
            "/tools" => Ok(ReplCommand::Tools),
            "/enable" => required("source").map(ReplCommand::Enable),
            "/disable" => required("source").map(ReplCommand::Disable),
            "/memory" => match arg {
                None => Ok(ReplCommand::Memory(None)),
                Some("on") => Ok(ReplCommand::Memory(Some(true))),
                Some("off") => Ok(ReplCommand::Memory(Some(false))),
                Some(other) => Err(format!("Usage: /memory [on|off] (got '{}')", other)),
            },
            "/session" => Ok(ReplCommand::Session),
            "/model" => required("provider:name").map(ReplCommand::Model),
            "/clear" => Ok(ReplCommand::Clear),
            "/help" | "/h" | "/?" => Ok(ReplCommand::Help),
            "/quit" | "/exit" | "/q" => Ok(ReplCommand::Quit),
            other => Err(format!("Unknown command: {} (type /help)", other)),
        }
    }

    pub fn help() -> &'static str {
        "Commands:
  /tools                  List tool sources and operations
  /enable <source>        Enable a configured tool source
  /disable <source>       Disable a tool source
  /memory [on|off]        Show or switch conversation memory
  /session                Show session details
  /model <provider:name>  Switch model (starts a new session)
  /clear                  Start a new session with empty memory
  /help                   Show this help
  /quit                   Exit

Ctrl-C during a run cancels it."
    }
}
