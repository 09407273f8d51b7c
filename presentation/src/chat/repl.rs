//! REPL (Read-Eval-Print Loop) over one supervised session

use super::commands::ReplCommand;
use crate::output::formatter::ConsoleFormatter;
use colored::Colorize;
use reagent_application::{
    EventMultiplexer, EventSink, RunSummary, SessionStarted, SessionSupervisor, SupervisorError,
    ToolSelection,
};
use reagent_domain::{
    AgentEvent, ConnectionId, ErrorKind, ModelBackendConfig, SessionId, ToolSourceInput,
};
use reedline::{DefaultPrompt, DefaultPromptSegment, FileBackedHistory, Reedline, Signal};
use std::sync::Arc;
use tracing::debug;

const HISTORY_SIZE: usize = 1000;

/// Interactive chat REPL
pub struct ChatRepl {
    supervisor: Arc<SessionSupervisor>,
    multiplexer: EventMultiplexer,
    connection: ConnectionId,
    session_id: SessionId,
    backend: ModelBackendConfig,
    agent_name: String,
}

enum Flow {
    Continue,
    Quit,
}

impl ChatRepl {
    /// `started` is the session already registered for `connection`.
    pub fn new(
        supervisor: Arc<SessionSupervisor>,
        sink: Arc<dyn EventSink>,
        connection: ConnectionId,
        started: &SessionStarted,
        backend: ModelBackendConfig,
    ) -> Self {
        let agent_name = supervisor.params().agent_name.clone();
        Self {
            supervisor,
            multiplexer: EventMultiplexer::new(sink),
            connection,
            session_id: started.session_id,
            backend,
            agent_name,
        }
    }

    /// Run the interactive REPL until `/quit` or Ctrl-D.
    pub async fn run(&mut self) -> std::io::Result<()> {
        let mut editor = Reedline::create();

        // Try to load history
        if let Some(path) = dirs::data_dir().map(|p| p.join("reagent").join("history.txt")) {
            if let Some(parent) = path.parent() {
                let _ = std::fs::create_dir_all(parent);
            }
            match FileBackedHistory::with_file(HISTORY_SIZE, path) {
                Ok(history) => editor = editor.with_history(Box::new(history)),
                Err(e) => debug!(error = %e, "History unavailable"),
            }
        }

        let prompt = DefaultPrompt::new(
            DefaultPromptSegment::Basic(self.agent_name.clone()),
            DefaultPromptSegment::Empty,
        );

        self.print_welcome();

        loop {
            let signal = tokio::task::block_in_place(|| editor.read_line(&prompt))?;

            match signal {
                Signal::Success(line) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    if line.starts_with('/') {
                        match ReplCommand::parse(line) {
                            Ok(command) => {
                                if let Flow::Quit = self.execute(command).await {
                                    break;
                                }
                            }
                            Err(message) => println!("{}", message),
                        }
                        continue;
                    }
                    self.ask(line).await;
                }
                Signal::CtrlC => continue,
                Signal::CtrlD => break,
            }
        }

        println!("Bye!");
        self.supervisor.disconnect(self.connection).await;
        Ok(())
    }

    fn print_welcome(&self) {
        println!();
        println!("{} {}", self.agent_name.bold().cyan(), format!("({})", self.backend).dimmed());
        if let Some(session) = self.supervisor.session(self.session_id) {
            println!("{} tool(s) available. Type /help for commands.", session.toolset().len());
        }
        println!();
    }

    /// Send one message and render its events. Ctrl-C cancels the run.
    async fn ask(&self, text: &str) {
        let stream = match self.supervisor.send_message(self.session_id, text).await {
            Ok(stream) => stream,
            Err(e) => {
                report(&e);
                return;
            }
        };

        let forward = self.multiplexer.forward(stream);
        tokio::pin!(forward);
        let summary: RunSummary = loop {
            tokio::select! {
                summary = &mut forward => break summary,
                _ = tokio::signal::ctrl_c() => {
                    let _ = self.supervisor.cancel(self.session_id);
                }
            }
        };

        if let Some(AgentEvent::SessionError {
            kind: ErrorKind::SessionError,
            ..
        }) = summary.terminal
        {
            println!(
                "{}",
                "The session was closed. Fix the problem, then use /clear or /model.".yellow()
            );
        }
    }

    async fn execute(&mut self, command: ReplCommand) -> Flow {
        let result = match command {
            ReplCommand::Quit => return Flow::Quit,
            ReplCommand::Help => {
                println!("{}", ReplCommand::help());
                Ok(())
            }
            ReplCommand::Tools => self.show_tools(),
            ReplCommand::Enable(source) => self.set_enabled(&source, true).await,
            ReplCommand::Disable(source) => self.set_enabled(&source, false).await,
            ReplCommand::Memory(mode) => self.memory(mode),
            ReplCommand::Session => match self.supervisor.session(self.session_id) {
                Some(session) => {
                    println!("{}", ConsoleFormatter::session(&session));
                    Ok(())
                }
                None => Err(SupervisorError::UnknownSession(self.session_id.to_string())),
            },
            ReplCommand::Model(spec) => self.switch_model(&spec).await,
            ReplCommand::Clear => self.rebuild(self.backend.clone()).await,
        };
        if let Err(e) = result {
            report(&e);
        }
        Flow::Continue
    }

    fn show_tools(&self) -> Result<(), SupervisorError> {
        let snapshot = self.supervisor.current_snapshot(self.session_id)?;
        let session = self
            .supervisor
            .session(self.session_id)
            .ok_or_else(|| SupervisorError::UnknownSession(self.session_id.to_string()))?;
        println!("{}", ConsoleFormatter::toolset(&session.toolset(), &snapshot));
        Ok(())
    }

    async fn set_enabled(&self, source: &str, enabled: bool) -> Result<(), SupervisorError> {
        let snapshot = self.supervisor.current_snapshot(self.session_id)?;
        let Some(config) = snapshot.get(source) else {
            println!("No tool source named '{}'. See /tools.", source);
            return Ok(());
        };
        let mut descriptor = config.to_descriptor();
        descriptor.enabled = enabled;

        let mut input = ToolSourceInput::new();
        input.insert(source.to_string(), descriptor);
        let diff = self
            .supervisor
            .update_tools(self.session_id, ToolSelection::Overrides(input))
            .await?;
        println!("{}", ConsoleFormatter::diff(&diff));
        Ok(())
    }

    fn memory(&self, mode: Option<bool>) -> Result<(), SupervisorError> {
        let session = self
            .supervisor
            .session(self.session_id)
            .ok_or_else(|| SupervisorError::UnknownSession(self.session_id.to_string()))?;
        if let Some(enabled) = mode {
            session.set_memory_mode(enabled);
        }
        println!(
            "Memory {} ({} turn(s) remembered)",
            if session.memory_mode() { "on" } else { "off" },
            session.memory().len()
        );
        Ok(())
    }

    async fn switch_model(&mut self, spec: &str) -> Result<(), SupervisorError> {
        let mut backend = ModelBackendConfig::parse_spec(spec)?
            .with_temperature(self.backend.temperature)
            .with_max_tokens(self.backend.max_tokens);
        if backend.provider == self.backend.provider {
            backend.base_url = self.backend.base_url.clone();
        }
        self.rebuild(backend).await
    }

    /// Replace the session: new id, empty memory, same tool sources.
    async fn rebuild(&mut self, backend: ModelBackendConfig) -> Result<(), SupervisorError> {
        let started = self
            .supervisor
            .update_backend(self.session_id, backend.clone())
            .await?;
        self.session_id = started.session_id;
        self.backend = backend;
        println!(
            "New session {} on {}",
            started.session_id.to_string().dimmed(),
            self.backend
        );
        for warning in &started.diff.warnings {
            println!("{}", ConsoleFormatter::warning(warning));
        }
        Ok(())
    }
}

fn report(error: &SupervisorError) {
    println!("{} {}: {}", "Error".red().bold(), error.kind(), error);
}
