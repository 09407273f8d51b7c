//! CLI entrypoint for reagent
//!
//! This is the main binary that wires together all layers using
//! dependency injection.

use anyhow::{Context, Result, anyhow, bail};
use clap::Parser;
use reagent_application::{
    BackendFactory, ConversationLogger, EventMultiplexer, EventSink, NoConversationLogger,
    SessionSupervisor, ToolSelection,
};
use reagent_domain::{ConnectionId, ModelBackendConfig, SessionId, ToolSourceInput};
use reagent_infrastructure::{
    ConfigLoader, FileConfig, HttpBackendFactory, JsonlConversationLogger, McpConnectorFactory,
};
use reagent_presentation::{ChatRepl, Cli, ConsoleEventSink, ConsoleFormatter, JsonEventSink};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.show_config {
        println!("Configuration files (lowest priority first):");
        for (source, exists) in ConfigLoader::describe_sources(cli.config.as_ref())
            .into_iter()
            .rev()
        {
            println!("  [{}] {}", if exists { "x" } else { " " }, source);
        }
        return Ok(());
    }

    let config = ConfigLoader::load(cli.config.as_ref())
        .map_err(|e| anyhow!("failed to load configuration: {}", e))?;

    let log_file = cli
        .log_file
        .clone()
        .or_else(|| config.logging.file.as_ref().map(PathBuf::from));
    let _guard = init_logging(cli.verbose, log_file.as_deref())?;

    info!("Starting reagent");

    let mut has_errors = false;
    for issue in config.validate() {
        if issue.is_error() {
            has_errors = true;
            eprintln!("config error: {}", issue);
        } else {
            warn!(field = %issue.field, "{}", issue.message);
        }
    }
    if has_errors {
        bail!("configuration is invalid");
    }

    let backend = backend_config(&cli, &config)?;
    let base = config.tool_snapshot()?;
    let params = config.runtime.to_params(&config.agent);

    // === Dependency Injection ===
    let mut backends = HttpBackendFactory::new();
    if let Some(var) = &config.model.api_key_env {
        backends = backends.with_api_key_env(backend.provider, var.clone());
    }
    let backends: Arc<dyn BackendFactory> = Arc::new(backends);

    if cli.check {
        return check(&config, &backend, backends.as_ref()).await;
    }

    let logger: Arc<dyn ConversationLogger> = match &config.logging.transcript {
        Some(path) => match JsonlConversationLogger::new(path) {
            Some(logger) => Arc::new(logger),
            None => Arc::new(NoConversationLogger),
        },
        None => Arc::new(NoConversationLogger),
    };
    let connectors = Arc::new(McpConnectorFactory::new(params.agent_name.clone()));
    let supervisor = Arc::new(
        SessionSupervisor::new(connectors, backends, params, base).with_logger(logger),
    );

    let tools = if cli.no_tools {
        ToolSelection::Replace(ToolSourceInput::new())
    } else {
        ToolSelection::Inherit
    };
    let memory = cli.memory || config.agent.memory;
    let connection = ConnectionId::next();

    let started = supervisor
        .start_session(connection, backend.clone(), tools, memory)
        .await
        .context("failed to start session")?;
    for warning in &started.diff.warnings {
        eprintln!("{}", ConsoleFormatter::warning(warning));
    }

    let result = if cli.list_tools {
        list_tools(&supervisor, started.session_id)
    } else if let Some(message) = &cli.message {
        one_shot(&supervisor, started.session_id, message, sink(&cli)).await
    } else {
        let mut repl = ChatRepl::new(
            Arc::clone(&supervisor),
            sink(&cli),
            connection,
            &started,
            backend,
        );
        repl.run().await.context("REPL failed")
    };

    supervisor.shutdown().await;
    result
}

fn init_logging(verbose: u8, log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let filter = || match std::env::var("RUST_LOG") {
        Ok(directives) if !directives.is_empty() => EnvFilter::new(directives),
        _ => EnvFilter::new(match verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace", // -vvv or more
        }),
    };

    let console = fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(filter());

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let name = path
                .file_name()
                .with_context(|| format!("invalid log file path: {}", path.display()))?;
            std::fs::create_dir_all(dir)
                .with_context(|| format!("cannot create log directory {}", dir.display()))?;
            let (writer, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));
            let layer = fmt::layer()
                .with_ansi(false)
                .with_writer(writer)
                .with_filter(filter());
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(console)
        .with(file_layer)
        .init();
    Ok(guard)
}

/// `--model provider:name` replaces the configured model but keeps its
/// sampling parameters.
fn backend_config(cli: &Cli, config: &FileConfig) -> Result<ModelBackendConfig> {
    let configured = config.model.to_backend_config()?;
    let Some(spec) = &cli.model else {
        return Ok(configured);
    };
    let mut backend = ModelBackendConfig::parse_spec(spec)?
        .with_temperature(configured.temperature)
        .with_max_tokens(configured.max_tokens);
    if backend.provider == configured.provider {
        backend.base_url = configured.base_url;
    }
    Ok(backend)
}

fn sink(cli: &Cli) -> Arc<dyn EventSink> {
    if cli.json {
        Arc::new(JsonEventSink)
    } else if cli.quiet {
        Arc::new(ConsoleEventSink::quiet())
    } else {
        Arc::new(ConsoleEventSink::new())
    }
}

async fn check(
    config: &FileConfig,
    backend: &ModelBackendConfig,
    backends: &dyn BackendFactory,
) -> Result<()> {
    let sources = config.tool_snapshot()?;
    println!("config   ok ({} tool source(s))", sources.len());

    let model = backends
        .create(backend)
        .with_context(|| format!("cannot create backend {}", backend))?;
    model
        .ping()
        .await
        .with_context(|| format!("backend {} did not answer", backend))?;
    println!("backend  ok ({})", backend);
    Ok(())
}

fn list_tools(supervisor: &SessionSupervisor, session_id: SessionId) -> Result<()> {
    let session = supervisor
        .session(session_id)
        .context("session disappeared")?;
    let snapshot = supervisor.current_snapshot(session_id)?;
    println!("{}", ConsoleFormatter::toolset(&session.toolset(), &snapshot));
    Ok(())
}

async fn one_shot(
    supervisor: &SessionSupervisor,
    session_id: SessionId,
    message: &str,
    sink: Arc<dyn EventSink>,
) -> Result<()> {
    let stream = supervisor.send_message(session_id, message).await?;
    let multiplexer = EventMultiplexer::new(sink);

    let forward = multiplexer.forward(stream);
    tokio::pin!(forward);
    let summary = loop {
        tokio::select! {
            summary = &mut forward => break summary,
            _ = tokio::signal::ctrl_c() => {
                let _ = supervisor.cancel(session_id);
            }
        }
    };

    if summary.answer().is_none() {
        bail!("run ended without an answer");
    }
    Ok(())
}
