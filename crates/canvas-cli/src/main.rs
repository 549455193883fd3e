//! canvas-cli - send one message to the canvas completion service and stream the answer.

use anyhow::{bail, Context, Result};
use canvas_cli::{config, logging, output};
use canvas_core::{AppStateStore, ConversationStore, CycleOutcome, MemoryEditor, SessionController};
use clap::Parser;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use config::Config;
use logging::{LogConfig, LogFormat};
use output::StreamPrinter;

/// Streaming client for the canvas completion service.
#[derive(Parser, Debug)]
#[command(name = "canvas-cli")]
#[command(about = "Send a message to the canvas completion service and stream the answer")]
#[command(version)]
struct Cli {
    /// Message to send
    message: String,

    /// Path to config file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override the WebSocket endpoint from config
    #[arg(short, long)]
    endpoint: Option<String>,

    /// Override the request timeout in milliseconds (0 disables it)
    #[arg(long, value_name = "MS")]
    timeout_ms: Option<u64>,

    /// Open this file as the current document before sending
    #[arg(short, long, value_name = "FILE")]
    artifact: Option<PathBuf>,

    /// Write the current document here once the cycle ends
    #[arg(short = 'o', long, value_name = "FILE")]
    artifact_out: Option<PathBuf>,

    /// Enable verbose logging (INFO level for all targets)
    #[arg(short, long)]
    verbose: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Enable trace logging (every received frame)
    #[arg(long)]
    trace: bool,

    /// Quiet mode (WARN and ERROR only)
    #[arg(short, long)]
    quiet: bool,

    /// Set log level for specific targets (e.g., "cycle=debug" or "transport=trace").
    /// Can be specified multiple times. Targets are prefixed with "canvas::" automatically.
    #[arg(long = "log", value_name = "TARGET=LEVEL")]
    log_overrides: Vec<String>,

    /// Log output format
    #[arg(long = "log-format", value_name = "FORMAT", default_value = "text")]
    log_format: LogFormat,
}

/// What woke the main loop.
enum Wake {
    Finished(CycleOutcome),
    Updated,
    Interrupted,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = LogConfig::from_cli(
        cli.verbose,
        cli.debug,
        cli.trace,
        cli.quiet,
        cli.log_overrides.clone(),
        cli.log_format,
    );
    logging::init(&log_config);

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if let Some(endpoint) = cli.endpoint {
        config.endpoint = endpoint;
    }
    if let Some(timeout_ms) = cli.timeout_ms {
        config.request_timeout_ms = timeout_ms;
    }

    info!(
        target: "canvas::startup",
        "Endpoint {} (timeout: {:?})",
        config.endpoint,
        config.request_timeout()
    );

    let editor = Arc::new(MemoryEditor::new());
    let conversation = Arc::new(ConversationStore::new(editor.clone()));
    let app_state = Arc::new(AppStateStore::new());

    if let Some(path) = &cli.artifact {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read artifact {}", path.display()))?;
        let id = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(canvas_types::short_id);
        info!(target: "canvas::startup", "Opened document {} ({} bytes)", id, content.len());
        conversation.open_document(id, content);
    }

    let controller = SessionController::new(
        config.to_controller_config(),
        conversation.clone(),
        app_state,
    );

    let mut updates = conversation.subscribe();
    conversation.set_input_value(cli.message);
    let mut cycle = controller.send_message().await?;

    let mut printer = StreamPrinter::new();
    let mut stdout = std::io::stdout();
    let mut stderr = std::io::stderr();

    let outcome = loop {
        let wake = tokio::select! {
            outcome = cycle.finished() => Wake::Finished(outcome),
            changed = updates.changed() => match changed {
                Ok(()) => Wake::Updated,
                Err(_) => Wake::Finished(CycleOutcome::Closed),
            },
            _ = tokio::signal::ctrl_c() => Wake::Interrupted,
        };

        match wake {
            Wake::Finished(outcome) => break outcome,
            Wake::Updated => {
                let snapshot = updates.borrow_and_update().clone();
                let rendered = printer.render(&snapshot);
                for label in rendered.progress {
                    writeln!(stderr, "» {label}")?;
                }
                write!(stdout, "{}", rendered.text)?;
                stdout.flush()?;
            }
            Wake::Interrupted => {
                warn!(target: "canvas::cycle", "Interrupted");
                cycle.cancel();
            }
        }
    };

    let snapshot = conversation.snapshot();
    let rendered = printer.render(&snapshot);
    write!(stdout, "{}", rendered.text)?;
    if let Some(text) = printer.finish(&snapshot) {
        write!(stdout, "\n{text}")?;
    }
    writeln!(stdout)?;

    if let Some(error) = cycle.service_error() {
        writeln!(stderr, "service error: {error}")?;
    }
    if let Some(usage) = cycle.usage() {
        writeln!(stderr, "» {} tokens generated", usage.generated_tokens)?;
    }

    if let Some(path) = &cli.artifact_out {
        std::fs::write(path, &snapshot.current_document.content)
            .with_context(|| format!("Failed to write artifact {}", path.display()))?;
        info!(
            target: "canvas::startup",
            "Wrote document {} to {}",
            snapshot.current_document.id,
            path.display()
        );
    }

    match outcome {
        CycleOutcome::Errored => bail!("Completion failed"),
        CycleOutcome::TimedOut => bail!("Completion timed out"),
        _ => Ok(()),
    }
}
