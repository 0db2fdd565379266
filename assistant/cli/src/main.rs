//! Revenue Assistant - Terminal Surface
//!
//! Line-oriented chat with the Semera-Logia revenues office assistant. The
//! conversation is kept in the platform data directory and restored on the
//! next start.
//!
//! # Usage
//!
//! ```bash
//! # Talk to the hosted model
//! GEMINI_API_KEY=... revenue-assistant
//!
//! # Without network access (answers echo the question)
//! revenue-assistant --offline
//!
//! # Start from a fresh conversation
//! revenue-assistant --clear-history
//!
//! # Verbose logging (goes to stderr)
//! RUST_LOG=debug revenue-assistant
//! ```
//!
//! # Input
//!
//! - A line is sent when Enter is pressed
//! - A line ending in `\` continues on the next line
//! - `/bold`, `/italic`, `/underline` wrap the pending draft
//! - `/clear` resets the conversation after confirmation
//! - Ctrl+C exits once the outstanding answer has been stored

mod render;

use std::future::Future;
use std::io::{self, Stdout};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use assistant_core::{
    default_config_path, load_config_from_path, Assistant, AssistantConfig, AssistantMessage,
    CompletionProvider, ConfigOverrides, FileStorage, GeminiBackend, ScriptedProvider, Style,
    SurfaceEvent,
};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::mpsc;
use tracing::{error, info};

use render::Transcript;

/// Revenue Assistant - chat with the Semera-Logia revenues office assistant
#[derive(Parser, Debug)]
#[command(name = "revenue-assistant")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short = 'c', long, env = "ASSISTANT_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Directory holding the conversation history
    #[arg(short = 'd', long, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    /// Model identifier
    #[arg(short = 'm', long, value_name = "NAME")]
    model: Option<String>,

    /// Answer locally by echoing the question
    #[arg(long)]
    offline: bool,

    /// Clear the stored conversation before starting
    #[arg(long)]
    clear_history: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, env = "ASSISTANT_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

const HELP: &str = "\
Commands:
  /bold /italic /underline   wrap the pending draft
  /clear                     clear the conversation history
  /help                      show this help
  /quit                      exit
End a line with \\ to continue on the next line.";

/// What the input loop should do after a line
enum Flow {
    Continue,
    Quit,
}

/// Initialize logging with the specified level
///
/// Logs go to stderr so the transcript on stdout stays readable.
fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!(
            "revenue_assistant={level},assistant_core={level}"
        ))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(io::stderr)
        .init();
}

/// Resolve the effective configuration
fn configure(args: &Args) -> Result<AssistantConfig> {
    let path = args.config.clone().or_else(default_config_path);
    let mut config =
        load_config_from_path(path.as_deref()).context("Failed to load configuration")?;

    let mut overrides = ConfigOverrides::new();
    if let Some(ref model) = args.model {
        overrides = overrides.with_model(model.clone());
    }
    if let Some(ref dir) = args.data_dir {
        overrides = overrides.with_data_dir(dir.clone());
    }
    overrides.apply(&mut config);

    config.validate().context("Invalid configuration")?;
    info!(source = %config.source(), model = %config.model, "Configuration loaded");
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level);

    let config = configure(&args)?;
    let data_dir = config
        .resolved_data_dir()
        .context("No data directory available; pass --data-dir")?;
    info!(data_dir = %data_dir.display(), "Conversation storage");
    let storage = Arc::new(FileStorage::new(data_dir));

    let result = if args.offline {
        run(Arc::new(ScriptedProvider::new()), storage, config, args.clear_history).await
    } else {
        let api_key = config
            .api_key
            .clone()
            .context("No API key found; set GEMINI_API_KEY or run with --offline")?;
        let backend = GeminiBackend::new(config.api_base.clone(), api_key, config.request_timeout)
            .context("Failed to create the Gemini client")?;
        run(Arc::new(backend), storage, config, args.clear_history).await
    };

    if let Err(ref e) = result {
        error!(error = %e, "Assistant stopped with error");
    }
    result
}

/// Run the chat loop until `/quit`, end of input, or Ctrl+C
async fn run<P: CompletionProvider>(
    provider: Arc<P>,
    storage: Arc<FileStorage>,
    config: AssistantConfig,
    clear_history: bool,
) -> Result<()> {
    let (tx, mut rx) = mpsc::channel(256);
    let mut transcript = Transcript::new(io::stdout(), config.welcome_text.clone());
    let mut assistant = Assistant::new(provider, storage, config, tx);

    if clear_history {
        assistant.clear(true).await;
        while rx.try_recv().is_ok() {}
    }

    let mut interrupted = false;
    pump(assistant.start(), &mut rx, &mut transcript, &mut interrupted).await?;
    transcript.note("Type /help for commands.")?;

    assistant
        .handle_event(SurfaceEvent::FocusChanged { focused: true })
        .await;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut continuation = false;

    while !interrupted {
        transcript.prompt(continuation)?;

        let line = tokio::select! {
            line = lines.next_line() => line.context("Failed to read input")?,
            _ = tokio::signal::ctrl_c() => {
                interrupted = true;
                None
            }
        };
        let Some(line) = line else { break };

        let flow = handle_line(
            &mut assistant,
            &line,
            &mut lines,
            &mut rx,
            &mut transcript,
            &mut interrupted,
        )
        .await?;
        if matches!(flow, Flow::Quit) {
            break;
        }
        continuation = !assistant.input().text().is_empty();
    }

    info!(turns = assistant.log().len(), "Assistant shutting down");
    Ok(())
}

async fn handle_line<P: CompletionProvider>(
    assistant: &mut Assistant<P, FileStorage>,
    line: &str,
    lines: &mut Lines<BufReader<Stdin>>,
    rx: &mut mpsc::Receiver<AssistantMessage>,
    transcript: &mut Transcript<Stdout>,
    interrupted: &mut bool,
) -> Result<Flow> {
    match line.trim() {
        "/quit" | "/exit" => return Ok(Flow::Quit),
        "/help" => transcript.note(HELP)?,
        "/bold" => wrap_draft(assistant, Style::Bold, transcript)?,
        "/italic" => wrap_draft(assistant, Style::Italic, transcript)?,
        "/underline" => wrap_draft(assistant, Style::Underline, transcript)?,
        "/clear" => {
            transcript.note("Clear the conversation history? [y/N]")?;
            let answer = lines.next_line().await.context("Failed to read input")?;
            let confirmed = answer
                .is_some_and(|a| matches!(a.trim().to_lowercase().as_str(), "y" | "yes" | "አዎ"));
            pump(
                assistant.handle_event(SurfaceEvent::ClearHistory { confirmed }),
                rx,
                transcript,
                interrupted,
            )
            .await?;
        }
        _ => {
            if let Some(partial) = line.strip_suffix('\\') {
                assistant.input_mut().insert(partial);
                assistant
                    .handle_event(SurfaceEvent::EnterPressed { shift: true })
                    .await;
                return Ok(Flow::Continue);
            }

            assistant.input_mut().insert(line);
            pump(
                assistant.handle_event(SurfaceEvent::EnterPressed { shift: false }),
                rx,
                transcript,
                interrupted,
            )
            .await?;
            pump(assistant.finish_streaming(), rx, transcript, interrupted).await?;
        }
    }
    Ok(Flow::Continue)
}

/// Wrap the whole pending draft in `style`
fn wrap_draft<P: CompletionProvider>(
    assistant: &mut Assistant<P, FileStorage>,
    style: Style,
    transcript: &mut Transcript<Stdout>,
) -> io::Result<()> {
    let input = assistant.input_mut();
    let was_empty = input.text().is_empty();
    input.select(0, usize::MAX);
    assistant.toggle_style(style);

    // Keep typing after the wrapped span, or between the markers of an empty one
    if !was_empty {
        let end = assistant.input().text().chars().count();
        assistant.input_mut().select(end, end);
    }
    transcript.draft(assistant.input().text())
}

/// Drive `work` while rendering the notifications it produces
///
/// Ctrl+C only marks the session as interrupted; `work` always completes so
/// the stored conversation is never left half written.
async fn pump<F: Future>(
    work: F,
    rx: &mut mpsc::Receiver<AssistantMessage>,
    transcript: &mut Transcript<Stdout>,
    interrupted: &mut bool,
) -> io::Result<F::Output> {
    tokio::pin!(work);
    loop {
        tokio::select! {
            out = &mut work => {
                while let Ok(msg) = rx.try_recv() {
                    transcript.show(&msg)?;
                }
                return Ok(out);
            }
            Some(msg) = rx.recv() => transcript.show(&msg)?,
            _ = tokio::signal::ctrl_c(), if !*interrupted => {
                *interrupted = true;
                transcript.note("\nFinishing the current answer before exiting…")?;
            }
        }
    }
}
