//! Answer a question in three passes: draft, editor critique, revision.
//!
//! Reads the API key from `--key-file` (first non-empty line) or the
//! `OPENROUTER_KEY` environment variable. Prints all three texts and saves
//! them to `output.txt` (or `output1.txt`, `output2.txt`, … if taken).
//!
//! # Examples
//!
//! ```sh
//! # Interactive: prompts for the question and guidance
//! refine
//!
//! # One-shot
//! refine --question "Why is the sky blue?" --guidance "explain it to a child"
//!
//! # Separate editor model, two retries on transient failures
//! refine --question "What is a monad?" \
//!   --model openai/gpt-4o --editor-model anthropic/claude-sonnet-4 --retries 2
//!
//! # Print only, don't save
//! refine --question "Summarize TCP slow start" --no-save
//! ```

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process;

use clap::Parser;
use refine_rs::config::{ClientConfig, RefineConfig};
use refine_rs::error::RefineError;
use refine_rs::pipeline::{
    ArtifactWriter, CompositeEventHandler, EventHandler, LoggingHandler, RefineEvent,
    RefinePipeline, Session, Stage, render_artifact,
};
use refine_rs::{DEFAULT_MAX_TOKENS, DEFAULT_MODEL, OpenRouterClient};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Answer a question in three passes: draft, editor critique, revision.
#[derive(Parser)]
#[command(name = "refine", version)]
struct Cli {
    // ── Input ──────────────────────────────────────────────────
    /// Question to answer. Without this, prompts on stdin
    #[arg(long)]
    question: Option<String>,

    /// Guidance on how the answer should be (funny, witty, concise, etc.)
    #[arg(long)]
    guidance: Option<String>,

    // ── Models ─────────────────────────────────────────────────
    /// Model that writes the draft and the revision
    #[arg(long, default_value = DEFAULT_MODEL)]
    model: String,

    /// Model that critiques the draft (defaults to --model)
    #[arg(long)]
    editor_model: Option<String>,

    /// Maximum tokens per response
    #[arg(long, default_value_t = DEFAULT_MAX_TOKENS)]
    max_tokens: u32,

    /// Sampling temperature
    #[arg(long, default_value_t = 0.7)]
    temperature: f32,

    /// Retries per stage on transient failures (429, 5xx, network)
    #[arg(long, default_value_t = 0)]
    retries: u32,

    // ── Service ────────────────────────────────────────────────
    /// File whose first non-empty line is the API key
    #[arg(long)]
    key_file: Option<PathBuf>,

    /// Chat-completions endpoint URL
    #[arg(long)]
    endpoint: Option<String>,

    // ── Output ─────────────────────────────────────────────────
    /// Directory to save the output file in
    #[arg(long, default_value = ".")]
    output_dir: PathBuf,

    /// Print the results without saving them
    #[arg(long)]
    no_save: bool,

    /// Debug-level logging on stderr
    #[arg(short, long)]
    verbose: bool,
}

/// Prints stage progress to stderr.
struct ProgressHandler;

impl EventHandler for ProgressHandler {
    fn on_event(&self, event: &RefineEvent<'_>) {
        match event {
            RefineEvent::StageStarted { stage, model } => {
                eprintln!("  [{}] {model}...", stage_tag(*stage));
            }
            RefineEvent::StageRetrying {
                stage,
                attempt,
                max_retries,
                delay,
                ..
            } => {
                eprintln!(
                    "  [{}] retry {attempt}/{max_retries} in {:.1}s",
                    stage_tag(*stage),
                    delay.as_secs_f64()
                );
            }
            _ => {}
        }
    }
}

fn stage_tag(stage: Stage) -> &'static str {
    match stage {
        Stage::Draft => "draft",
        Stage::Critique => "critique",
        Stage::Revise => "revise",
    }
}

// ── Helpers ────────────────────────────────────────────────────────

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("refine_rs=debug,refine=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

fn prompt_line(prompt: &str) -> Result<String, RefineError> {
    print!("{prompt}");
    io::stdout()
        .flush()
        .map_err(|e| RefineError::Input(format!("failed to write prompt: {e}")))?;
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .map_err(|e| RefineError::Input(format!("failed to read stdin: {e}")))?;
    Ok(line.trim().to_string())
}

/// Question and guidance from flags, falling back to interactive prompts.
fn collect_input(cli: &Cli) -> Result<(String, Option<String>), RefineError> {
    let (question, guidance) = match &cli.question {
        Some(q) => (q.trim().to_string(), cli.guidance.clone()),
        None => {
            let q = prompt_line("Ask agent a question: ")?;
            let g = match &cli.guidance {
                Some(g) => g.clone(),
                None => prompt_line(
                    "Give specific guidance on how you want the answer to be (funny, witty, concise, etc.): ",
                )?,
            };
            (q, Some(g))
        }
    };

    if question.is_empty() {
        return Err(RefineError::Input("question must not be empty".to_string()));
    }
    let guidance = guidance
        .map(|g| g.trim().to_string())
        .filter(|g| !g.is_empty());
    Ok((question, guidance))
}

fn print_partial(session: &Session) {
    for (label, text) in [
        ("Initial response", session.draft()),
        ("Editor feedback", session.critique()),
    ] {
        if let Some(text) = text {
            println!("{label}: \"{text}\"\n");
        }
    }
}

async fn run(cli: &Cli) -> Result<(), RefineError> {
    let api_key = ClientConfig::load_api_key(cli.key_file.as_deref())?;
    let mut client_config = ClientConfig::new(api_key)
        .with_max_tokens(cli.max_tokens)
        .with_temperature(cli.temperature);
    if let Some(endpoint) = &cli.endpoint {
        client_config = client_config.with_endpoint(endpoint);
    }
    let client = OpenRouterClient::new(client_config)?;

    let mut refine_config = RefineConfig::new(&cli.model).with_retries(cli.retries);
    if let Some(editor) = &cli.editor_model {
        refine_config = refine_config.with_editor_model(editor);
    }

    let (question, guidance) = collect_input(cli)?;

    let handler = CompositeEventHandler::new()
        .with(ProgressHandler)
        .with(LoggingHandler);
    let pipeline = RefinePipeline::new(&client, refine_config).with_event_handler(&handler);

    let session = match pipeline.run(&question, guidance.as_deref()).await {
        Ok(s) => s,
        Err(failure) => {
            print_partial(&failure.partial);
            return Err(failure.into());
        }
    };

    if let Some((draft, critique, revision)) = session.triple() {
        println!("{}", render_artifact(draft, critique, revision));
    }
    eprintln!("  [{}] {}", session.trace_id(), session.usage().summary());

    if cli.no_save {
        return Ok(());
    }

    let path = ArtifactWriter::new(&cli.output_dir).write(&session)?;
    eprintln!("  Saved to {}", path.display());
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(&cli).await {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}
