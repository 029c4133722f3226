//! CLI binary for edgequake-studykit.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `WorkflowConfig` / `ExtractorConfig` and prints the outcome JSON.

use anyhow::{bail, Context, Result};
use clap::Parser;
use edgequake_studykit::{
    run_batch, BatchManifest, DocumentExtractor, ExtractorConfig, LlmCompletion, SourceMaterial,
    StudyKitError, TargetMetadata, Workflow, WorkflowConfig, WorkflowObserver, WorkflowOutcome,
    WorkflowState,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

// ── CLI observer using indicatif ─────────────────────────────────────────────

/// Spinner naming the current stage, plus one log line per finished stage.
struct CliObserver {
    bar: ProgressBar,
}

impl CliObserver {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Preparing");
        bar.set_message("Resolving sources…");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl WorkflowObserver for CliObserver {
    fn on_state_enter(&self, state: WorkflowState) {
        self.bar.set_prefix("Working");
        self.bar.set_message(state.to_string());
    }

    fn on_stage_complete(&self, state: WorkflowState, elapsed_ms: u64) {
        self.bar.println(format!(
            "  {} {:<12} {}",
            green("✓"),
            state.to_string(),
            dim(&format!("{:.1}s", elapsed_ms as f64 / 1000.0)),
        ));
    }

    fn on_workflow_complete(&self, outcome: &WorkflowOutcome) {
        let mark = if outcome.success { green("✔") } else { red("✘") };
        self.bar.println(format!("{} {}", mark, bold(&outcome.message)));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # One chapter PDF
  studykit chapter3.pdf --standard "Class 6" --subject Science --chapter Plants

  # Photos of pages, in reading order, written to a file
  studykit p1.jpg p2.jpg p3.jpg --standard "Grade 8" --subject History \
      --chapter "The Mughal Empire" -o mughals.json

  # From a URL, with a specific model
  studykit https://example.org/ch3.pdf --provider openai --model gpt-4.1-mini \
      --standard "Class 9" --subject Physics --chapter Motion

  # A whole manifest, three requests at a time
  studykit --batch manifest.json --batch-concurrency 3 -o results.json

MANIFEST FORMAT:
  { "inputs": [ { "name": "ch3", "content": "ch3.pdf", "standard": "Class 6",
                  "subject": "Science", "chapter": "Plants" },
                { "name": "notes", "content": "p1.jpg,p2.jpg", "type": "images",
                  "standard": "Class 7", "subject": "History", "chapter": "Empires" } ] }

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  PDFIUM_LIB_PATH         Path to libpdfium (file or directory)
  STUDYKIT_*              Every flag below has a STUDYKIT_ fallback

EXIT CODES:
  0  every request succeeded
  1  the request could not be started (bad input, configuration, provider)
  2  a request ran and ended in a failed outcome
"#;

/// Turn textbook PDFs and page photos into validated study material.
#[derive(Parser, Debug)]
#[command(
    name = "studykit",
    version,
    about = "Turn textbook PDFs and page photos into validated study material",
    long_about = "Extract a chapter's text (PDF text layer, or a vision model when that is poor), \
check it for grade fit, subject relevance and safety, then generate study notes, \
fill-in-the-blanks, match-the-following and subjective Q&A as JSON.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// One PDF, or one or more images, as local paths or HTTP/HTTPS URLs.
    #[arg(required_unless_present = "batch")]
    inputs: Vec<String>,

    /// Class or grade level, e.g. "Class 6".
    #[arg(long, env = "STUDYKIT_STANDARD", required_unless_present = "batch")]
    standard: Option<String>,

    /// Subject, e.g. "Science".
    #[arg(long, env = "STUDYKIT_SUBJECT", required_unless_present = "batch")]
    subject: Option<String>,

    /// Chapter title.
    #[arg(long, env = "STUDYKIT_CHAPTER", required_unless_present = "batch")]
    chapter: Option<String>,

    /// Process every request of a JSON manifest instead of positional inputs.
    #[arg(long, env = "STUDYKIT_BATCH", conflicts_with = "inputs")]
    batch: Option<PathBuf>,

    /// Requests processed at once in batch mode.
    #[arg(long, env = "STUDYKIT_BATCH_CONCURRENCY", default_value_t = 2)]
    batch_concurrency: usize,

    /// Write JSON to this file (atomically) instead of stdout.
    #[arg(short, long, env = "STUDYKIT_OUTPUT")]
    output: Option<PathBuf>,

    /// Single-line JSON.
    #[arg(long, env = "STUDYKIT_COMPACT")]
    compact: bool,

    // ── Provider ─────────────────────────────────────────────────────────
    /// LLM model ID (e.g. gpt-4.1-nano, gpt-4.1-mini, claude-sonnet-4-20250514).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    // ── Extraction ───────────────────────────────────────────────────────
    /// Rendering DPI for vision transcription (72–400).
    #[arg(long, env = "STUDYKIT_DPI", default_value_t = 150,
          value_parser = clap::value_parser!(u32).range(72..=400))]
    dpi: u32,

    /// Only the first N pages of a PDF are read.
    #[arg(long, env = "STUDYKIT_MAX_PAGES", default_value_t = 30)]
    max_pages: usize,

    /// Concurrent page transcriptions.
    #[arg(short, long, env = "STUDYKIT_CONCURRENCY", default_value_t = 8)]
    concurrency: usize,

    /// Longest edge of an uploaded photo after resizing.
    #[arg(long, env = "STUDYKIT_MAX_IMAGE_EDGE", default_value_t = 2048)]
    max_image_edge: u32,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "STUDYKIT_PASSWORD")]
    password: Option<String>,

    /// Max output tokens per vision call.
    #[arg(long, env = "STUDYKIT_VISION_MAX_TOKENS", default_value_t = 3000)]
    vision_max_tokens: usize,

    /// Retries per provider call.
    #[arg(long, env = "STUDYKIT_MAX_RETRIES", default_value_t = 3)]
    max_retries: u32,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "STUDYKIT_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    // ── Workflow ─────────────────────────────────────────────────────────
    /// Minimum characters for fast-extracted text to be accepted.
    #[arg(long, env = "STUDYKIT_MIN_CHARS", default_value_t = 50)]
    min_chars: usize,

    /// Fast-extracted text with a lower self-reported quality is re-extracted.
    #[arg(long, env = "STUDYKIT_MIN_QUALITY", default_value_t = 0.40)]
    min_quality: f32,

    /// Fill-in-the-blank items to keep.
    #[arg(long, env = "STUDYKIT_FILL_IN_BLANKS", default_value_t = 5)]
    fill_in_blanks: usize,

    /// Match-the-following pairs to keep.
    #[arg(long, env = "STUDYKIT_MATCH_PAIRS", default_value_t = 5)]
    match_pairs: usize,

    /// Subjective questions to keep.
    #[arg(long, env = "STUDYKIT_QUESTIONS", default_value_t = 3)]
    questions: usize,

    /// Max output tokens of the generation call.
    #[arg(long, env = "STUDYKIT_GENERATION_MAX_TOKENS", default_value_t = 4000)]
    generation_max_tokens: usize,

    /// Per-call extraction budget in seconds.
    #[arg(long, env = "STUDYKIT_EXTRACTION_TIMEOUT", default_value_t = 180)]
    extraction_timeout: u64,

    /// Per-call completion budget in seconds.
    #[arg(long, env = "STUDYKIT_COMPLETION_TIMEOUT", default_value_t = 120)]
    completion_timeout: u64,

    // ── Output control ───────────────────────────────────────────────────
    /// Disable the progress spinner.
    #[arg(long, env = "STUDYKIT_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "STUDYKIT_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "STUDYKIT_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner provides the feedback that matters; library INFO logs
    // would tear it.
    let show_progress = !cli.quiet && !cli.no_progress;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let observer = show_progress.then(CliObserver::new);

    let extractor_config = build_extractor_config(&cli)?;
    let workflow_config = build_workflow_config(&cli, observer.clone())?;

    let extractor =
        DocumentExtractor::from_config(extractor_config).context("Failed to set up the LLM provider")?;
    let completion = LlmCompletion::from_config(extractor.provider(), extractor.config());
    let workflow = Workflow::new(workflow_config, Arc::new(extractor), Arc::new(completion));

    // ── Batch mode ───────────────────────────────────────────────────────
    if let Some(ref manifest_path) = cli.batch {
        let manifest = BatchManifest::load(manifest_path)
            .await
            .context("Failed to load batch manifest")?;
        let results = run_batch(
            &workflow,
            &manifest,
            cli.batch_concurrency,
            cli.download_timeout,
        )
        .await;
        if let Some(ref obs) = observer {
            obs.finish();
        }

        let failed = results.iter().filter(|r| !r.success).count();
        let json = to_json(&results, cli.compact)?;
        emit(&json, cli.output.as_deref()).await?;

        if !cli.quiet {
            eprintln!(
                "{} {}/{} requests succeeded",
                if failed == 0 { green("✔") } else { red("✘") },
                bold(&(results.len() - failed).to_string()),
                results.len()
            );
        }
        if failed > 0 {
            std::process::exit(2);
        }
        return Ok(());
    }

    // ── Single request ───────────────────────────────────────────────────
    let target = TargetMetadata::new(
        cli.standard.clone().unwrap_or_default(),
        cli.subject.clone().unwrap_or_default(),
        cli.chapter.clone().unwrap_or_default(),
    );
    target.validate().context("Invalid target")?;

    let material = SourceMaterial::resolve(cli.inputs.as_slice(), cli.download_timeout)
        .await
        .context("Failed to resolve sources")?;

    let outcome = workflow
        .process_content_until(&material, &target, ctrl_c())
        .await;
    if let Some(ref obs) = observer {
        obs.finish();
    }

    let json = to_json(&outcome, cli.compact)?;
    emit(&json, cli.output.as_deref()).await?;

    if !cli.quiet {
        eprintln!(
            "   {} tokens in  /  {} tokens out  over {} call(s)",
            dim(&outcome.usage.input_tokens.to_string()),
            dim(&outcome.usage.output_tokens.to_string()),
            outcome.usage.calls,
        );
    }
    if !outcome.success {
        std::process::exit(2);
    }
    Ok(())
}

/// Resolves on the first Ctrl-C. Never resolves if the handler cannot be installed.
async fn ctrl_c() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}

fn build_extractor_config(cli: &Cli) -> Result<ExtractorConfig> {
    let mut builder = ExtractorConfig::builder()
        .dpi(cli.dpi)
        .max_pages(cli.max_pages)
        .concurrency(cli.concurrency)
        .max_image_edge(cli.max_image_edge)
        .max_tokens(cli.vision_max_tokens)
        .max_retries(cli.max_retries)
        .download_timeout_secs(cli.download_timeout);

    if let Some(ref model) = cli.model {
        builder = builder.model(model);
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(ref password) = cli.password {
        builder = builder.password(password);
    }

    builder.build().context("Invalid extractor configuration")
}

fn build_workflow_config(cli: &Cli, observer: Option<Arc<CliObserver>>) -> Result<WorkflowConfig> {
    if cli.fill_in_blanks == 0 && cli.match_pairs == 0 && cli.questions == 0 {
        bail!("At least one of --fill-in-blanks, --match-pairs, --questions must be non-zero");
    }

    let mut builder = WorkflowConfig::builder()
        .min_extracted_chars(cli.min_chars)
        .min_reported_quality(cli.min_quality)
        .max_fill_in_blanks(cli.fill_in_blanks)
        .max_match_pairs(cli.match_pairs)
        .max_questions(cli.questions)
        .generation_max_tokens(cli.generation_max_tokens)
        .extraction_timeout_secs(cli.extraction_timeout)
        .completion_timeout_secs(cli.completion_timeout);

    if let Some(obs) = observer {
        builder = builder.observer(obs);
    }

    builder.build().context("Invalid workflow configuration")
}

fn to_json<T: serde::Serialize>(value: &T, compact: bool) -> Result<String> {
    let json = if compact {
        serde_json::to_string(value)
    } else {
        serde_json::to_string_pretty(value)
    };
    json.context("Failed to serialise output")
}

async fn emit(json: &str, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            write_atomic(path, json).await?;
            Ok(())
        }
        None => {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            handle
                .write_all(json.as_bytes())
                .and_then(|_| handle.write_all(b"\n"))
                .context("Failed to write to stdout")
        }
    }
}

/// Write to a sibling temp file, then rename over `path`.
async fn write_atomic(path: &Path, contents: &str) -> Result<(), StudyKitError> {
    let tmp = path.with_extension("json.tmp");
    let fail = |source: io::Error| StudyKitError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };
    tokio::fs::write(&tmp, contents).await.map_err(fail)?;
    tokio::fs::rename(&tmp, path).await.map_err(fail)
}
