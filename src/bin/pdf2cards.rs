//! CLI binary for pdf2cards.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `GenerationConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use pdf2cards::{
    generate, generate_to_file, load_prompt_config, GenerationConfig, GenerationProgressCallback,
    OutputFormat, OversizedSummaryPolicy, ProgressCallback, ReduceOutput,
};
use std::io::{self, Write};
use std::path::PathBuf;
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
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: renders a live progress bar for the map phase
/// and log lines for collapse passes and the reduce step. Works correctly
/// when chunks complete out-of-order (concurrent fan-out).
struct CliProgressCallback {
    /// The single progress bar anchored at the bottom of the terminal.
    bar: ProgressBar,
}

impl CliProgressCallback {
    /// Create a callback whose progress-bar length is set dynamically
    /// by `on_generation_start` (called before any chunks are processed).
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0); // length set in on_generation_start

        // Initial style: spinner only (no counter until we know the total).
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Loading PDF…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self { bar })
    }

    /// Switch to the full progress-bar style once we know `total`.
    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} chunks  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Summarising");
        self.bar.reset_eta();
    }
}

impl GenerationProgressCallback for CliProgressCallback {
    fn on_generation_start(&self, total_chunks: usize) {
        // Switch from spinner-only style to full progress bar now that we
        // know the actual chunk count.
        self.activate_bar(total_chunks);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Summarising {total_chunks} chunks…"))
        ));
    }

    fn on_chunk_start(&self, chunk_num: usize, _total: usize) {
        self.bar.set_message(format!("chunk {chunk_num}"));
    }

    fn on_chunk_summarized(&self, chunk_num: usize, total: usize, summary_len: usize) {
        self.bar.println(format!(
            "  {} Chunk {:>3}/{:<3}  {}",
            green("✓"),
            chunk_num,
            total,
            dim(&format!("{summary_len:>5} chars")),
        ));
        self.bar.inc(1);
    }

    fn on_collapse_pass(&self, pass: usize, docs_before: usize, docs_after: usize) {
        self.bar.set_prefix("Collapsing");
        self.bar.println(format!(
            "{} Collapse pass {}: {} summaries → {}",
            cyan("◆"),
            pass,
            docs_before,
            docs_after,
        ));
    }

    fn on_reduce_start(&self) {
        self.bar.set_prefix("Distilling");
        self.bar.set_message("generating flashcards".to_string());
    }

    fn on_generation_complete(&self, card_count: Option<usize>) {
        self.bar.finish_and_clear();
        match card_count {
            Some(n) => eprintln!(
                "{} {} flashcards generated",
                green("✔"),
                bold(&n.to_string())
            ),
            None => eprintln!("{} generation complete", green("✔")),
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Basic generation (stdout)
  pdf2cards lecture-notes.pdf

  # Write the flashcard JSON to a file
  pdf2cards lecture-notes.pdf -o cards.json

  # Use a specific model
  pdf2cards --model gpt-4o-mini --provider openai textbook.pdf -o cards.json

  # Generate from a URL
  pdf2cards https://arxiv.org/pdf/1706.03762 -o attention-cards.json

  # Custom prompts (JSON files with "system" and "user" fields)
  pdf2cards -m map.json -r reduce.json thesis.pdf -o cards.json

  # Keep the raw reduce output instead of parsed flashcards
  pdf2cards --raw essay.pdf -o summary.txt

  # Smaller chunks with overlap for dense material
  pdf2cards --chunk-size 600 --chunk-overlap 60 formulas.pdf -o cards.json

PROMPT FILE FORMAT:
  {
    "system": "You are an expert at creating study material.",
    "user": "Create flashcards from the following text:\n\n{docs}"
  }
  The user template must contain the {docs} placeholder; the document text
  (or the accumulated summaries, for the reduce prompt) is substituted there.

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)

SETUP:
  1. Set API key:     export OPENAI_API_KEY=sk-...
  2. Generate:        pdf2cards document.pdf -o cards.json
"#;

/// Generate question → answer flashcards from PDF files and URLs using LLMs.
#[derive(Parser, Debug)]
#[command(
    name = "pdf2cards",
    version,
    about = "Generate flashcards from PDF files and URLs using LLMs",
    long_about = "Generate question → answer flashcards from PDF documents (local files or URLs) \
using a map-reduce LLM workflow: chunks are summarised concurrently, summaries are collapsed \
until they fit the model context, and a final call distills them into JSON flashcards. \
Supports OpenAI, Anthropic, Google Gemini, and any OpenAI-compatible endpoint.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF file path or HTTP/HTTPS URL.
    input: String,

    /// Write the flashcard JSON to this file instead of stdout.
    #[arg(short, long, env = "PDF2CARDS_OUTPUT")]
    output: Option<PathBuf>,

    /// Path to a JSON file with a custom map (summarisation) prompt.
    #[arg(short = 'm', long, env = "PDF2CARDS_MAP_PROMPT")]
    map_prompt: Option<PathBuf>,

    /// Path to a JSON file with a custom reduce (flashcard) prompt.
    #[arg(short = 'r', long, env = "PDF2CARDS_REDUCE_PROMPT")]
    reduce_prompt: Option<PathBuf>,

    /// LLM model ID (e.g. gpt-4o, gpt-4o-mini, claude-sonnet-4-20250514).
    #[arg(
        long,
        env = "EDGEQUAKE_MODEL",
        long_help = "LLM model to use. Default: gpt-4o. The model ID also selects the tiktoken\n\
          encoding used for chunk sizing, so token budgets match provider billing."
    )]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(
        long,
        env = "EDGEQUAKE_PROVIDER",
        long_help = "LLM provider. Auto-detected from API key env vars if not set.\n\
          Supported: openai, anthropic, gemini, azure, ollama, or any OpenAI-compatible URL."
    )]
    provider: Option<String>,

    /// Chunk size in model tokens.
    #[arg(long, env = "PDF2CARDS_CHUNK_SIZE", default_value_t = 1000)]
    chunk_size: usize,

    /// Token overlap between consecutive chunks.
    #[arg(long, env = "PDF2CARDS_CHUNK_OVERLAP", default_value_t = 0)]
    chunk_overlap: usize,

    /// Token ceiling for the intermediate-summary batch.
    #[arg(long, env = "PDF2CARDS_TOKEN_MAX", default_value_t = 100_000)]
    token_max: usize,

    /// Number of concurrent LLM calls.
    #[arg(short, long, env = "PDF2CARDS_CONCURRENCY", default_value_t = 10)]
    concurrency: usize,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "PDF2CARDS_TEMPERATURE", default_value_t = 0.0)]
    temperature: f32,

    /// Retries per LLM call on transient failure.
    #[arg(long, env = "PDF2CARDS_MAX_RETRIES", default_value_t = 2)]
    max_retries: u32,

    /// Emit the raw reduce output instead of parsing it as flashcard JSON.
    #[arg(long, env = "PDF2CARDS_RAW")]
    raw: bool,

    /// Behaviour when one summary alone exceeds the token ceiling.
    #[arg(long, env = "PDF2CARDS_OVERSIZED", value_enum, default_value = "fail")]
    oversized: OversizedArg,

    /// Disable progress bar.
    #[arg(long, env = "PDF2CARDS_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDF2CARDS_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PDF2CARDS_QUIET")]
    quiet: bool,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "PDF2CARDS_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum OversizedArg {
    /// Abort the run with an error.
    Fail,
    /// Pass the oversized summary to the reduce step un-collapsed.
    Pass,
}

impl From<OversizedArg> for OversizedSummaryPolicy {
    fn from(v: OversizedArg) -> Self {
        match v {
            OversizedArg::Fail => OversizedSummaryPolicy::FailFast,
            OversizedArg::Pass => OversizedSummaryPolicy::PassThrough,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the progress bar is active;
    // the bar provides all the feedback that matters to the user.
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

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        let cb = CliProgressCallback::new_dynamic();
        Some(cb as Arc<dyn GenerationProgressCallback>)
    } else {
        None
    };

    let config = build_config(&cli, progress_cb)?;

    // ── Run generation ───────────────────────────────────────────────────
    if let Some(ref output_path) = cli.output {
        let stats = generate_to_file(&cli.input, output_path, &config)
            .await
            .context("Generation failed")?;

        // Summary line (callback already printed the per-chunk log).
        if !cli.quiet {
            eprintln!(
                "{}  {} chunks, {} collapse passes, {}ms  →  {}",
                green("✔"),
                stats.chunk_count,
                stats.collapse_passes,
                stats.total_duration_ms,
                bold(&output_path.display().to_string()),
            );
            eprintln!(
                "   {} tokens in  /  {} tokens out",
                dim(&stats.total_input_tokens.to_string()),
                dim(&stats.total_output_tokens.to_string()),
            );
        }
    } else {
        let output = generate(&cli.input, &config)
            .await
            .context("Generation failed")?;

        let stdout = io::stdout();
        let mut handle = stdout.lock();
        match output.result {
            ReduceOutput::Flashcards(ref set) => {
                let json =
                    serde_json::to_string_pretty(set).context("Failed to serialise flashcards")?;
                handle
                    .write_all(json.as_bytes())
                    .context("Failed to write to stdout")?;
                handle.write_all(b"\n").ok();
            }
            ReduceOutput::Raw(ref text) => {
                handle
                    .write_all(text.as_bytes())
                    .context("Failed to write to stdout")?;
                if !text.ends_with('\n') {
                    handle.write_all(b"\n").ok();
                }
            }
        }

        if !cli.quiet {
            eprintln!(
                "   {} tokens in  /  {} tokens out  —  {}ms total",
                dim(&output.stats.total_input_tokens.to_string()),
                dim(&output.stats.total_output_tokens.to_string()),
                output.stats.total_duration_ms,
            );
        }
    }

    Ok(())
}

/// Map CLI args to `GenerationConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<GenerationConfig> {
    let mut builder = GenerationConfig::builder()
        .chunk_size(cli.chunk_size)
        .chunk_overlap(cli.chunk_overlap)
        .token_max(cli.token_max)
        .concurrency(cli.concurrency)
        .temperature(cli.temperature)
        .max_retries(cli.max_retries)
        .oversized_policy(cli.oversized.clone().into())
        .download_timeout_secs(cli.download_timeout);

    if let Some(ref model) = cli.model {
        builder = builder.model(model.clone());
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider.clone());
    }
    if let Some(ref path) = cli.map_prompt {
        let prompt = load_prompt_config(path)
            .with_context(|| format!("Failed to load map prompt from {:?}", path))?;
        builder = builder.map_prompt(prompt);
    }
    if let Some(ref path) = cli.reduce_prompt {
        let prompt = load_prompt_config(path)
            .with_context(|| format!("Failed to load reduce prompt from {:?}", path))?;
        builder = builder.reduce_prompt(prompt);
    }
    if cli.raw {
        builder = builder.reduce_format(OutputFormat::Text);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
