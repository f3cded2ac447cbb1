//! # pdf2cards
//!
//! Turn a PDF into question → answer flashcards using Large Language Models.
//!
//! ## Why this crate?
//!
//! Long documents do not fit in a single model context, and naive truncation
//! loses exactly the material a learner wants cards for. This crate runs a
//! map-reduce workflow instead: the document is split into token-bounded
//! chunks, every chunk is summarised concurrently, the summaries are
//! collapsed in rounds until they fit under a token ceiling, and one final
//! reduce call distills the whole summary set into a JSON flashcard object.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Input     resolve local file or download from URL
//!  ├─ 2. Load      extract text per page (CPU-bound, spawn_blocking)
//!  ├─ 3. Split     token-aware chunking via tiktoken (default 1000 tokens)
//!  ├─ 4. Map       concurrent summary calls, one per chunk
//!  ├─ 5. Collapse  regroup + resummarise until Σ tokens ≤ token_max
//!  ├─ 6. Reduce    one call distilling summaries into flashcards
//!  └─ 7. Output    {"question": "answer", …} JSON + run stats
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdf2cards::{generate, GenerationConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / …
//!     let config = GenerationConfig::default();
//!     let output = generate("lecture-notes.pdf", &config).await?;
//!     let cards = output.result.into_flashcards()?;
//!     for (question, answer) in cards.iter() {
//!         println!("Q: {question}\nA: {answer}\n");
//!     }
//!     eprintln!("tokens: {} in / {} out",
//!         output.stats.total_input_tokens,
//!         output.stats.total_output_tokens);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf2cards` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library to avoid pulling in CLI-only deps:
//! ```toml
//! pdf2cards = { version = "0.1", default-features = false }
//! ```
//!
//! ## Custom prompts
//!
//! Both the map and reduce prompts are replaceable via JSON files with
//! `system` and `user` fields; the user template must contain a `{docs}`
//! placeholder where the document text is substituted. See
//! [`prompt::PromptConfig`].

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod generate;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompt;
pub mod tokens;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    GenerationConfig, GenerationConfigBuilder, OutputFormat, OversizedSummaryPolicy,
    DEFAULT_TOKEN_MAX,
};
pub use error::FlashcardError;
pub use generate::{generate, generate_sync, generate_to_file};
pub use output::{FlashcardSet, GenerationOutput, GenerationStats, ReduceOutput};
pub use progress::{GenerationProgressCallback, NoopProgressCallback, ProgressCallback};
pub use prompt::{load_prompt_config, PromptConfig};
