//! Top-level entry points: load a PDF, run the map-reduce workflow, return
//! flashcards.
//!
//! The ordering inside [`generate`] is deliberate: input resolution and
//! document loading come before any provider work, so a bad path or an
//! unparsable PDF surfaces as a load error without a single model call (or
//! API key) being involved.

use crate::config::GenerationConfig;
use crate::error::FlashcardError;
use crate::output::{GenerationOutput, GenerationStats, ReduceOutput};
use crate::pipeline::chain::LlmChain;
use crate::pipeline::graph::MapReduceGraph;
use crate::pipeline::{input, load};
use crate::prompt::{PromptConfig, PromptTemplate};
use crate::tokens::TokenCounter;
use edgequake_llm::{LLMProvider, ProviderFactory};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// Generate flashcards from a PDF file or URL.
///
/// This is the primary entry point for the library.
///
/// # Errors
/// Propagates the first failure from any stage: input resolution, text
/// extraction, prompt validation, provider resolution, any workflow model
/// call, or reduce-output parsing.
pub async fn generate(
    input_str: impl AsRef<str>,
    config: &GenerationConfig,
) -> Result<GenerationOutput, FlashcardError> {
    let total_start = Instant::now();
    let input_str = input_str.as_ref();
    info!("Starting flashcard generation: {}", input_str);

    // ── Step 1: Resolve input and load chunks (no model involvement) ─────
    let load_start = Instant::now();
    let resolved = input::resolve_input(input_str, config.download_timeout_secs).await?;
    let counter = TokenCounter::for_model(&config.model)?;
    let chunks = load::load_chunks(
        resolved.path(),
        config.chunk_size,
        config.chunk_overlap,
        counter.bpe(),
    )
    .await?;
    let load_duration_ms = load_start.elapsed().as_millis() as u64;
    info!("Loaded {} chunks in {}ms", chunks.len(), load_duration_ms);

    // ── Step 2: Prompt templates ─────────────────────────────────────────
    let map_prompt = config
        .map_prompt
        .clone()
        .unwrap_or_else(PromptConfig::default_map);
    let reduce_prompt = config
        .reduce_prompt
        .clone()
        .unwrap_or_else(PromptConfig::default_reduce);
    let map_template = PromptTemplate::new(&map_prompt)?;
    let reduce_template = PromptTemplate::new(&reduce_prompt)?;

    // ── Step 3: Provider and chains ──────────────────────────────────────
    let provider = resolve_provider(config)?;
    let map_chain = LlmChain::new(
        map_template,
        Arc::clone(&provider),
        config.map_format,
        "map",
        config,
    );
    let reduce_chain = LlmChain::new(
        reduce_template,
        provider,
        config.reduce_format,
        "reduce",
        config,
    );

    // ── Step 4: Run the workflow ─────────────────────────────────────────
    let llm_start = Instant::now();
    let mut graph = MapReduceGraph::new(
        &map_chain,
        &reduce_chain,
        &counter,
        config.token_max,
        config.concurrency,
        config.oversized_policy,
    );
    if let Some(ref cb) = config.progress_callback {
        graph = graph.with_progress(cb);
    }
    let run = graph
        .run(chunks.iter().map(|c| c.content.clone()).collect())
        .await?;
    let llm_duration_ms = llm_start.elapsed().as_millis() as u64;

    // ── Step 5: Stats ────────────────────────────────────────────────────
    let (map_in, map_out) = map_chain.usage().totals();
    let (reduce_in, reduce_out) = reduce_chain.usage().totals();
    let stats = GenerationStats {
        chunk_count: chunks.len(),
        summary_count: run.summary_count,
        collapse_passes: run.collapse_passes,
        total_input_tokens: map_in + reduce_in,
        total_output_tokens: map_out + reduce_out,
        load_duration_ms,
        llm_duration_ms,
        total_duration_ms: total_start.elapsed().as_millis() as u64,
    };

    info!(
        "Generation complete: {} chunks, {} collapse passes, {}ms total",
        stats.chunk_count, stats.collapse_passes, stats.total_duration_ms
    );

    Ok(GenerationOutput {
        result: run.result,
        stats,
    })
}

/// Generate flashcards and write the result to `output_path`.
///
/// Structured results are written as pretty-printed JSON; raw results
/// (reduce format [`crate::config::OutputFormat::Text`]) are written
/// verbatim. Uses atomic
/// write (temp file + rename) to prevent partial files.
pub async fn generate_to_file(
    input_str: impl AsRef<str>,
    output_path: impl AsRef<Path>,
    config: &GenerationConfig,
) -> Result<GenerationStats, FlashcardError> {
    let output = generate(input_str, config).await?;
    let path = output_path.as_ref();

    match output.result {
        ReduceOutput::Flashcards(set) => set.save_json(path).await?,
        ReduceOutput::Raw(text) => {
            let tmp_path = path.with_extension("txt.tmp");
            tokio::fs::write(&tmp_path, &text).await.map_err(|e| {
                FlashcardError::OutputWriteFailed {
                    path: path.to_path_buf(),
                    source: e,
                }
            })?;
            tokio::fs::rename(&tmp_path, path).await.map_err(|e| {
                FlashcardError::OutputWriteFailed {
                    path: path.to_path_buf(),
                    source: e,
                }
            })?;
        }
    }

    Ok(output.stats)
}

/// Synchronous wrapper around [`generate`].
///
/// Creates a temporary tokio runtime internally.
pub fn generate_sync(
    input_str: impl AsRef<str>,
    config: &GenerationConfig,
) -> Result<GenerationOutput, FlashcardError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| FlashcardError::Internal(format!("Failed to create tokio runtime: {e}")))?
        .block_on(generate(input_str, config))
}

/// Resolve the LLM provider, from most-specific to least-specific.
///
/// 1. **Pre-built provider** (`config.provider`) — the caller constructed
///    and configured it entirely; used as-is. The route for tests and for
///    callers needing custom middleware.
/// 2. **Named provider** (`config.provider_name`) — instantiated via
///    [`ProviderFactory::create_llm_provider`], which reads the matching
///    API key (`OPENAI_API_KEY`, etc.) from the environment.
/// 3. **Auto-detection** (`ProviderFactory::from_env`) — scans known API
///    key variables and picks the first available provider.
fn resolve_provider(config: &GenerationConfig) -> Result<Arc<dyn LLMProvider>, FlashcardError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        return ProviderFactory::create_llm_provider(name, &config.model).map_err(|e| {
            FlashcardError::ProviderNotConfigured {
                provider: name.clone(),
                hint: format!("{e}"),
            }
        });
    }

    let (provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| FlashcardError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                 Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider.\n\
                 Error: {e}"
            ),
        })?;
    Ok(provider)
}
