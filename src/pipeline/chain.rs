//! Model chains: prompt template | provider | output parser.
//!
//! A chain owns everything one model call needs — the rendered two-message
//! prompt, the provider handle, completion options, and how to interpret the
//! response. The workflow in [`crate::pipeline::graph`] only sees the
//! [`MapStep`] and [`ReduceStep`] traits, so tests drive the state machine
//! with scripted implementations and no network.
//!
//! ## Retry behaviour
//!
//! HTTP 429/5xx errors from chat APIs are transient and frequent under
//! concurrent load. Each call retries a small bounded number of times with
//! exponential backoff (`retry_backoff_ms` doubling per attempt) before surfacing a
//! [`FlashcardError::ModelCallFailed`]. This is transport-level resilience,
//! not a tunable policy: the default is 2 retries, matching the original
//! client configuration.

use crate::config::{GenerationConfig, OutputFormat};
use crate::error::FlashcardError;
use crate::output::{FlashcardSet, ReduceOutput};
use crate::prompt::PromptTemplate;
use async_trait::async_trait;
use edgequake_llm::{CompletionOptions, LLMProvider};
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::time::{sleep, Duration};
use tracing::{debug, warn};

/// The map step: summarise one chunk or one concatenated group of documents.
#[async_trait]
pub trait MapStep: Send + Sync {
    async fn summarize(&self, docs: &str) -> Result<String, FlashcardError>;
}

/// The reduce step: distill the full summary set into the final result.
#[async_trait]
pub trait ReduceStep: Send + Sync {
    async fn distill(&self, docs: &str) -> Result<ReduceOutput, FlashcardError>;
}

/// Cumulative token usage across every call a chain has made.
#[derive(Debug, Default)]
pub struct ChainUsage {
    prompt_tokens: AtomicU64,
    completion_tokens: AtomicU64,
}

impl ChainUsage {
    /// (prompt tokens, completion tokens) so far.
    pub fn totals(&self) -> (u64, u64) {
        (
            self.prompt_tokens.load(Ordering::Relaxed),
            self.completion_tokens.load(Ordering::Relaxed),
        )
    }

    fn record(&self, prompt: u64, completion: u64) {
        self.prompt_tokens.fetch_add(prompt, Ordering::Relaxed);
        self.completion_tokens.fetch_add(completion, Ordering::Relaxed);
    }
}

/// A prompt | provider | parser chain backed by a live LLM provider.
pub struct LlmChain {
    template: PromptTemplate,
    provider: Arc<dyn LLMProvider>,
    options: CompletionOptions,
    format: OutputFormat,
    step: &'static str,
    max_retries: u32,
    retry_backoff_ms: u64,
    usage: Arc<ChainUsage>,
}

impl LlmChain {
    pub fn new(
        template: PromptTemplate,
        provider: Arc<dyn LLMProvider>,
        format: OutputFormat,
        step: &'static str,
        config: &GenerationConfig,
    ) -> Self {
        let options = CompletionOptions {
            temperature: Some(config.temperature),
            max_tokens: config.max_completion_tokens,
            ..Default::default()
        };
        Self {
            template,
            provider,
            options,
            format,
            step,
            max_retries: config.max_retries,
            retry_backoff_ms: config.retry_backoff_ms,
            usage: Arc::new(ChainUsage::default()),
        }
    }

    /// Shared usage counters for stats reporting.
    pub fn usage(&self) -> Arc<ChainUsage> {
        Arc::clone(&self.usage)
    }

    /// Render the template against `docs` and complete, with bounded retry.
    async fn complete(&self, docs: &str) -> Result<String, FlashcardError> {
        let messages = self.template.render(docs);
        let mut last_err: Option<String> = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let backoff = self.retry_backoff_ms * 2u64.pow(attempt - 1);
                warn!(
                    "{} call: retry {}/{} after {}ms",
                    self.step, attempt, self.max_retries, backoff
                );
                sleep(Duration::from_millis(backoff)).await;
            }

            match self.provider.chat(&messages, Some(&self.options)).await {
                Ok(response) => {
                    debug!(
                        "{} call: {} prompt tokens, {} completion tokens",
                        self.step, response.prompt_tokens, response.completion_tokens
                    );
                    self.usage.record(
                        response.prompt_tokens as u64,
                        response.completion_tokens as u64,
                    );
                    return Ok(response.content);
                }
                Err(e) => {
                    let msg = e.to_string();
                    warn!("{} call: attempt {} failed — {}", self.step, attempt + 1, msg);
                    last_err = Some(msg);
                }
            }
        }

        Err(FlashcardError::ModelCallFailed {
            step: self.step,
            retries: self.max_retries,
            detail: last_err.unwrap_or_else(|| "unknown error".to_string()),
        })
    }
}

#[async_trait]
impl MapStep for LlmChain {
    async fn summarize(&self, docs: &str) -> Result<String, FlashcardError> {
        let raw = self.complete(docs).await?;
        parse_map_output(self.format, raw)
    }
}

#[async_trait]
impl ReduceStep for LlmChain {
    async fn distill(&self, docs: &str) -> Result<ReduceOutput, FlashcardError> {
        let raw = self.complete(docs).await?;
        match self.format {
            OutputFormat::Text => Ok(ReduceOutput::Raw(raw)),
            OutputFormat::Json => Ok(ReduceOutput::Flashcards(parse_flashcards(&raw)?)),
        }
    }
}

// ── JSON output parsing ──────────────────────────────────────────────────

static RE_JSON_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```(?:json)?\s*\n(.*?)\n\s*```").unwrap());

/// Parse a model completion into a [`FlashcardSet`].
///
/// Models regularly wrap JSON in markdown fences or lead with prose despite
/// the prompt asking for bare JSON, so parsing is forgiving about the
/// surroundings: a fenced block wins, otherwise the outermost `{…}` span is
/// tried. The object itself must map strings to strings — flashcard answers
/// are text, so any other value shape is an [`FlashcardError::OutputParseFailed`].
pub fn parse_flashcards(raw: &str) -> Result<FlashcardSet, FlashcardError> {
    let candidate = extract_json_candidate(raw);

    let object: serde_json::Map<String, serde_json::Value> = serde_json::from_str(candidate)
        .map_err(|e| FlashcardError::OutputParseFailed {
            detail: e.to_string(),
            snippet: snippet(raw),
        })?;

    let mut cards = std::collections::BTreeMap::new();
    for (question, answer) in object {
        match answer {
            serde_json::Value::String(text) => {
                cards.insert(question, text);
            }
            other => {
                return Err(FlashcardError::OutputParseFailed {
                    detail: format!("answer for {question:?} is not a string: {other}"),
                    snippet: snippet(raw),
                });
            }
        }
    }
    Ok(FlashcardSet(cards))
}

/// Apply the configured output format to a map-step completion.
///
/// `Text` keeps the completion as-is. `Json` requires the completion to
/// contain a JSON document and strips the prose and fences around it, so the
/// summary re-enters later prompts as clean JSON.
fn parse_map_output(format: OutputFormat, raw: String) -> Result<String, FlashcardError> {
    match format {
        OutputFormat::Text => Ok(raw),
        OutputFormat::Json => extract_json(&raw).map(str::to_owned),
    }
}

/// Isolate the JSON document inside a completion and check it parses.
fn extract_json(raw: &str) -> Result<&str, FlashcardError> {
    let candidate = extract_json_candidate(raw);
    serde_json::from_str::<serde_json::Value>(candidate).map_err(|e| {
        FlashcardError::OutputParseFailed {
            detail: e.to_string(),
            snippet: snippet(raw),
        }
    })?;
    Ok(candidate)
}

/// Best-effort isolation of the JSON object inside a completion.
fn extract_json_candidate(raw: &str) -> &str {
    if let Some(caps) = RE_JSON_FENCE.captures(raw) {
        return caps.get(1).map_or(raw, |m| m.as_str());
    }
    match (raw.find('{'), raw.rfind('}')) {
        (Some(start), Some(end)) if start < end => &raw[start..=end],
        _ => raw.trim(),
    }
}

fn snippet(raw: &str) -> String {
    raw.chars().take(40).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_json_object() {
        let set = parse_flashcards(r#"{"What is X?": "X is Y."}"#).unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(set.0["What is X?"], "X is Y.");
    }

    #[test]
    fn parses_fenced_json() {
        let raw = "Here you go:\n```json\n{\"Q\": \"A\"}\n```\nHope that helps!";
        let set = parse_flashcards(raw).unwrap();
        assert_eq!(set.0["Q"], "A");
    }

    #[test]
    fn parses_json_with_leading_prose() {
        let raw = "Sure! {\"Q1\": \"A1\", \"Q2\": \"A2\"} Done.";
        let set = parse_flashcards(raw).unwrap();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn rejects_non_json() {
        let err = parse_flashcards("I could not produce flashcards.").unwrap_err();
        assert!(matches!(err, FlashcardError::OutputParseFailed { .. }));
    }

    #[test]
    fn rejects_non_string_answers() {
        let err = parse_flashcards(r#"{"Q": ["a", "list"]}"#).unwrap_err();
        match err {
            FlashcardError::OutputParseFailed { detail, .. } => {
                assert!(detail.contains("not a string"), "got: {detail}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn rejects_json_array() {
        let err = parse_flashcards(r#"["just", "an", "array"]"#).unwrap_err();
        assert!(matches!(err, FlashcardError::OutputParseFailed { .. }));
    }

    #[test]
    fn map_text_format_passes_output_through() {
        let raw = "A plain prose summary.".to_string();
        let out = parse_map_output(OutputFormat::Text, raw.clone()).unwrap();
        assert_eq!(out, raw);
    }

    #[test]
    fn map_json_format_strips_fences_and_prose() {
        let raw = "Here you go:\n```json\n{\"term\": \"definition\"}\n```\n".to_string();
        let out = parse_map_output(OutputFormat::Json, raw).unwrap();
        assert_eq!(out, "{\"term\": \"definition\"}");
    }

    #[test]
    fn map_json_format_rejects_non_json_output() {
        let err = parse_map_output(OutputFormat::Json, "no json in sight".to_string()).unwrap_err();
        assert!(matches!(err, FlashcardError::OutputParseFailed { .. }));
    }

    #[test]
    fn usage_accumulates() {
        let usage = ChainUsage::default();
        usage.record(100, 40);
        usage.record(50, 10);
        assert_eq!(usage.totals(), (150, 50));
    }
}
