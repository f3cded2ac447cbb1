//! Configuration types for flashcard generation.
//!
//! All behaviour is controlled through [`GenerationConfig`], built via its
//! [`GenerationConfigBuilder`]. Keeping every knob in one struct makes it
//! trivial to share configs across tasks, log them, and diff two runs to
//! understand why their outputs differ.
//!
//! There is deliberately no global model client: the provider travels inside
//! the config and is handed to the workflow explicitly, so two runs with
//! different providers can coexist in one process.

use crate::error::FlashcardError;
use crate::progress::ProgressCallback;
use crate::prompt::PromptConfig;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Maximum total token length permitted for a batch of intermediate
/// summaries before the collapse loop must shrink it.
pub const DEFAULT_TOKEN_MAX: usize = 100_000;

/// Configuration for a flashcard generation run.
///
/// Built via [`GenerationConfig::builder()`] or using
/// [`GenerationConfig::default()`].
///
/// # Example
/// ```rust
/// use pdf2cards::GenerationConfig;
///
/// let config = GenerationConfig::builder()
///     .chunk_size(800)
///     .concurrency(5)
///     .model("gpt-4o")
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct GenerationConfig {
    /// Target chunk size in model tokens. Default: 1000.
    ///
    /// Each chunk becomes one map call, so chunk size trades per-call cost
    /// against the number of calls. 1000 tokens keeps a chunk comfortably
    /// inside any modern context window while giving the model enough
    /// material to extract coherent concepts from.
    pub chunk_size: usize,

    /// Tokens of overlap between consecutive chunks within a page. Default: 0.
    ///
    /// Overlap repeats the tail of chunk *i* at the head of chunk *i+1* so a
    /// definition cut mid-sentence still appears whole in one of the two
    /// chunks. Costs proportionally more tokens per run.
    pub chunk_overlap: usize,

    /// Token ceiling for the intermediate-summary batch. Default: 100 000.
    ///
    /// When the accumulated summaries exceed this, the workflow collapses
    /// them in groups until the batch fits. Size it below the reduce model's
    /// context window, leaving headroom for the prompt template itself.
    pub token_max: usize,

    /// Number of concurrent model calls during fan-out and collapse. Default: 10.
    ///
    /// Chat APIs are network-bound; ten in-flight calls typically cut
    /// wall-clock time by 8–9× over sequential summarisation. Lower this if
    /// you hit rate-limit errors.
    pub concurrency: usize,

    /// LLM model identifier, e.g. "gpt-4o". Default: "gpt-4o".
    ///
    /// Also selects the tiktoken encoding used for chunk sizing and budget
    /// checks, so counts match what the provider bills.
    pub model: String,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    /// If None along with `provider`, the provider is auto-detected from
    /// API-key environment variables.
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature. Default: 0.0.
    ///
    /// Summaries and flashcards should be faithful to the source; zero
    /// temperature keeps the model deterministic and extractive.
    pub temperature: f32,

    /// Maximum tokens the model may generate per call. Default: None
    /// (provider default).
    pub max_completion_tokens: Option<usize>,

    /// Bounded retries on a transient model-call failure. Default: 2.
    ///
    /// Transient 5xx/timeout errors are frequent under concurrent load.
    /// This mirrors the transport-level retry count of the original client
    /// configuration; it is not a tunable backoff policy.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds (doubles per attempt). Default: 500.
    pub retry_backoff_ms: u64,

    /// Map-step prompt. Default: the built-in concept-extraction prompt.
    pub map_prompt: Option<PromptConfig>,

    /// Reduce-step prompt. Default: the built-in flashcard prompt.
    pub reduce_prompt: Option<PromptConfig>,

    /// How the map-step output is interpreted. Default: [`OutputFormat::Text`].
    ///
    /// With [`OutputFormat::Json`] each summary must contain a JSON
    /// document; surrounding prose and markdown fences are stripped before
    /// the summary re-enters later prompts.
    pub map_format: OutputFormat,

    /// How the reduce-step output is interpreted. Default: [`OutputFormat::Json`].
    pub reduce_format: OutputFormat,

    /// What to do when one summary alone exceeds `token_max`.
    /// Default: [`OversizedSummaryPolicy::FailFast`].
    pub oversized_policy: OversizedSummaryPolicy,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Optional progress callback receiving workflow events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 0,
            token_max: DEFAULT_TOKEN_MAX,
            concurrency: 10,
            model: "gpt-4o".to_string(),
            provider_name: None,
            provider: None,
            temperature: 0.0,
            max_completion_tokens: None,
            max_retries: 2,
            retry_backoff_ms: 500,
            map_prompt: None,
            reduce_prompt: None,
            map_format: OutputFormat::Text,
            reduce_format: OutputFormat::Json,
            oversized_policy: OversizedSummaryPolicy::default(),
            download_timeout_secs: 120,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for GenerationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenerationConfig")
            .field("chunk_size", &self.chunk_size)
            .field("chunk_overlap", &self.chunk_overlap)
            .field("token_max", &self.token_max)
            .field("concurrency", &self.concurrency)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_completion_tokens", &self.max_completion_tokens)
            .field("max_retries", &self.max_retries)
            .field("map_format", &self.map_format)
            .field("reduce_format", &self.reduce_format)
            .field("oversized_policy", &self.oversized_policy)
            .finish()
    }
}

impl GenerationConfig {
    /// Create a new builder for `GenerationConfig`.
    pub fn builder() -> GenerationConfigBuilder {
        GenerationConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`GenerationConfig`].
#[derive(Debug)]
pub struct GenerationConfigBuilder {
    config: GenerationConfig,
}

impl GenerationConfigBuilder {
    pub fn chunk_size(mut self, tokens: usize) -> Self {
        self.config.chunk_size = tokens.max(1);
        self
    }

    pub fn chunk_overlap(mut self, tokens: usize) -> Self {
        self.config.chunk_overlap = tokens;
        self
    }

    pub fn token_max(mut self, tokens: usize) -> Self {
        self.config.token_max = tokens.max(1);
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_completion_tokens(mut self, n: usize) -> Self {
        self.config.max_completion_tokens = Some(n);
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn map_prompt(mut self, prompt: PromptConfig) -> Self {
        self.config.map_prompt = Some(prompt);
        self
    }

    pub fn reduce_prompt(mut self, prompt: PromptConfig) -> Self {
        self.config.reduce_prompt = Some(prompt);
        self
    }

    pub fn map_format(mut self, format: OutputFormat) -> Self {
        self.config.map_format = format;
        self
    }

    pub fn reduce_format(mut self, format: OutputFormat) -> Self {
        self.config.reduce_format = format;
        self
    }

    pub fn oversized_policy(mut self, policy: OversizedSummaryPolicy) -> Self {
        self.config.oversized_policy = policy;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<GenerationConfig, FlashcardError> {
        let c = &self.config;
        if c.chunk_size == 0 {
            return Err(FlashcardError::InvalidConfig("chunk_size must be ≥ 1".into()));
        }
        if c.chunk_overlap >= c.chunk_size {
            return Err(FlashcardError::InvalidConfig(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                c.chunk_overlap, c.chunk_size
            )));
        }
        if c.token_max == 0 {
            return Err(FlashcardError::InvalidConfig("token_max must be ≥ 1".into()));
        }
        if c.concurrency == 0 {
            return Err(FlashcardError::InvalidConfig("concurrency must be ≥ 1".into()));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// How a step's model output is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OutputFormat {
    /// Keep the completion as-is.
    #[default]
    Text,
    /// Parse the completion as a JSON object of question → answer strings.
    Json,
}

/// Policy for a single summary whose token length alone exceeds the ceiling.
///
/// The greedy packing in the collapse loop puts such a summary in a group of
/// its own, where a further map call cannot meaningfully shrink it — without
/// an explicit policy the Decide/Collapse loop would either spin forever or
/// silently violate the budget. The policy makes the choice visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OversizedSummaryPolicy {
    /// Abort the run with [`crate::error::FlashcardError::SummaryOverBudget`]. (default)
    #[default]
    FailFast,
    /// Let the oversized summary pass to the reduce step un-collapsed,
    /// accepting that the batch may exceed the ceiling.
    PassThrough,
}
