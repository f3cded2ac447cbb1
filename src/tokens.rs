//! Token counting for budget decisions.
//!
//! The collapse loop in [`crate::pipeline::graph`] compares summary batches
//! against the token ceiling, so the counts here must come from the same
//! tokenizer the model itself applies — otherwise the budget enforcement is
//! unsound. [`TokenCounter`] resolves the BPE from the configured model name
//! via tiktoken, and the *same* `CoreBPE` instance drives the chunker in
//! [`crate::pipeline::load`], keeping chunk sizing and budget arithmetic
//! consistent.
//!
//! [`DocumentSizer`] is the seam the orchestrator actually depends on;
//! tests substitute a deterministic sizer to control packing decisions.

use crate::error::FlashcardError;
use tiktoken_rs::{cl100k_base, get_bpe_from_model, CoreBPE};
use tracing::debug;

/// Counts model tokens in a piece of text.
///
/// Object-safe so the orchestrator can hold `&dyn DocumentSizer`.
pub trait DocumentSizer: Send + Sync {
    /// Number of model tokens in `text`.
    fn count(&self, text: &str) -> usize;
}

/// Sum of token counts over a batch of text-bearing documents.
pub fn total_tokens<'a, I>(sizer: &dyn DocumentSizer, docs: I) -> usize
where
    I: IntoIterator<Item = &'a str>,
{
    docs.into_iter().map(|d| sizer.count(d)).sum()
}

/// Production sizer backed by the tiktoken BPE for a given model.
#[derive(Clone)]
pub struct TokenCounter {
    bpe: CoreBPE,
}

impl TokenCounter {
    /// Resolve the tokenizer for `model`.
    ///
    /// Unknown model names fall back to `cl100k_base`, the encoding shared by
    /// the gpt-4 family; a fallback is preferable to failing the whole run
    /// because the counts only gate collapsing, not correctness of output.
    pub fn for_model(model: &str) -> Result<Self, FlashcardError> {
        let bpe = match get_bpe_from_model(model) {
            Ok(bpe) => bpe,
            Err(e) => {
                debug!("No tiktoken encoding for model '{model}' ({e}); falling back to cl100k_base");
                cl100k_base()
                    .map_err(|e| FlashcardError::Internal(format!("Failed to load cl100k_base tokenizer: {e}")))?
            }
        };
        Ok(Self { bpe })
    }

    /// The underlying BPE, cloned for use as a `text_splitter` chunk sizer.
    pub fn bpe(&self) -> CoreBPE {
        self.bpe.clone()
    }
}

impl DocumentSizer for TokenCounter {
    fn count(&self, text: &str) -> usize {
        self.bpe.encode_with_special_tokens(text).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_for_known_model() {
        let counter = TokenCounter::for_model("gpt-4o").unwrap();
        assert!(counter.count("hello world") >= 2);
        assert_eq!(counter.count(""), 0);
    }

    #[test]
    fn counter_falls_back_for_unknown_model() {
        let counter = TokenCounter::for_model("definitely-not-a-model").unwrap();
        assert!(counter.count("fallback still counts tokens") > 0);
    }

    #[test]
    fn total_sums_over_batch() {
        let counter = TokenCounter::for_model("gpt-4o").unwrap();
        let docs = ["one two three", "four five"];
        let total = total_tokens(&counter, docs.iter().map(|s| &**s));
        assert_eq!(
            total,
            counter.count(docs[0]) + counter.count(docs[1])
        );
    }
}
