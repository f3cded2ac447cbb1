//! Error types for the pdf2cards library.
//!
//! Every failure in the pipeline is fatal: there is no partial-result or
//! resumable-run capability, so one enum covers the whole taxonomy. The first
//! error anywhere — loading, prompt construction, any workflow state — aborts
//! the run and is returned from the top-level `generate*` functions as a
//! single [`FlashcardError`] with a human-readable message.
//!
//! Model-call failures carry the name of the workflow step that issued the
//! call (`fan-out`, `collapse`, `reduce`) so callers can tell a failed chunk
//! summary apart from a failed final distillation.

use std::path::PathBuf;
use thiserror::Error;

/// All errors returned by the pdf2cards library.
#[derive(Debug, Error)]
pub enum FlashcardError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{}'\nCheck the path exists and is readable.", .path.display())]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{}'\nTry: chmod +r {path:?}", .path.display())]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{}'\nFirst bytes: {magic:?}", .path.display())]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    // ── Document errors ───────────────────────────────────────────────────
    /// The PDF could not be parsed into text.
    #[error("Failed to extract text from '{}': {detail}", .path.display())]
    ExtractionFailed { path: PathBuf, detail: String },

    /// The PDF parsed but contains no extractable text.
    #[error("Document '{}' contains no extractable text (scanned image-only PDF?)", .path.display())]
    EmptyDocument { path: PathBuf },

    // ── Prompt errors ─────────────────────────────────────────────────────
    /// A prompt configuration is missing a required field or placeholder.
    #[error("Malformed prompt configuration: {detail}")]
    MalformedPromptConfig { detail: String },

    // ── LLM errors ────────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// A model call failed after exhausting the transport's bounded retries.
    ///
    /// `step` names the workflow state that issued the call: `fan-out`,
    /// `collapse`, or `reduce`.
    #[error("Model call failed during {step} after {retries} retries: {detail}")]
    ModelCallFailed {
        step: &'static str,
        retries: u32,
        detail: String,
    },

    /// The reduce-step response was not in the expected structured format.
    #[error("Failed to parse model output as JSON flashcards: {detail}\nResponse started with: {snippet:?}")]
    OutputParseFailed { detail: String, snippet: String },

    // ── Budget errors ─────────────────────────────────────────────────────
    /// A single summary alone exceeds the token ceiling, so the collapse
    /// loop cannot shrink it further (policy: fail fast).
    #[error(
        "A single summary is {tokens} tokens, over the {token_max}-token ceiling.\n\
         Lower --chunk-size, raise --token-max, or pass --oversized pass."
    )]
    SummaryOverBudget { tokens: usize, token_max: usize },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output JSON file.
    #[error("Failed to write output file '{}': {source}", .path.display())]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_call_failed_names_the_step() {
        let e = FlashcardError::ModelCallFailed {
            step: "fan-out",
            retries: 2,
            detail: "HTTP 503".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("fan-out"), "got: {msg}");
        assert!(msg.contains("2 retries"), "got: {msg}");
    }

    #[test]
    fn over_budget_display() {
        let e = FlashcardError::SummaryOverBudget {
            tokens: 120_000,
            token_max: 100_000,
        };
        let msg = e.to_string();
        assert!(msg.contains("120000"));
        assert!(msg.contains("100000"));
    }

    #[test]
    fn output_parse_failed_includes_snippet() {
        let e = FlashcardError::OutputParseFailed {
            detail: "expected object".into(),
            snippet: "Sure! Here are".into(),
        };
        assert!(e.to_string().contains("Sure! Here are"));
    }

    #[test]
    fn empty_document_display() {
        let e = FlashcardError::EmptyDocument {
            path: PathBuf::from("/tmp/blank.pdf"),
        };
        assert!(e.to_string().contains("blank.pdf"));
    }
}
