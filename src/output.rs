//! Output types: flashcard sets, run statistics, and JSON persistence.

use crate::error::FlashcardError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// The terminal artifact: a mapping from question text to answer text.
///
/// Keys are unique by construction. `BTreeMap` keeps serialised output in a
/// deterministic order, which makes diffs between runs readable; the JSON
/// round trip compares equal regardless of key order in the file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlashcardSet(pub BTreeMap<String, String>);

impl FlashcardSet {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }

    /// Serialise to pretty-printed JSON and write atomically
    /// (temp file + rename) so a crash never leaves a partial file.
    pub async fn save_json(&self, path: impl AsRef<Path>) -> Result<(), FlashcardError> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| FlashcardError::Internal(format!("serialize flashcards: {e}")))?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    FlashcardError::OutputWriteFailed {
                        path: path.to_path_buf(),
                        source: e,
                    }
                })?;
            }
        }

        let tmp_path = path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, &json)
            .await
            .map_err(|e| FlashcardError::OutputWriteFailed {
                path: path.to_path_buf(),
                source: e,
            })?;

        tokio::fs::rename(&tmp_path, path)
            .await
            .map_err(|e| FlashcardError::OutputWriteFailed {
                path: path.to_path_buf(),
                source: e,
            })
    }

    /// Load a flashcard set previously written by [`FlashcardSet::save_json`].
    pub async fn load_json(path: impl AsRef<Path>) -> Result<Self, FlashcardError> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => FlashcardError::FileNotFound {
                path: path.to_path_buf(),
            },
            _ => FlashcardError::Internal(format!("Failed to read '{}': {e}", path.display())),
        })?;

        serde_json::from_str(&raw).map_err(|e| FlashcardError::OutputParseFailed {
            detail: e.to_string(),
            snippet: raw.chars().take(40).collect(),
        })
    }
}

impl FromIterator<(String, String)> for FlashcardSet {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// What the reduce step produced, shaped by the configured output format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReduceOutput {
    /// Structured question/answer pairs (JSON output format).
    Flashcards(FlashcardSet),
    /// The raw model completion (text output format).
    Raw(String),
}

impl ReduceOutput {
    /// The flashcard set, or an error when the run was configured for raw
    /// text output.
    pub fn into_flashcards(self) -> Result<FlashcardSet, FlashcardError> {
        match self {
            ReduceOutput::Flashcards(set) => Ok(set),
            ReduceOutput::Raw(_) => Err(FlashcardError::Internal(
                "reduce step was configured for raw text output, not flashcards".into(),
            )),
        }
    }
}

/// Statistics for one generation run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerationStats {
    /// Chunks produced by the loader.
    pub chunk_count: usize,
    /// Per-chunk summaries accumulated during fan-out.
    pub summary_count: usize,
    /// Collapse passes executed before the list fit under the ceiling.
    pub collapse_passes: usize,
    /// Prompt tokens reported by the provider across all calls.
    pub total_input_tokens: u64,
    /// Completion tokens reported by the provider across all calls.
    pub total_output_tokens: u64,
    /// Wall-clock time spent extracting and chunking the PDF.
    pub load_duration_ms: u64,
    /// Wall-clock time spent in model calls (fan-out + collapse + reduce).
    pub llm_duration_ms: u64,
    /// End-to-end wall-clock time.
    pub total_duration_ms: u64,
}

/// Complete result of a generation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationOutput {
    /// The reduce step's final result.
    pub result: ReduceOutput,
    /// Run statistics.
    pub stats: GenerationStats,
}
