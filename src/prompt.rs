//! Prompt configuration and the two-message chat template.
//!
//! A prompt is declarative data: a `system` instruction plus a `user` message
//! template containing a `{docs}` placeholder. Centralising the built-in
//! defaults here means changing the default flashcard style requires editing
//! exactly one place, and unit tests can inspect prompts without a live model.
//!
//! Callers override the defaults per run with JSON files
//! (`--map-prompt` / `--reduce-prompt`) or by setting
//! [`crate::config::GenerationConfig::map_prompt`] /
//! [`crate::config::GenerationConfig::reduce_prompt`] directly.

use crate::error::FlashcardError;
use edgequake_llm::ChatMessage;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Placeholder substituted with document content when a template is rendered.
pub const DOCS_PLACEHOLDER: &str = "{docs}";

/// Default system instruction for the map (per-chunk summary) step.
pub const DEFAULT_MAP_SYSTEM: &str =
    "You are a helpful assistant specialized in effectively summarizing any kind of text";

/// Default user template for the map step.
pub const DEFAULT_MAP_USER: &str = r#"Based on the provided documents, please write a summary by picking out the major CONCEPTS, TERMS, DEFINITIONS,
and ACRONYMS that are important in the documents.

Prioritize clarity and brevity while retaining the essential information.

Aim to convey any supporting details that contribute to a comprehensive understanding of each CONCEPT, TERM, DEFINITION and ACRONYM.

Do not focus on historical context (when something was introduced or implemented). Ignore anything that looks like source code.

DOCUMENTS:
{docs}

Helpful Answer:
"#;

/// Default system instruction for the reduce (flashcard distillation) step.
pub const DEFAULT_REDUCE_SYSTEM: &str = "You are a helpful assistant";

/// Default user template for the reduce step.
pub const DEFAULT_REDUCE_USER: &str = r#"The following is set of definitions/concepts:
{docs}
Take these and distill it into a final, consolidated list of at least twenty (20) definitions/concepts.

For each of these, generate a question and an answer. The goal is that these tuples of questions and answers will
be used to create flashcards.

Please provide the result in a JSON format, using questions as keys and answers as values.

Helpful Answer:"#;

/// Declarative prompt configuration: a system instruction plus a user
/// message template.
///
/// Deserialization fails when either field is missing, which is how a
/// malformed prompt file surfaces before any model call is made.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptConfig {
    /// System message setting context and instructions.
    pub system: String,
    /// User message template; must contain the `{docs}` placeholder.
    pub user: String,
}

impl PromptConfig {
    /// Built-in map prompt (chunk summarisation).
    pub fn default_map() -> Self {
        Self {
            system: DEFAULT_MAP_SYSTEM.to_string(),
            user: DEFAULT_MAP_USER.to_string(),
        }
    }

    /// Built-in reduce prompt (flashcard distillation, JSON output).
    pub fn default_reduce() -> Self {
        Self {
            system: DEFAULT_REDUCE_SYSTEM.to_string(),
            user: DEFAULT_REDUCE_USER.to_string(),
        }
    }
}

/// Load a [`PromptConfig`] from a JSON file.
pub fn load_prompt_config(path: impl AsRef<Path>) -> Result<PromptConfig, FlashcardError> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => FlashcardError::FileNotFound {
            path: path.to_path_buf(),
        },
        std::io::ErrorKind::PermissionDenied => FlashcardError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => FlashcardError::Internal(format!("Failed to read '{}': {e}", path.display())),
    })?;

    serde_json::from_str(&raw).map_err(|e| FlashcardError::MalformedPromptConfig {
        detail: format!("'{}': {e}", path.display()),
    })
}

/// A validated, reusable two-message chat template.
///
/// Construction checks the invariants once so rendering is infallible:
/// both fields non-blank, and the user template carries the `{docs}`
/// placeholder (a template without it would send the model a prompt with no
/// document content — silently, at full cost).
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    system: String,
    user: String,
}

impl PromptTemplate {
    /// Validate `config` into a renderable template.
    pub fn new(config: &PromptConfig) -> Result<Self, FlashcardError> {
        if config.system.trim().is_empty() {
            return Err(FlashcardError::MalformedPromptConfig {
                detail: "'system' field is empty".into(),
            });
        }
        if config.user.trim().is_empty() {
            return Err(FlashcardError::MalformedPromptConfig {
                detail: "'user' field is empty".into(),
            });
        }
        if !config.user.contains(DOCS_PLACEHOLDER) {
            return Err(FlashcardError::MalformedPromptConfig {
                detail: format!("'user' template does not contain the {DOCS_PLACEHOLDER} placeholder"),
            });
        }
        Ok(Self {
            system: config.system.clone(),
            user: config.user.clone(),
        })
    }

    /// Render the template against `docs`, producing the system + user
    /// message pair for one chat completion.
    pub fn render(&self, docs: &str) -> Vec<ChatMessage> {
        vec![
            ChatMessage::system(self.system.replace(DOCS_PLACEHOLDER, docs)),
            ChatMessage::user(self.user.replace(DOCS_PLACEHOLDER, docs)),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_prompts_validate() {
        PromptTemplate::new(&PromptConfig::default_map()).unwrap();
        PromptTemplate::new(&PromptConfig::default_reduce()).unwrap();
    }

    #[test]
    fn missing_field_fails_deserialization() {
        let err = serde_json::from_str::<PromptConfig>(r#"{"system": "only system"}"#);
        assert!(err.is_err());
    }

    #[test]
    fn empty_system_rejected() {
        let config = PromptConfig {
            system: "  ".into(),
            user: "summarize {docs}".into(),
        };
        let err = PromptTemplate::new(&config).unwrap_err();
        assert!(matches!(err, FlashcardError::MalformedPromptConfig { .. }));
    }

    #[test]
    fn missing_placeholder_rejected() {
        let config = PromptConfig {
            system: "sys".into(),
            user: "no placeholder here".into(),
        };
        let err = PromptTemplate::new(&config).unwrap_err();
        assert!(err.to_string().contains("{docs}"), "got: {err}");
    }

    #[test]
    fn render_substitutes_docs() {
        let config = PromptConfig {
            system: "sys".into(),
            user: "DOCUMENTS:\n{docs}\nAnswer:".into(),
        };
        let template = PromptTemplate::new(&config).unwrap();
        let messages = template.render("chunk text here");
        assert_eq!(messages.len(), 2);
    }

    #[test]
    fn load_prompt_config_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("map_prompt.json");
        std::fs::write(
            &path,
            serde_json::to_string(&PromptConfig::default_map()).unwrap(),
        )
        .unwrap();

        let loaded = load_prompt_config(&path).unwrap();
        assert_eq!(loaded, PromptConfig::default_map());
    }

    #[test]
    fn load_prompt_config_missing_file() {
        let err = load_prompt_config("/nonexistent/prompt.json").unwrap_err();
        assert!(matches!(err, FlashcardError::FileNotFound { .. }));
    }

    #[test]
    fn load_prompt_config_invalid_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{not json").unwrap();

        let err = load_prompt_config(&path).unwrap_err();
        assert!(matches!(err, FlashcardError::MalformedPromptConfig { .. }));
    }
}
