//! CompletionBackend trait — the abstraction over text-completion backends.
//!
//! A backend takes an assembled prompt plus the target output schema and
//! returns structured JSON output. The pipeline calls `complete()` without
//! knowing which backend is behind it — stub, OpenAI-compatible HTTP, or a
//! test double.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::BackendError;

/// The canonical backend output: parsed JSON object plus the raw text the
/// backend produced. Every [`BackendResult`] normalizes into this.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResult {
    /// Parsed JSON object (empty when the raw text did not parse)
    pub parsed: Map<String, Value>,

    /// Raw completion text as returned by the backend
    pub raw_text: String,
}

impl CompletionResult {
    pub fn new(parsed: Map<String, Value>, raw_text: impl Into<String>) -> Self {
        Self {
            parsed,
            raw_text: raw_text.into(),
        }
    }
}

/// What a backend may hand back.
///
/// Some backends produce a full [`CompletionResult`]; simpler ones (and test
/// doubles) return a bare JSON mapping. Modeling this as a sum type keeps
/// the variance at the type level — the pipeline resolves it to the single
/// canonical shape at its boundary instead of sniffing at runtime.
#[derive(Debug, Clone)]
pub enum BackendResult {
    Structured(CompletionResult),
    Raw(Map<String, Value>),
}

impl BackendResult {
    /// Resolve to the canonical shape. A raw mapping serializes itself to
    /// produce the raw text.
    pub fn normalize(self) -> CompletionResult {
        match self {
            BackendResult::Structured(result) => result,
            BackendResult::Raw(map) => {
                let raw_text =
                    serde_json::to_string(&map).unwrap_or_else(|_| String::from("{}"));
                CompletionResult {
                    parsed: map,
                    raw_text,
                }
            }
        }
    }
}

impl From<Map<String, Value>> for BackendResult {
    fn from(map: Map<String, Value>) -> Self {
        BackendResult::Raw(map)
    }
}

/// The core CompletionBackend trait.
///
/// Implementations must be cheap to share (`Arc<dyn CompletionBackend>`) and
/// safe to call concurrently.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// A human-readable name for this backend (e.g. "stub", "openai").
    fn name(&self) -> &str;

    /// Complete `prompt` into JSON intended to satisfy `schema`.
    ///
    /// The schema is advisory for the backend (it may or may not constrain
    /// generation with it); the pipeline always validates the result itself.
    async fn complete(&self, prompt: &str, schema: &Value) -> Result<BackendResult, BackendError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn raw_result_normalizes_with_serialized_text() {
        let mut map = Map::new();
        map.insert("summary".into(), json!("hi"));
        let result = BackendResult::Raw(map).normalize();
        assert_eq!(result.parsed.get("summary"), Some(&json!("hi")));
        assert_eq!(result.raw_text, r#"{"summary":"hi"}"#);
    }

    #[test]
    fn structured_result_passes_through() {
        let result = BackendResult::Structured(CompletionResult::new(Map::new(), "not json"));
        let normalized = result.normalize();
        assert!(normalized.parsed.is_empty());
        assert_eq!(normalized.raw_text, "not json");
    }
}
