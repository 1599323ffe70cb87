//! Agent definition types.
//!
//! An [`AgentDefinition`] is a named, versioned contract describing one task:
//! a prompt template plus strict input/output JSON Schemas. Definitions are
//! immutable per version — the registry hands them out by value and the
//! pipeline never mutates them.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A versioned agent definition.
///
/// `input_schema` and `output_schema` are JSON Schema Draft-07 documents.
/// The output schema root type must be `object`; the registry enforces this
/// at load/registration time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDefinition {
    /// Stable identifier (e.g. "summarizer")
    pub id: String,

    /// Semantic version string (e.g. "0.1.0")
    pub version: String,

    /// Display name
    pub name: String,

    /// Human-readable description
    pub description: String,

    /// Coarse task-category tag (e.g. "transform", "extract", "classify")
    pub primitive: String,

    /// JSON Schema the caller's `input` must satisfy
    pub input_schema: Value,

    /// JSON Schema the backend's output must satisfy (root type `object`)
    pub output_schema: Value,

    /// Prompt template body
    pub prompt: String,

    /// Whether invocations may read/write session memory
    #[serde(default)]
    pub supports_memory: bool,

    /// Retention policy for merged session memory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_policy: Option<MemoryPolicy>,

    /// Free-form classification tags
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,

    /// Attribution for community-contributed definitions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credits: Option<Credits>,
}

impl AgentDefinition {
    /// The memory policy to apply, falling back to defaults.
    pub fn effective_memory_policy(&self) -> MemoryPolicy {
        self.memory_policy.clone().unwrap_or_default()
    }
}

/// Retention policy for conversational memory.
///
/// Both bounds are always applied; the narrower of the two determines what
/// is retained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryPolicy {
    /// Retention mode
    #[serde(default)]
    pub mode: MemoryMode,

    /// Keep at most this many most-recent events (0 keeps none)
    #[serde(default = "default_max_messages")]
    pub max_messages: u32,

    /// Keep events while cumulative content length stays within this budget
    #[serde(default = "default_max_chars")]
    pub max_chars: u32,
}

fn default_max_messages() -> u32 {
    10
}
fn default_max_chars() -> u32 {
    8000
}

impl Default for MemoryPolicy {
    fn default() -> Self {
        Self {
            mode: MemoryMode::LastN,
            max_messages: default_max_messages(),
            max_chars: default_max_chars(),
        }
    }
}

/// How memory is retained. Only "keep most recent N" exists today.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryMode {
    #[default]
    LastN,
}

/// Attribution block on a registered agent spec.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credits {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}
