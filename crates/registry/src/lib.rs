//! Versioned agent registry for AgentGate.
//!
//! The registry owns agent definitions: validation and normalization of
//! incoming specs, SQLite-backed versioned storage, preset seeding, and an
//! explicit change-notification channel consumed by the SSE surface.

pub mod spec;
pub mod store;

pub use spec::{normalize_spec, parse_preset_toml};
pub use store::{AgentSummary, ListFilter, RegistryStore};

use serde_json::Value;
use thiserror::Error;

/// Registry errors.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The spec failed validation; `details` may carry structured info.
    #[error("{message}")]
    SpecInvalid {
        message: String,
        details: Option<Value>,
    },

    #[error("Agent version already exists: {id}@{version}")]
    VersionExists { id: String, version: String },

    #[error("Agent not found: {0}")]
    NotFound(String),

    #[error("Agent is owned by another user")]
    NotOwner,

    #[error("Storage error: {0}")]
    Storage(String),
}

impl RegistryError {
    pub fn spec_invalid(message: impl Into<String>) -> Self {
        Self::SpecInvalid {
            message: message.into(),
            details: None,
        }
    }
}
