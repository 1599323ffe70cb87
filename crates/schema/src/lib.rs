//! JSON Schema validation adapter.
//!
//! Thin wrapper over the `jsonschema` crate, pinned to Draft-07 semantics.
//! Two jobs:
//!
//! - [`validate`] — check a value against a schema, producing one
//!   [`ValidationError`] per violation with the structural path into the
//!   offending value. Side-effect-free; never mutates value or schema.
//! - [`check_schema`] — load-time well-formedness check. A malformed schema
//!   is a load/registration-time error, never a per-request one.

use jsonschema::Draft;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// One step into a JSON value: an object key or an array index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    Index(usize),
    Key(String),
}

/// A single schema violation: where it happened and what went wrong.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    /// Path into the validated value (empty = root)
    pub path: Vec<PathSegment>,

    /// Human-readable description of the violation
    pub message: String,
}

impl ValidationError {
    /// A violation anchored at the root of the value.
    pub fn at_root(message: impl Into<String>) -> Self {
        Self {
            path: Vec::new(),
            message: message.into(),
        }
    }
}

/// Raised when a schema document itself is malformed.
#[derive(Debug, Clone, Error)]
pub enum SchemaError {
    #[error("schema does not conform to the JSON Schema meta-schema: {0}")]
    Meta(String),

    #[error("schema failed to compile: {0}")]
    Compile(String),
}

/// Validate `instance` against `schema` (Draft-07 semantics).
///
/// Returns an empty list iff `instance` satisfies `schema`. Schemas are
/// checked for well-formedness at load time, so a compile failure here is a
/// defensive dead-end: it is reported as a single root-path violation rather
/// than a panic, keeping the contract total.
pub fn validate(instance: &Value, schema: &Value) -> Vec<ValidationError> {
    let validator = match jsonschema::options().with_draft(Draft::Draft7).build(schema) {
        Ok(validator) => validator,
        Err(err) => {
            return vec![ValidationError::at_root(format!(
                "schema failed to compile: {err}"
            ))];
        }
    };

    validator
        .iter_errors(instance)
        .map(|err| ValidationError {
            path: parse_pointer(&err.instance_path().to_string()),
            message: err.to_string(),
        })
        .collect()
}

/// Check that `schema` is a well-formed Draft-07 schema document.
///
/// Validates against the meta-schema, then compiles, so both structural
/// problems ("minimum": "three") and compile-level ones surface at load time.
pub fn check_schema(schema: &Value) -> Result<(), SchemaError> {
    jsonschema::meta::validate(schema).map_err(|err| SchemaError::Meta(err.to_string()))?;
    jsonschema::options()
        .with_draft(Draft::Draft7)
        .build(schema)
        .map_err(|err| SchemaError::Compile(err.to_string()))?;
    Ok(())
}

/// Maximum nesting depth of a JSON value (objects and arrays).
/// Used by the registry to bound pathological schema documents.
pub fn value_depth(value: &Value) -> usize {
    match value {
        Value::Object(map) => map
            .values()
            .map(|v| 1 + value_depth(v))
            .max()
            .unwrap_or(0),
        Value::Array(items) => items
            .iter()
            .map(|v| 1 + value_depth(v))
            .max()
            .unwrap_or(0),
        _ => 0,
    }
}

/// Split a JSON Pointer ("/items/0/name") into typed segments.
/// All-digit segments are treated as array indices.
fn parse_pointer(pointer: &str) -> Vec<PathSegment> {
    pointer
        .split('/')
        .skip(1)
        .map(|raw| {
            let unescaped = raw.replace("~1", "/").replace("~0", "~");
            match unescaped.parse::<usize>() {
                Ok(index) => PathSegment::Index(index),
                Err(_) => PathSegment::Key(unescaped),
            }
        })
        .collect()
}
