//! Deterministic stub backend.
//!
//! Fabricates a JSON value conforming to the requested output schema. The
//! generator is intentionally small but schema-aware enough for the shipped
//! preset schemas, which makes the whole pipeline exercisable without any
//! network access or API key.

use async_trait::async_trait;
use serde_json::{Map, Value};

use agentgate_core::backend::{BackendResult, CompletionBackend, CompletionResult};
use agentgate_core::error::BackendError;

/// A backend that deterministically generates schema-conforming JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct StubBackend;

impl StubBackend {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CompletionBackend for StubBackend {
    fn name(&self) -> &str {
        "stub"
    }

    async fn complete(&self, _prompt: &str, schema: &Value) -> Result<BackendResult, BackendError> {
        let generated = generate_from_schema(schema);
        let parsed = match generated {
            Value::Object(map) => map,
            other => {
                // Output schemas are object-rooted; anything else means the
                // schema declared a non-object root and the validator will say so.
                let mut map = Map::new();
                if !other.is_null() {
                    map.insert("value".into(), other);
                }
                map
            }
        };
        let raw_text = serde_json::to_string(&parsed)
            .map_err(|e| BackendError::InvalidResponse(e.to_string()))?;
        Ok(BackendResult::Structured(CompletionResult::new(
            parsed, raw_text,
        )))
    }
}

/// Very small deterministic JSON generator for Draft-07-style schemas.
fn generate_from_schema(schema: &Value) -> Value {
    let schema_type = schema.get("type").and_then(Value::as_str);

    match schema_type {
        Some("object") => {
            let mut result = Map::new();
            if let Some(props) = schema.get("properties").and_then(Value::as_object) {
                for (name, sub) in props {
                    result.insert(name.clone(), generate_from_schema(sub));
                }
            }
            // Fill required keys that are not part of properties.
            if let Some(required) = schema.get("required").and_then(Value::as_array) {
                for name in required.iter().filter_map(Value::as_str) {
                    result.entry(name).or_insert(Value::Null);
                }
            }
            Value::Object(result)
        }
        Some("array") => {
            // Always emit a single element to keep payloads small but non-empty.
            let items = schema.get("items").cloned().unwrap_or_else(|| {
                Value::Object(Map::new())
            });
            Value::Array(vec![generate_from_schema(&items)])
        }
        Some("string") => {
            // Small heuristics for nicer stub data.
            let title = schema
                .get("title")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_lowercase();
            let format = schema.get("format").and_then(Value::as_str);

            if title.contains("summary") {
                Value::String("stub summary".into())
            } else if title.contains("bullet") {
                Value::String("stub bullet".into())
            } else if format == Some("date") {
                Value::String("2099-01-01".into())
            } else {
                Value::String("stub".into())
            }
        }
        Some("number") => {
            // Return a value in [0, 1] when that is the intended range.
            let minimum = schema.get("minimum").and_then(Value::as_f64);
            let maximum = schema.get("maximum").and_then(Value::as_f64);
            if minimum == Some(0.0) && maximum == Some(1.0) {
                Value::from(0.5)
            } else {
                Value::from(1.0)
            }
        }
        Some("integer") => Value::from(1),
        Some("boolean") => Value::Bool(false),
        _ => {
            // Schemas without an explicit type but with properties act as objects.
            if schema.get("properties").is_some() {
                let mut widened = schema.clone();
                if let Some(obj) = widened.as_object_mut() {
                    obj.insert("type".into(), Value::String("object".into()));
                }
                generate_from_schema(&widened)
            } else {
                Value::Null
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn generates_object_for_object_schema() {
        let schema = json!({
            "type": "object",
            "required": ["summary", "score"],
            "properties": {
                "summary": {"type": "string", "title": "Summary"},
                "score": {"type": "number", "minimum": 0, "maximum": 1},
                "bullets": {"type": "array", "items": {"type": "string", "title": "Bullet"}}
            }
        });
        let result = StubBackend::new()
            .complete("ignored", &schema)
            .await
            .unwrap()
            .normalize();
        assert_eq!(result.parsed.get("summary"), Some(&json!("stub summary")));
        assert_eq!(result.parsed.get("score"), Some(&json!(0.5)));
        assert_eq!(result.parsed.get("bullets"), Some(&json!(["stub bullet"])));
    }

    #[tokio::test]
    async fn output_validates_against_its_own_schema() {
        let schema = json!({
            "type": "object",
            "required": ["data", "confidence"],
            "properties": {
                "data": {
                    "type": "object",
                    "properties": {"invoice_no": {"type": "string"}}
                },
                "confidence": {"type": "number", "minimum": 0, "maximum": 1}
            }
        });
        let result = StubBackend::new()
            .complete("ignored", &schema)
            .await
            .unwrap()
            .normalize();
        let errors = agentgate_schema::validate(&Value::Object(result.parsed), &schema);
        assert!(errors.is_empty(), "stub output must satisfy its schema: {errors:?}");
    }

    #[test]
    fn required_fields_missing_from_properties_become_null() {
        let value = generate_from_schema(&json!({
            "type": "object",
            "required": ["mystery"],
            "properties": {}
        }));
        assert_eq!(value, json!({"mystery": null}));
    }

    #[test]
    fn untyped_schema_with_properties_is_treated_as_object() {
        let value = generate_from_schema(&json!({
            "properties": {"label": {"type": "string"}}
        }));
        assert_eq!(value, json!({"label": "stub"}));
    }

    #[test]
    fn generation_is_deterministic() {
        let schema = json!({
            "type": "object",
            "properties": {"a": {"type": "integer"}, "b": {"type": "boolean"}}
        });
        assert_eq!(generate_from_schema(&schema), generate_from_schema(&schema));
    }
}
