//! Agent spec normalization and validation.
//!
//! Every definition entering the registry — registered over HTTP or seeded
//! from a preset file — passes through [`normalize_spec`]. Schema documents
//! are checked for Draft-07 well-formedness here, making a malformed schema
//! a load/registration-time error rather than a per-request one.

use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

use agentgate_core::agent::{AgentDefinition, Credits, MemoryMode, MemoryPolicy};

use crate::RegistryError;

static ID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new("^[a-z0-9][a-z0-9_-]{1,62}$").expect("agent id regex is valid")
});

const MAX_SPEC_BYTES: usize = 300_000;
const MAX_PROMPT_CHARS: usize = 20_000;
const MAX_SCHEMA_BYTES: usize = 200_000;
const MAX_SCHEMA_DEPTH: usize = 50;
const MAX_VERSION_CHARS: usize = 32;

/// Validate and normalize a raw spec value into an [`AgentDefinition`].
pub fn normalize_spec(raw: &Value) -> Result<AgentDefinition, RegistryError> {
    let obj = raw
        .as_object()
        .ok_or_else(|| RegistryError::spec_invalid("Spec must be an object"))?;

    if json_size_bytes(raw) > MAX_SPEC_BYTES {
        return Err(RegistryError::spec_invalid("Spec is too large"));
    }

    let id = required_string(obj, "id")?;
    let version = required_string(obj, "version")?;
    let name = required_string(obj, "name")?;
    let description = required_string(obj, "description")?;
    let primitive = required_string(obj, "primitive")?;
    let prompt = required_string(obj, "prompt")?;

    if !ID_RE.is_match(&id) {
        return Err(RegistryError::spec_invalid(
            "Agent id must match ^[a-z0-9][a-z0-9_-]{1,62}$",
        ));
    }
    if version.chars().count() > MAX_VERSION_CHARS {
        return Err(RegistryError::spec_invalid("Version too long (max 32 chars)"));
    }
    if prompt.chars().count() > MAX_PROMPT_CHARS {
        return Err(RegistryError::spec_invalid("Prompt too long"));
    }

    let input_schema = validate_schema(obj.get("input_schema"), "input_schema")?;
    let output_schema = validate_schema(obj.get("output_schema"), "output_schema")?;
    if json_size_bytes(&input_schema) + json_size_bytes(&output_schema) > MAX_SCHEMA_BYTES {
        return Err(RegistryError::spec_invalid("Combined schema size too large"));
    }

    let supports_memory = obj
        .get("supports_memory")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    let memory_policy = match obj.get("memory_policy") {
        None | Some(Value::Null) => None,
        Some(value) => Some(coerce_memory_policy(value)?),
    };

    let tags = match obj.get("tags") {
        None | Some(Value::Null) => None,
        Some(Value::Array(items)) => Some(
            items
                .iter()
                .map(|t| match t {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect(),
        ),
        Some(_) => {
            return Err(RegistryError::spec_invalid(
                "tags must be a list of strings when provided",
            ));
        }
    };

    let credits = match obj.get("credits") {
        None | Some(Value::Null) => None,
        Some(value) => Some(coerce_credits(value)?),
    };

    Ok(AgentDefinition {
        id,
        version,
        name,
        description,
        primitive,
        input_schema,
        output_schema,
        prompt,
        supports_memory,
        memory_policy,
        tags,
        credits,
    })
}

/// Parse a preset file (TOML) into a validated [`AgentDefinition`].
pub fn parse_preset_toml(content: &str) -> Result<AgentDefinition, RegistryError> {
    let value: Value = toml::from_str(content).map_err(|e| RegistryError::SpecInvalid {
        message: "Preset must be valid TOML".into(),
        details: Some(Value::String(e.to_string())),
    })?;
    normalize_spec(&value)
}

fn required_string(
    obj: &serde_json::Map<String, Value>,
    field: &str,
) -> Result<String, RegistryError> {
    match obj.get(field) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) => Ok(other.to_string()),
        None => Err(RegistryError::spec_invalid(format!(
            "Spec missing required field: {field}"
        ))),
    }
}

fn validate_schema(schema: Option<&Value>, field_name: &str) -> Result<Value, RegistryError> {
    let schema = schema
        .filter(|s| s.is_object())
        .ok_or_else(|| RegistryError::spec_invalid(format!("{field_name} must be a JSON object")))?;

    if schema.get("type").and_then(Value::as_str) != Some("object") {
        return Err(RegistryError::spec_invalid(format!(
            "{field_name} root type must be 'object'"
        )));
    }
    if agentgate_schema::value_depth(schema) > MAX_SCHEMA_DEPTH {
        return Err(RegistryError::spec_invalid(format!("{field_name} is too deep")));
    }
    agentgate_schema::check_schema(schema).map_err(|e| RegistryError::SpecInvalid {
        message: format!("{field_name} is not a valid Draft7 JSON schema"),
        details: Some(serde_json::json!({"message": e.to_string()})),
    })?;

    Ok(schema.clone())
}

fn coerce_memory_policy(value: &Value) -> Result<MemoryPolicy, RegistryError> {
    let obj = value.as_object().ok_or_else(|| {
        RegistryError::spec_invalid("memory_policy must be an object when provided")
    })?;

    let mode = match obj.get("mode").and_then(Value::as_str) {
        None | Some("last_n") => MemoryMode::LastN,
        Some(other) => {
            return Err(RegistryError::spec_invalid(format!(
                "memory_policy.mode '{other}' is not supported"
            )));
        }
    };
    let max_messages = bounded_u32(obj.get("max_messages"), 10, "memory_policy.max_messages")?;
    let max_chars = bounded_u32(obj.get("max_chars"), 8000, "memory_policy.max_chars")?;

    Ok(MemoryPolicy {
        mode,
        max_messages,
        max_chars,
    })
}

fn bounded_u32(value: Option<&Value>, default: u32, field: &str) -> Result<u32, RegistryError> {
    match value {
        None | Some(Value::Null) => Ok(default),
        Some(value) => value
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| {
                RegistryError::spec_invalid(format!("{field} must be a non-negative integer"))
            }),
    }
}

fn coerce_credits(value: &Value) -> Result<Credits, RegistryError> {
    let obj = value
        .as_object()
        .ok_or_else(|| RegistryError::spec_invalid("credits must be an object with name/url"))?;

    let name = obj
        .get("name")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            RegistryError::spec_invalid("credits.name is required when credits is provided")
        })?;

    let url = obj
        .get("url")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from);

    Ok(Credits {
        name: name.to_string(),
        url,
    })
}

fn json_size_bytes(value: &Value) -> usize {
    serde_json::to_vec(value).map(|v| v.len()).unwrap_or(0)
}
