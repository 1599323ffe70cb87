//! Contract-driven post-processing, keyed on the agent's primitive tag.
//!
//! Runs only after output validation succeeds. It fills contract gaps the
//! schema cannot express; it never removes or alters keys the backend
//! provided.

use serde_json::{Map, Value};

use agentgate_core::agent::AgentDefinition;

/// Apply per-primitive normalization to a validated output.
///
/// Extraction primitive: the input declares a `schema` mapping of field
/// names to expected data; every declared field must be present in
/// `output.data`, so missing ones are filled with an empty string. The
/// output schema itself does not enforce this — the runtime contract does.
pub fn apply(agent: &AgentDefinition, input: &Value, output: &mut Map<String, Value>) {
    if agent.primitive != "extract" {
        return;
    }

    let Some(declared) = input.get("schema").and_then(Value::as_object) else {
        return;
    };

    let data = output
        .entry("data")
        .or_insert_with(|| Value::Object(Map::new()));
    let Some(data) = data.as_object_mut() else {
        // A non-object `data` survived validation; leave it untouched.
        return;
    };

    for field_name in declared.keys() {
        data.entry(field_name.as_str())
            .or_insert_with(|| Value::String(String::new()));
    }
}
