//! Repair controller — output validation with one bounded repair attempt.
//!
//! Two states, Primary and Repair, both terminal on success. The backend is
//! called at most twice per invocation; this ceiling is deliberate, to avoid
//! unbounded backend cost under persistent malformation. Backend failures
//! are surfaced as backend faults and never conflated with validation
//! failures.

use serde_json::{Map, Value};

use agentgate_core::agent::AgentDefinition;
use agentgate_core::backend::CompletionBackend;
use agentgate_core::event::{KnowledgeItem, MemoryEvent};
use agentgate_schema::ValidationError;

use crate::fault::Fault;
use crate::postprocess;
use crate::prompt::{assemble, canonical_json};

/// A validated, post-processed output plus the raw text of the attempt that
/// produced it (used for best-effort memory persistence).
#[derive(Debug, Clone)]
pub struct GeneratedOutput {
    pub output: Map<String, Value>,
    pub raw_text: String,
}

/// Run the primary backend call and, if its output fails validation, exactly
/// one corrective re-prompt.
pub async fn resolve(
    agent: &AgentDefinition,
    backend: &dyn CompletionBackend,
    input: &Value,
    memory: &[MemoryEvent],
    knowledge: Option<&[KnowledgeItem]>,
) -> Result<GeneratedOutput, Fault> {
    let spec = assemble(agent, input, memory, knowledge);

    // Primary attempt.
    let result = backend
        .complete(&spec.text, &spec.output_schema)
        .await
        .map_err(backend_fault)?
        .normalize();

    let errors = validate_output(&result.parsed, &agent.output_schema);
    if errors.is_empty() {
        let mut output = result.parsed;
        postprocess::apply(agent, input, &mut output);
        return Ok(GeneratedOutput {
            output,
            raw_text: result.raw_text,
        });
    }

    // Repair attempt: concatenated violation messages, the previous raw
    // output, and the restated schema.
    let error_summary = errors
        .iter()
        .map(|e| e.message.as_str())
        .collect::<Vec<_>>()
        .join("; ");
    let repair_prompt = format!(
        "The previous JSON output did not validate against the required output_schema.\n\
         Validation errors: {error_summary}\n\n\
         Previous raw output:\n{previous}\n\n\
         Please respond again with ONLY a valid JSON object that matches the following output_schema:\n{schema}",
        previous = result.raw_text,
        schema = canonical_json(&agent.output_schema),
    );

    let repair_result = backend
        .complete(&repair_prompt, &spec.output_schema)
        .await
        .map_err(backend_fault)?
        .normalize();

    let repair_errors = validate_output(&repair_result.parsed, &agent.output_schema);
    if repair_errors.is_empty() {
        let mut output = repair_result.parsed;
        postprocess::apply(agent, input, &mut output);
        return Ok(GeneratedOutput {
            output,
            raw_text: repair_result.raw_text,
        });
    }

    // Still invalid after repair — terminal.
    Err(Fault::output_validation(
        "Backend output did not validate against output_schema after one repair attempt",
        serde_json::to_value(&repair_errors).unwrap_or(Value::Null),
    ))
}

fn validate_output(parsed: &Map<String, Value>, schema: &Value) -> Vec<ValidationError> {
    agentgate_schema::validate(&Value::Object(parsed.clone()), schema)
}

fn backend_fault(err: agentgate_core::error::BackendError) -> Fault {
    Fault::internal(
        "Backend failure",
        Some(serde_json::json!({"message": err.to_string()})),
    )
}
