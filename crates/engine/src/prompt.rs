//! Deterministic prompt assembly.
//!
//! Section order is an invariant: agent prompt body, primitive line, memory
//! segment (if any), knowledge segment (if any), canonically-formatted input
//! payload, closing single-JSON-object instruction. serde_json's BTreeMap
//! backing gives stable key ordering, so the same inputs always produce a
//! byte-identical prompt — required for testability and for backend-side
//! prompt caching.

use serde_json::Value;

use agentgate_core::agent::AgentDefinition;
use agentgate_core::event::{KnowledgeItem, MemoryEvent};

/// An assembled prompt plus the output schema the backend must target.
#[derive(Debug, Clone)]
pub struct PromptSpec {
    pub text: String,
    pub output_schema: Value,
}

/// Assemble the invocation prompt for `agent`.
pub fn assemble(
    agent: &AgentDefinition,
    input: &Value,
    memory: &[MemoryEvent],
    knowledge: Option<&[KnowledgeItem]>,
) -> PromptSpec {
    let pretty_input = canonical_json(input);

    let mut parts: Vec<String> = vec![
        agent.prompt.trim().to_string(),
        String::new(),
        format!("# Primitive: {}", agent.primitive),
    ];

    if !memory.is_empty() {
        parts.push(memory_segment(memory));
    }
    if let Some(knowledge) = knowledge {
        if !knowledge.is_empty() {
            let serialized = serde_json::to_value(knowledge)
                .map(|v| canonical_json(&v))
                .unwrap_or_else(|_| "[]".into());
            parts.push(format!("# Knowledge:\n{serialized}\n\n"));
        }
    }
    parts.push(format!("# Input JSON:\n{pretty_input}\n\n"));
    parts.push(
        "Respond ONLY with a single JSON object that matches the provided output_schema.".into(),
    );

    PromptSpec {
        text: parts.join("\n"),
        output_schema: agent.output_schema.clone(),
    }
}

/// Format retained memory events as a labeled prompt segment,
/// one `role: content` line per event in chronological order.
fn memory_segment(events: &[MemoryEvent]) -> String {
    let mut lines = vec!["# Memory (recent context):".to_string()];
    for event in events {
        lines.push(format!("{}: {}", event.role, event.content.trim()));
    }
    let mut segment = lines.join("\n");
    segment.push_str("\n\n");
    segment
}

/// Pretty-print with stable key ordering.
pub fn canonical_json(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "null".into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentgate_core::event::Role;
    use serde_json::json;

    fn agent() -> AgentDefinition {
        AgentDefinition {
            id: "summarizer".into(),
            version: "0.1.0".into(),
            name: "Summarizer".into(),
            description: String::new(),
            primitive: "transform".into(),
            input_schema: json!({"type": "object"}),
            output_schema: json!({
                "type": "object",
                "required": ["summary"],
                "properties": {"summary": {"type": "string"}}
            }),
            prompt: "  Summarize the input text.  ".into(),
            supports_memory: true,
            memory_policy: None,
            tags: None,
            credits: None,
        }
    }

    #[test]
    fn sections_appear_in_contract_order() {
        let memory = vec![
            MemoryEvent::new(Role::User, "earlier question"),
            MemoryEvent::new(Role::Assistant, "earlier answer"),
        ];
        let knowledge = vec![KnowledgeItem {
            id: Some("k1".into()),
            content: "a relevant fact".into(),
            meta: None,
        }];
        let spec = assemble(
            &agent(),
            &json!({"text": "hello"}),
            &memory,
            Some(&knowledge),
        );

        let prompt_pos = spec.text.find("Summarize the input text.").unwrap();
        let primitive_pos = spec.text.find("# Primitive: transform").unwrap();
        let memory_pos = spec.text.find("# Memory (recent context):").unwrap();
        let knowledge_pos = spec.text.find("# Knowledge:").unwrap();
        let input_pos = spec.text.find("# Input JSON:").unwrap();
        let instruction_pos = spec.text.find("Respond ONLY with a single JSON").unwrap();

        assert!(prompt_pos < primitive_pos);
        assert!(primitive_pos < memory_pos);
        assert!(memory_pos < knowledge_pos);
        assert!(knowledge_pos < input_pos);
        assert!(input_pos < instruction_pos);

        assert!(spec.text.contains("user: earlier question"));
        assert!(spec.text.contains("assistant: earlier answer"));
        assert!(spec.text.contains("a relevant fact"));
    }

    #[test]
    fn empty_memory_and_knowledge_sections_are_omitted() {
        let spec = assemble(&agent(), &json!({"text": "hello"}), &[], None);
        assert!(!spec.text.contains("# Memory"));
        assert!(!spec.text.contains("# Knowledge"));

        let spec = assemble(&agent(), &json!({"text": "hello"}), &[], Some(&[]));
        assert!(!spec.text.contains("# Knowledge"));
    }

    #[test]
    fn same_inputs_yield_byte_identical_prompts() {
        let input = json!({"zeta": 1, "alpha": {"nested": [1, 2]}, "mid": "x"});
        let a = assemble(&agent(), &input, &[], None);
        let b = assemble(&agent(), &input, &[], None);
        assert_eq!(a.text, b.text);
    }

    #[test]
    fn input_keys_are_rendered_in_stable_order() {
        let spec = assemble(&agent(), &json!({"b": 1, "a": 2}), &[], None);
        let a_pos = spec.text.find("\"a\"").unwrap();
        let b_pos = spec.text.find("\"b\"").unwrap();
        assert!(a_pos < b_pos);
    }

    #[test]
    fn output_schema_rides_along() {
        let spec = assemble(&agent(), &json!({}), &[], None);
        assert_eq!(spec.output_schema, agent().output_schema);
    }
}
