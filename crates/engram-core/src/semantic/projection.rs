//! Textual projection
//!
//! Every memory type projects to one canonical string, used both for
//! embedding and for the lexical index. The projection is deterministic so
//! dedup probes and re-embedding during migration see identical text.

use crate::memory::MemoryContent;

/// Derive the canonical text for a content value.
pub fn project(content: &MemoryContent) -> String {
    match content {
        MemoryContent::Fact(f) => f.statement.clone(),
        MemoryContent::Entity(e) => {
            let mut parts = vec![e.name.clone()];
            for value in e.attributes.values() {
                parts.push(attribute_text(value));
            }
            parts.retain(|p| !p.is_empty());
            parts.join(" ")
        }
        MemoryContent::Conversation(c) => c
            .messages
            .iter()
            .map(|m| format!("{}: {}", m.role.as_str(), m.text))
            .collect::<Vec<_>>()
            .join("\n"),
        MemoryContent::Reflection(r) => r.body.clone(),
        MemoryContent::Code(c) => format!("[{}] {}", c.language, c.code),
    }
}

/// Flatten an attribute value into searchable text.
fn attribute_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::Bool(b) => b.to_string(),
        serde_json::Value::Array(items) => items
            .iter()
            .map(attribute_text)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" "),
        serde_json::Value::Object(map) => map
            .values()
            .map(attribute_text)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" "),
        serde_json::Value::Null => String::new(),
    }
}

// ============================================================================
// TESTS
// ============================================================================
