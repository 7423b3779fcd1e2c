//! Typed memory content and sanitization
//!
//! `content` is a tagged union discriminated by the record's `type` field.
//! Each variant is a sealed struct with `deny_unknown_fields`, so unknown
//! fields and unknown enum values are rejected at the edge rather than
//! silently stored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::record::MemoryType;

/// Maximum size of any single textual field, in bytes.
pub const MAX_TEXT_BYTES: usize = 64 * 1024;

// ============================================================================
// ERROR TYPE
// ============================================================================

/// Content validation failure; surfaces as `INVALID_CONTENT`.
#[non_exhaustive]
#[derive(Debug, Clone, thiserror::Error)]
pub enum ContentError {
    /// Shape did not match the declared type
    #[error("content does not match type '{0}': {1}")]
    Shape(MemoryType, String),
    /// A textual field exceeded the size cap
    #[error("field '{0}' exceeds {MAX_TEXT_BYTES} bytes")]
    TooLong(&'static str),
    /// A textual field contained framing characters
    #[error("field '{0}' contains framing characters")]
    Framing(&'static str),
    /// A field failed a range or emptiness check
    #[error("{0}")]
    Invalid(String),
}

// ============================================================================
// CONTENT VARIANTS
// ============================================================================

/// `fact` content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FactContent {
    /// The statement
    pub statement: String,
    /// Optional confidence in [0, 1]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

/// `entity` content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EntityContent {
    /// Entity name
    pub name: String,
    /// Attribute map (ordered for stable projection)
    pub attributes: BTreeMap<String, serde_json::Value>,
}

/// Participant role in a conversation excerpt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationRole {
    User,
    Assistant,
    System,
}

impl ConversationRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationRole::User => "user",
            ConversationRole::Assistant => "assistant",
            ConversationRole::System => "system",
        }
    }
}

/// A single utterance in a conversation excerpt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ConversationMessage {
    /// Who spoke
    pub role: ConversationRole,
    /// What was said
    pub text: String,
    /// Optional utterance timestamp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ts: Option<DateTime<Utc>>,
}

/// `conversation` content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ConversationContent {
    /// Utterances in order
    pub messages: Vec<ConversationMessage>,
}

/// `reflection` content
///
/// `refs` are weak back-references: the reflection does not own its
/// referents, and ids of deleted memories are filtered out on read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ReflectionContent {
    /// The reflection body
    pub body: String,
    /// Ids of the memories this reflection summarizes
    #[serde(default)]
    pub refs: Vec<String>,
}

/// `code` content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CodeContent {
    /// Language tag (e.g. "rust")
    pub language: String,
    /// The code block
    pub code: String,
    /// Optional human description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Typed memory content, discriminated by the sibling `type` field.
///
/// Untagged serde works here because every variant has a disjoint set of
/// required fields; `from_value` is the strict path used at the tool edge
/// where the declared type is known.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MemoryContent {
    Fact(FactContent),
    Entity(EntityContent),
    Conversation(ConversationContent),
    Reflection(ReflectionContent),
    Code(CodeContent),
}

impl MemoryContent {
    /// Parse and validate a raw JSON value against the declared type.
    pub fn from_value(
        memory_type: MemoryType,
        value: serde_json::Value,
    ) -> Result<Self, ContentError> {
        let shape_err = |e: serde_json::Error| ContentError::Shape(memory_type, e.to_string());
        let content = match memory_type {
            MemoryType::Fact => MemoryContent::Fact(serde_json::from_value(value).map_err(shape_err)?),
            MemoryType::Entity => {
                MemoryContent::Entity(serde_json::from_value(value).map_err(shape_err)?)
            }
            MemoryType::Conversation => {
                MemoryContent::Conversation(serde_json::from_value(value).map_err(shape_err)?)
            }
            MemoryType::Reflection => {
                MemoryContent::Reflection(serde_json::from_value(value).map_err(shape_err)?)
            }
            MemoryType::Code => MemoryContent::Code(serde_json::from_value(value).map_err(shape_err)?),
        };
        let content = content.sanitized()?;
        content.validate()?;
        Ok(content)
    }

    /// The type this content belongs to.
    pub fn kind(&self) -> MemoryType {
        match self {
            MemoryContent::Fact(_) => MemoryType::Fact,
            MemoryContent::Entity(_) => MemoryType::Entity,
            MemoryContent::Conversation(_) => MemoryType::Conversation,
            MemoryContent::Reflection(_) => MemoryType::Reflection,
            MemoryContent::Code(_) => MemoryType::Code,
        }
    }

    /// Serialize back to a raw JSON value (storage form).
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    /// Return a copy with every textual field sanitized.
    fn sanitized(mut self) -> Result<Self, ContentError> {
        match &mut self {
            MemoryContent::Fact(f) => {
                f.statement = sanitize_text(&f.statement, "statement")?;
            }
            MemoryContent::Entity(e) => {
                e.name = sanitize_text(&e.name, "name")?;
            }
            MemoryContent::Conversation(c) => {
                for msg in &mut c.messages {
                    msg.text = sanitize_text(&msg.text, "text")?;
                }
            }
            MemoryContent::Reflection(r) => {
                r.body = sanitize_text(&r.body, "body")?;
            }
            MemoryContent::Code(c) => {
                c.language = sanitize_text(&c.language, "language")?;
                c.code = sanitize_text(&c.code, "code")?;
                if let Some(desc) = &c.description {
                    c.description = Some(sanitize_text(desc, "description")?);
                }
            }
        }
        Ok(self)
    }

    /// Per-variant semantic checks.
    fn validate(&self) -> Result<(), ContentError> {
        match self {
            MemoryContent::Fact(f) => {
                if f.statement.trim().is_empty() {
                    return Err(ContentError::Invalid("statement cannot be empty".into()));
                }
                if let Some(c) = f.confidence
                    && !(0.0..=1.0).contains(&c)
                {
                    return Err(ContentError::Invalid(format!(
                        "confidence {c} outside [0, 1]"
                    )));
                }
            }
            MemoryContent::Entity(e) => {
                if e.name.trim().is_empty() {
                    return Err(ContentError::Invalid("entity name cannot be empty".into()));
                }
            }
            MemoryContent::Conversation(c) => {
                if c.messages.is_empty() {
                    return Err(ContentError::Invalid(
                        "conversation needs at least one message".into(),
                    ));
                }
            }
            MemoryContent::Reflection(r) => {
                if r.body.trim().is_empty() {
                    return Err(ContentError::Invalid("reflection body cannot be empty".into()));
                }
            }
            MemoryContent::Code(c) => {
                if c.language.trim().is_empty() {
                    return Err(ContentError::Invalid("language cannot be empty".into()));
                }
                if c.code.is_empty() {
                    return Err(ContentError::Invalid("code cannot be empty".into()));
                }
            }
        }
        Ok(())
    }

    /// Drop tombstone refs from a reflection (ids the predicate rejects).
    pub fn filter_refs<F: Fn(&str) -> bool>(&mut self, exists: F) {
        if let MemoryContent::Reflection(r) = self {
            r.refs.retain(|id| exists(id));
        }
    }
}

// ============================================================================
// SANITIZATION
// ============================================================================

/// Sanitize a textual field: cap the length, strip control characters except
/// tab and newline, and reject line/paragraph separators that would corrupt
/// the line-oriented JSON-RPC stream if they survived into output framing.
pub fn sanitize_text(text: &str, field: &'static str) -> Result<String, ContentError> {
    if text.len() > MAX_TEXT_BYTES {
        return Err(ContentError::TooLong(field));
    }
    if text.contains('\u{2028}') || text.contains('\u{2029}') {
        return Err(ContentError::Framing(field));
    }
    Ok(text
        .chars()
        .filter(|c| !c.is_control() || *c == '\t' || *c == '\n')
        .collect())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_fact_from_value() {
        let content =
            MemoryContent::from_value(MemoryType::Fact, json!({"statement": "water is wet"}))
                .unwrap();
        assert_eq!(content.kind(), MemoryType::Fact);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = MemoryContent::from_value(
            MemoryType::Fact,
            json!({"statement": "x", "speaker": "me"}),
        );
        assert!(err.is_err());
    }

    #[test]
    fn test_type_shape_mismatch() {
        let err = MemoryContent::from_value(MemoryType::Entity, json!({"statement": "x"}));
        assert!(matches!(err, Err(ContentError::Shape(MemoryType::Entity, _))));
    }

    #[test]
    fn test_confidence_range() {
        let err =
            MemoryContent::from_value(MemoryType::Fact, json!({"statement": "x", "confidence": 1.5}));
        assert!(err.is_err());
    }

    #[test]
    fn test_conversation_roles() {
        let content = MemoryContent::from_value(
            MemoryType::Conversation,
            json!({"messages": [
                {"role": "user", "text": "hi"},
                {"role": "assistant", "text": "hello"},
            ]}),
        )
        .unwrap();
        assert_eq!(content.kind(), MemoryType::Conversation);

        let err = MemoryContent::from_value(
            MemoryType::Conversation,
            json!({"messages": [{"role": "narrator", "text": "hi"}]}),
        );
        assert!(err.is_err());
    }

    #[test]
    fn test_empty_conversation_rejected() {
        let err = MemoryContent::from_value(MemoryType::Conversation, json!({"messages": []}));
        assert!(err.is_err());
    }

    #[test]
    fn test_sanitize_strips_control_chars() {
        let cleaned = sanitize_text("a\u{0000}b\tc\nd\u{0007}", "statement").unwrap();
        assert_eq!(cleaned, "ab\tc\nd");
    }

    #[test]
    fn test_sanitize_rejects_line_separator() {
        assert!(sanitize_text("a\u{2028}b", "statement").is_err());
    }

    #[test]
    fn test_sanitize_rejects_oversized() {
        let big = "x".repeat(MAX_TEXT_BYTES + 1);
        assert!(sanitize_text(&big, "statement").is_err());
    }

    #[test]
    fn test_reflection_ref_tombstones_filtered() {
        let mut content = MemoryContent::from_value(
            MemoryType::Reflection,
            json!({"body": "summary", "refs": ["a", "b", "c"]}),
        )
        .unwrap();
        content.filter_refs(|id| id != "b");
        match content {
            MemoryContent::Reflection(r) => assert_eq!(r.refs, vec!["a", "c"]),
            _ => panic!("expected reflection"),
        }
    }
}
