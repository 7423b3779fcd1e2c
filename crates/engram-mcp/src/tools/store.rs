//! `store_memory` - store a typed memory record

use engram_core::{MemoryEngine, Result, StoreInput};
use serde_json::Value;
use std::sync::Arc;

/// Input schema for `store_memory`
pub fn schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "type": {
                "type": "string",
                "description": "Memory type; determines the content shape",
                "enum": ["fact", "entity", "conversation", "reflection", "code"]
            },
            "content": {
                "type": "object",
                "description": "Typed content. fact: {statement, confidence?}; entity: {name, attributes}; conversation: {messages: [{role, text, ts?}]}; reflection: {body, refs?}; code: {language, code, description?}"
            },
            "importance": {
                "type": "number",
                "description": "Initial importance (default: 0.5)",
                "minimum": 0.0,
                "maximum": 1.0
            },
            "tags": {
                "type": "array",
                "items": {"type": "string"},
                "description": "Tag set"
            },
            "source": {
                "type": "string",
                "description": "Free-form provenance"
            }
        },
        "required": ["type", "content"],
        "additionalProperties": false
    })
}

/// Execute `store_memory`. Near-duplicate facts/entities merge into the
/// existing record and report `merged: true`.
pub async fn execute(engine: &Arc<MemoryEngine>, args: Option<Value>) -> Result<Value> {
    let input: StoreInput = super::parse_args(args)?;
    let outcome = engine.store_memory(input).await?;
    Ok(serde_json::json!({
        "id": outcome.id,
        "merged": outcome.merged,
    }))
}

// ============================================================================
// TESTS
// ============================================================================
