//! `update_memory` - partial update of a record

use engram_core::{MemoryEngine, Result, UpdatePatch};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

/// Input schema for `update_memory`
pub fn schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "id": {
                "type": "string",
                "description": "Memory id"
            },
            "patch": {
                "type": "object",
                "description": "Fields to replace: content (same type as the record), importance, tags, source",
                "properties": {
                    "content": {"type": "object"},
                    "importance": {"type": "number", "minimum": 0.0, "maximum": 1.0},
                    "tags": {"type": "array", "items": {"type": "string"}},
                    "source": {"type": "string"}
                },
                "additionalProperties": false
            }
        },
        "required": ["id", "patch"],
        "additionalProperties": false
    })
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct UpdateArgs {
    id: String,
    patch: UpdatePatch,
}

/// Execute `update_memory`.
pub async fn execute(engine: &Arc<MemoryEngine>, args: Option<Value>) -> Result<Value> {
    let args: UpdateArgs = super::parse_args(args)?;
    let updated = engine.update_memory(&args.id, args.patch).await?;
    Ok(serde_json::json!({ "id": updated.id }))
}

// ============================================================================
// TESTS
// ============================================================================
