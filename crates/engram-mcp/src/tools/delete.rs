//! `delete_memory` - remove a record and its index entries

use engram_core::{MemoryEngine, Result};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

/// Input schema for `delete_memory`
pub fn schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "id": {
                "type": "string",
                "description": "Memory id"
            }
        },
        "required": ["id"],
        "additionalProperties": false
    })
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DeleteArgs {
    id: String,
}

/// Execute `delete_memory`. Idempotent: a second delete reports
/// `deleted: false`.
pub async fn execute(engine: &Arc<MemoryEngine>, args: Option<Value>) -> Result<Value> {
    let args: DeleteArgs = super::parse_args(args)?;
    let deleted = engine.delete_memory(&args.id).await?;
    Ok(serde_json::json!({ "deleted": deleted }))
}

// ============================================================================
// TESTS
// ============================================================================
