//! `retrieve_memory` - hybrid semantic + lexical retrieval

use engram_core::{MemoryEngine, MemoryFilter, MemoryType, Result};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

/// Input schema for `retrieve_memory`
pub fn schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "query": {
                "type": "string",
                "description": "Search query"
            },
            "limit": {
                "type": "integer",
                "description": "Maximum results (default: 5)",
                "default": 5,
                "minimum": 1,
                "maximum": 100
            },
            "types": {
                "type": "array",
                "items": {
                    "type": "string",
                    "enum": ["fact", "entity", "conversation", "reflection", "code"]
                },
                "description": "Restrict to these memory types"
            },
            "min_similarity": {
                "type": "number",
                "description": "Minimum fused score before re-weighting (default: 0.3)",
                "default": 0.3,
                "minimum": 0.0,
                "maximum": 1.0
            }
        },
        "required": ["query"],
        "additionalProperties": false
    })
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RetrieveArgs {
    query: String,
    limit: Option<usize>,
    types: Option<Vec<MemoryType>>,
    #[serde(alias = "minSimilarity")]
    min_similarity: Option<f64>,
}

/// Execute `retrieve_memory`. Returned ids receive access side-effects.
pub async fn execute(engine: &Arc<MemoryEngine>, args: Option<Value>) -> Result<Value> {
    let args: RetrieveArgs = super::parse_args(args)?;
    let limit = args.limit.unwrap_or(engine.config().retrieval.top_k);
    let filter = MemoryFilter {
        types: args.types.unwrap_or_default(),
        ..Default::default()
    };

    let results = engine
        .retrieve(&args.query, limit, filter, args.min_similarity)
        .await?;

    let results: Vec<Value> = results
        .iter()
        .map(|r| {
            serde_json::json!({
                "id": r.memory.id,
                "memory": r.memory,
                "score": r.score,
            })
        })
        .collect();

    Ok(serde_json::json!({ "results": results }))
}

// ============================================================================
// TESTS
// ============================================================================
