//! `list_memories` - filtered, paginated listing

use engram_core::{MemoryEngine, MemoryFilter, MemoryTier, MemoryType, Result};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

/// Input schema for `list_memories`
pub fn schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "types": {
                "type": "array",
                "items": {
                    "type": "string",
                    "enum": ["fact", "entity", "conversation", "reflection", "code"]
                },
                "description": "Restrict to these memory types"
            },
            "tier": {
                "type": "string",
                "enum": ["short_term", "long_term", "archived"],
                "description": "Restrict to one tier"
            },
            "limit": {
                "type": "integer",
                "description": "Page size (default: 20)",
                "default": 20,
                "minimum": 1,
                "maximum": 100
            },
            "offset": {
                "type": "integer",
                "description": "Page offset (default: 0)",
                "default": 0,
                "minimum": 0
            }
        },
        "additionalProperties": false
    })
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ListArgs {
    types: Option<Vec<MemoryType>>,
    tier: Option<MemoryTier>,
    limit: Option<usize>,
    offset: Option<usize>,
}

/// Execute `list_memories`.
pub async fn execute(engine: &Arc<MemoryEngine>, args: Option<Value>) -> Result<Value> {
    let args: ListArgs = super::parse_args(args)?;
    let filter = MemoryFilter {
        types: args.types.unwrap_or_default(),
        tiers: args.tier.map(|t| vec![t]).unwrap_or_default(),
        ..Default::default()
    };
    let (items, total) = engine
        .list_memories(filter, args.limit.unwrap_or(20), args.offset.unwrap_or(0))
        .await?;
    Ok(serde_json::json!({
        "items": items,
        "total": total,
    }))
}

// ============================================================================
// TESTS
// ============================================================================
