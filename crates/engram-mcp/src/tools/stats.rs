//! `memory_stats` - counts by type/tier and index sizes

use engram_core::{MemoryEngine, Result};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

/// Input schema for `memory_stats`
pub fn schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {},
        "additionalProperties": false
    })
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct StatsArgs {}

/// Execute `memory_stats`.
pub async fn execute(engine: &Arc<MemoryEngine>, args: Option<Value>) -> Result<Value> {
    let _args: StatsArgs = super::parse_args(args)?;
    let stats = engine.stats().await?;
    Ok(serde_json::json!({
        "total": stats.total,
        "by_type": stats.by_type,
        "by_tier": stats.by_tier,
        "index": {
            "vectors": stats.index.vectors,
            "lexical_entries": stats.index.lexical_entries,
        },
    }))
}

// ============================================================================
// TESTS
// ============================================================================
