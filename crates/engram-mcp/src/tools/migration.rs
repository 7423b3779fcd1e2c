//! Migration tool family
//!
//! `migration_start`, `migration_status`, `migration_advance`,
//! `migration_pause`, `migration_resume`, `migration_rollback`. All return
//! the migration record snapshot; transitions outside the state graph come
//! back as INVALID_TRANSITION.

use engram_core::{MemoryEngine, MigrationRecord, Result};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

/// Input schema for `migration_start`
pub fn start_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "target_model": {
                "type": "string",
                "description": "Registered embedding model id to migrate to"
            }
        },
        "required": ["target_model"],
        "additionalProperties": false
    })
}

/// Input schema for the argument-less migration tools
pub fn empty_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {},
        "additionalProperties": false
    })
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct StartArgs {
    #[serde(alias = "targetModel")]
    target_model: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct EmptyArgs {}

fn snapshot(record: &MigrationRecord) -> Value {
    serde_json::to_value(record).unwrap_or(Value::Null)
}

/// `migration_start`
pub async fn start(engine: &Arc<MemoryEngine>, args: Option<Value>) -> Result<Value> {
    let args: StartArgs = super::parse_args(args)?;
    let record = engine.migration_start(&args.target_model).await?;
    Ok(snapshot(&record))
}

/// `migration_status`
pub async fn status(engine: &Arc<MemoryEngine>, args: Option<Value>) -> Result<Value> {
    let _args: EmptyArgs = super::parse_args(args)?;
    let record = engine.migration_status().await?;
    Ok(snapshot(&record))
}

/// `migration_advance`
pub async fn advance(engine: &Arc<MemoryEngine>, args: Option<Value>) -> Result<Value> {
    let _args: EmptyArgs = super::parse_args(args)?;
    let record = engine.migration_advance().await?;
    Ok(snapshot(&record))
}

/// `migration_pause`
pub async fn pause(engine: &Arc<MemoryEngine>, args: Option<Value>) -> Result<Value> {
    let _args: EmptyArgs = super::parse_args(args)?;
    let record = engine.migration_pause().await?;
    Ok(snapshot(&record))
}

/// `migration_resume`
pub async fn resume(engine: &Arc<MemoryEngine>, args: Option<Value>) -> Result<Value> {
    let _args: EmptyArgs = super::parse_args(args)?;
    let record = engine.migration_resume().await?;
    Ok(snapshot(&record))
}

/// `migration_rollback`
pub async fn rollback(engine: &Arc<MemoryEngine>, args: Option<Value>) -> Result<Value> {
    let _args: EmptyArgs = super::parse_args(args)?;
    let record = engine.migration_rollback().await?;
    Ok(snapshot(&record))
}

// ============================================================================
// TESTS
// ============================================================================
