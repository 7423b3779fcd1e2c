//! Tool implementations
//!
//! One module per tool, each exposing `schema()` for the static tool table
//! and `execute()` taking the parsed JSON arguments. Argument structs use
//! `deny_unknown_fields`, so schema violations surface as INVALID_ARGUMENTS
//! before any domain code runs.

pub mod delete;
pub mod list;
pub mod migration;
pub mod retrieve;
pub mod stats;
pub mod store;
pub mod update;

use engram_core::EngineError;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Parse tool arguments against their serde schema.
pub(crate) fn parse_args<T: DeserializeOwned>(args: Option<Value>) -> Result<T, EngineError> {
    let value = args.unwrap_or(Value::Object(serde_json::Map::new()));
    serde_json::from_value(value).map_err(|e| EngineError::InvalidArguments(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Deserialize)]
    #[serde(deny_unknown_fields)]
    struct Args {
        name: String,
    }

    #[test]
    fn test_parse_args_unknown_field_rejected() {
        let err = parse_args::<Args>(Some(serde_json::json!({"name": "x", "y": 1})));
        assert!(matches!(err, Err(EngineError::InvalidArguments(_))));
    }

    #[test]
    fn test_parse_args_missing_defaults_to_empty_object() {
        let err = parse_args::<Args>(None);
        // "name" is required, so an empty object still fails cleanly
        assert!(matches!(err, Err(EngineError::InvalidArguments(_))));
    }
}
