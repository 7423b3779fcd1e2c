//! Server core
//!
//! Routes JSON-RPC requests to the handshake, the static tool table, and the
//! tool handlers. The tool list is served from a static schema table, so it
//! is available the moment the transport handshake completes - well before
//! the engine finishes warming. Calls that arrive while the engine is still
//! warming get a structured INITIALIZING error; they are never queued.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use engram_core::{EngineError, MemoryEngine};

use crate::protocol::messages::{
    CallToolRequest, CallToolResult, InitializeRequest, InitializeResult, ListToolsResult,
    ServerCapabilities, ServerInfo, ToolDescription,
};
use crate::protocol::types::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, PROTOCOL_VERSION};
use crate::tools;

/// Server implementation over the engine façade.
pub struct McpServer {
    engine: Arc<MemoryEngine>,
    initialized: AtomicBool,
}

impl McpServer {
    pub fn new(engine: Arc<MemoryEngine>) -> Self {
        Self {
            engine,
            initialized: AtomicBool::new(false),
        }
    }

    /// Handle one JSON-RPC request; `None` means notification (no reply).
    pub async fn handle_request(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        debug!("handling request: {}", request.method);

        if !self.initialized.load(Ordering::Acquire)
            && request.method != "initialize"
            && request.method != "notifications/initialized"
        {
            warn!("rejecting '{}': server not initialized", request.method);
            return Some(JsonRpcResponse::error(
                request.id,
                JsonRpcError::invalid_request("server not initialized"),
            ));
        }

        let result = match request.method.as_str() {
            "initialize" => self.handle_initialize(request.params),
            "notifications/initialized" => return None,
            "tools/list" => self.handle_tools_list(),
            "tools/call" => self.handle_tools_call(request.params).await,
            "ping" => Ok(serde_json::json!({})),
            method => Err(JsonRpcError::method_not_found(method)),
        };

        Some(match result {
            Ok(result) => JsonRpcResponse::success(request.id, result),
            Err(error) => JsonRpcResponse::error(request.id, error),
        })
    }

    fn handle_initialize(
        &self,
        params: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, JsonRpcError> {
        let request: InitializeRequest = match params {
            Some(p) => serde_json::from_value(p)
                .map_err(|e| JsonRpcError::invalid_params(&e.to_string()))?,
            None => InitializeRequest::default(),
        };

        // Use the client's version when it is older than ours
        let negotiated = if request.protocol_version.as_str() < PROTOCOL_VERSION {
            request.protocol_version.clone()
        } else {
            PROTOCOL_VERSION.to_string()
        };

        self.initialized.store(true, Ordering::Release);
        self.engine.mark_transport_ready();
        info!("session initialized with protocol version {}", negotiated);

        let result = InitializeResult {
            protocol_version: negotiated,
            server_info: ServerInfo {
                name: "engram".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            capabilities: ServerCapabilities {
                tools: Some({
                    let mut map = HashMap::new();
                    map.insert("listChanged".to_string(), serde_json::json!(false));
                    map
                }),
            },
            instructions: Some(
                "Engram is a persistent memory service. Store facts, entities, conversation \
                 excerpts, reflections, and code snippets with store_memory; recall them with \
                 retrieve_memory (hybrid semantic + keyword search). Memories decay in \
                 importance over time and move between short-term, long-term, and archived \
                 tiers; retrieval refreshes them."
                    .to_string(),
            ),
        };

        serde_json::to_value(result).map_err(|e| JsonRpcError::internal_error(&e.to_string()))
    }

    fn handle_tools_list(&self) -> Result<serde_json::Value, JsonRpcError> {
        let result = ListToolsResult { tools: tool_table() };
        serde_json::to_value(result).map_err(|e| JsonRpcError::internal_error(&e.to_string()))
    }

    async fn handle_tools_call(
        &self,
        params: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, JsonRpcError> {
        let request: CallToolRequest = match params {
            Some(p) => serde_json::from_value(p)
                .map_err(|e| JsonRpcError::invalid_params(&e.to_string()))?,
            None => return Err(JsonRpcError::invalid_params("missing params")),
        };

        let dispatch = self.dispatch(&request.name, request.arguments);
        let outcome = match tokio::time::timeout(self.engine.call_deadline(), dispatch).await {
            Ok(outcome) => outcome,
            Err(_) => Err(EngineError::Timeout),
        };

        match outcome {
            Ok(value) => serde_json::to_value(CallToolResult::json(&value))
                .map_err(|e| JsonRpcError::internal_error(&e.to_string())),
            Err(engine_error) => Err(JsonRpcError::from_engine(&engine_error)),
        }
    }

    async fn dispatch(
        &self,
        name: &str,
        args: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, EngineError> {
        match name {
            "store_memory" => tools::store::execute(&self.engine, args).await,
            "retrieve_memory" => tools::retrieve::execute(&self.engine, args).await,
            "list_memories" => tools::list::execute(&self.engine, args).await,
            "update_memory" => tools::update::execute(&self.engine, args).await,
            "delete_memory" => tools::delete::execute(&self.engine, args).await,
            "memory_stats" => tools::stats::execute(&self.engine, args).await,
            "migration_start" => tools::migration::start(&self.engine, args).await,
            "migration_status" => tools::migration::status(&self.engine, args).await,
            "migration_advance" => tools::migration::advance(&self.engine, args).await,
            "migration_pause" => tools::migration::pause(&self.engine, args).await,
            "migration_resume" => tools::migration::resume(&self.engine, args).await,
            "migration_rollback" => tools::migration::rollback(&self.engine, args).await,
            other => Err(EngineError::InvalidArguments(format!("unknown tool: {other}"))),
        }
    }
}

/// The static tool table. Served before warming completes so hosts can
/// enumerate tools while the engine is still warming.
pub fn tool_table() -> Vec<ToolDescription> {
    vec![
        ToolDescription {
            name: "store_memory".to_string(),
            description: Some(
                "Store a typed memory (fact, entity, conversation, reflection, code) with \
                 importance and provenance. Near-duplicate facts/entities merge into the \
                 existing record and return merged=true."
                    .to_string(),
            ),
            input_schema: tools::store::schema(),
        },
        ToolDescription {
            name: "retrieve_memory".to_string(),
            description: Some(
                "Hybrid retrieval: semantic vector search + keyword BM25, fused with \
                 reciprocal rank fusion and re-weighted by recency and importance. Returned \
                 memories are touched (access count, importance reinforcement)."
                    .to_string(),
            ),
            input_schema: tools::retrieve::schema(),
        },
        ToolDescription {
            name: "list_memories".to_string(),
            description: Some("List memories by type and tier with pagination.".to_string()),
            input_schema: tools::list::schema(),
        },
        ToolDescription {
            name: "update_memory".to_string(),
            description: Some(
                "Partially update a memory: content (re-embedded), importance, tags, source."
                    .to_string(),
            ),
            input_schema: tools::update::schema(),
        },
        ToolDescription {
            name: "delete_memory".to_string(),
            description: Some("Delete a memory. Idempotent.".to_string()),
            input_schema: tools::delete::schema(),
        },
        ToolDescription {
            name: "memory_stats".to_string(),
            description: Some(
                "Counts by type and tier, plus vector and lexical index sizes.".to_string(),
            ),
            input_schema: tools::stats::schema(),
        },
        ToolDescription {
            name: "migration_start".to_string(),
            description: Some(
                "Begin a zero-downtime embedding model migration to a registered target model."
                    .to_string(),
            ),
            input_schema: tools::migration::start_schema(),
        },
        ToolDescription {
            name: "migration_status".to_string(),
            description: Some(
                "Current migration state, progress, and rolling quality signal.".to_string(),
            ),
            input_schema: tools::migration::empty_schema(),
        },
        ToolDescription {
            name: "migration_advance".to_string(),
            description: Some(
                "Advance the migration one state (PREPARATION -> SHADOW -> CANARY -> GRADUAL \
                 -> FULL -> CLEANUP -> COMPLETED). Quality gates guard the FULL transition."
                    .to_string(),
            ),
            input_schema: tools::migration::empty_schema(),
        },
        ToolDescription {
            name: "migration_pause".to_string(),
            description: Some("Pause the migration driver.".to_string()),
            input_schema: tools::migration::empty_schema(),
        },
        ToolDescription {
            name: "migration_resume".to_string(),
            description: Some("Resume a paused migration.".to_string()),
            input_schema: tools::migration::empty_schema(),
        },
        ToolDescription {
            name: "migration_rollback".to_string(),
            description: Some(
                "Roll the migration back: drop the secondary collection and restore primary \
                 reads."
                    .to_string(),
            ),
            input_schema: tools::migration::empty_schema(),
        },
    ]
}

// ============================================================================
// TESTS
// ============================================================================
