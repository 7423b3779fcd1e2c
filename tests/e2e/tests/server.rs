//! JSON-RPC tool surface journeys
//!
//! Drives the server the way a host would: handshake, tool enumeration,
//! then the literal scenarios from the tool contract.

use std::sync::Arc;

use engram_core::MemoryEngine;
use engram_e2e_tests::{ready_engine, test_config, test_registry, SECONDARY_MODEL};
use engram_mcp::protocol::types::{JsonRpcRequest, JsonRpcResponse, JSONRPC_VERSION};
use engram_mcp::server::McpServer;
use serde_json::{json, Value};
use tempfile::TempDir;

fn request(method: &str, params: Option<Value>) -> JsonRpcRequest {
    JsonRpcRequest {
        jsonrpc: JSONRPC_VERSION.to_string(),
        id: Some(Value::Number(7.into())),
        method: method.to_string(),
        params,
    }
}

async fn handshake(server: &McpServer) {
    let response = server
        .handle_request(request("initialize", Some(json!({"protocolVersion": "2025-03-26"}))))
        .await
        .unwrap();
    assert!(response.error.is_none());
}

async fn call_tool(server: &McpServer, name: &str, arguments: Value) -> JsonRpcResponse {
    server
        .handle_request(request(
            "tools/call",
            Some(json!({"name": name, "arguments": arguments})),
        ))
        .await
        .unwrap()
}

fn tool_json(response: &JsonRpcResponse) -> Value {
    let text = response.result.as_ref().expect("tool result")["content"][0]["text"]
        .as_str()
        .expect("text block");
    serde_json::from_str(text).unwrap()
}

async fn ready_server() -> (McpServer, TempDir) {
    let (engine, dir) = ready_engine().await;
    let server = McpServer::new(engine);
    handshake(&server).await;
    (server, dir)
}

#[tokio::test]
async fn store_retrieve_scenario() {
    let (server, _dir) = ready_server().await;

    let response = call_tool(
        &server,
        "store_memory",
        json!({
            "type": "fact",
            "content": {"statement": "Paris is the capital of France"},
            "importance": 0.8
        }),
    )
    .await;
    let stored = tool_json(&response);
    let id = stored["id"].as_str().unwrap().to_string();
    assert_eq!(stored["merged"], false);

    let response = call_tool(
        &server,
        "retrieve_memory",
        json!({"query": "capital of France", "limit": 1}),
    )
    .await;
    let retrieved = tool_json(&response);
    let results = retrieved["results"].as_array().unwrap();
    assert_eq!(results[0]["id"], id.as_str());
    assert!(results[0]["score"].as_f64().unwrap() >= 0.3);
}

#[tokio::test]
async fn dedup_merge_scenario() {
    let (server, _dir) = ready_server().await;

    let first = tool_json(
        &call_tool(
            &server,
            "store_memory",
            json!({"type": "fact", "content": {"statement": "Paris is the capital of France"}}),
        )
        .await,
    );

    let second = tool_json(
        &call_tool(
            &server,
            "store_memory",
            json!({
                "type": "fact",
                "content": {"statement": "Paris is the capital of France"},
                "tags": ["geo"]
            }),
        )
        .await,
    );

    assert_eq!(first["id"], second["id"]);
    assert_eq!(second["merged"], true);

    let listed = tool_json(&call_tool(&server, "list_memories", json!({})).await);
    assert_eq!(listed["total"], 1);
    assert!(listed["items"][0]["tags"]
        .as_array()
        .unwrap()
        .contains(&json!("geo")));
}

#[tokio::test]
async fn delete_scenario() {
    let (server, _dir) = ready_server().await;

    let stored = tool_json(
        &call_tool(
            &server,
            "store_memory",
            json!({"type": "fact", "content": {"statement": "Paris is the capital of France"}}),
        )
        .await,
    );
    let id = stored["id"].as_str().unwrap();

    let deleted = tool_json(&call_tool(&server, "delete_memory", json!({"id": id})).await);
    assert_eq!(deleted["deleted"], true);

    let again = tool_json(&call_tool(&server, "delete_memory", json!({"id": id})).await);
    assert_eq!(again["deleted"], false);

    let retrieved = tool_json(
        &call_tool(
            &server,
            "retrieve_memory",
            json!({"query": "capital of France", "min_similarity": 0.0}),
        )
        .await,
    );
    assert!(retrieved["results"]
        .as_array()
        .unwrap()
        .iter()
        .all(|r| r["id"] != id));
}

#[tokio::test]
async fn stats_reflects_tier_population() {
    let (server, _dir) = ready_server().await;
    for i in 0..4 {
        call_tool(
            &server,
            "store_memory",
            json!({"type": "fact", "content": {"statement": format!("fact {i} about city c{i} in region r{i}")}}),
        )
        .await;
    }

    let stats = tool_json(&call_tool(&server, "memory_stats", json!({})).await);
    assert_eq!(stats["total"], 4);
    assert_eq!(stats["by_tier"]["short_term"], 4);
    assert_eq!(stats["by_type"]["fact"], 4);
    assert_eq!(stats["index"]["vectors"], 4);
}

#[tokio::test]
async fn migration_scenario_over_the_wire() {
    let (server, _dir) = ready_server().await;

    let started = tool_json(
        &call_tool(&server, "migration_start", json!({"target_model": SECONDARY_MODEL})).await,
    );
    assert_eq!(started["state"], "PREPARATION");

    let response =
        call_tool(&server, "migration_start", json!({"target_model": SECONDARY_MODEL})).await;
    let error = response.error.expect("second start must fail");
    assert_eq!(error.data.unwrap()["tag"], "INVALID_TRANSITION");

    let status = tool_json(&call_tool(&server, "migration_status", json!({})).await);
    assert_eq!(status["state"], "PREPARATION");
    assert_eq!(status["primaryModel"], "hash-64");
}

#[tokio::test]
async fn schema_violation_returns_invalid_arguments() {
    let (server, _dir) = ready_server().await;

    let response = call_tool(
        &server,
        "store_memory",
        json!({"type": "fact", "content": {"statement": "x"}, "priority": 3}),
    )
    .await;
    let error = response.error.unwrap();
    assert_eq!(error.code, -32602);
    assert_eq!(error.data.unwrap()["tag"], "INVALID_ARGUMENTS");
}

#[tokio::test]
async fn initializing_before_warm_draining_after_stop() {
    // Build but do not warm: tool list must still serve, calls must not.
    let dir = TempDir::new().unwrap();
    let engine = Arc::new(
        engram_core::EngineBuilder::new(test_config(&dir))
            .with_registry(test_registry())
            .build(),
    );
    let server = McpServer::new(Arc::clone(&engine));
    handshake(&server).await;

    let listed = server
        .handle_request(request("tools/list", None))
        .await
        .unwrap();
    assert_eq!(listed.result.unwrap()["tools"].as_array().unwrap().len(), 12);

    let response = call_tool(&server, "memory_stats", json!({})).await;
    assert_eq!(response.error.unwrap().data.unwrap()["tag"], "INITIALIZING");

    // Warm, verify ready, then drain: calls flip to DRAINING.
    warm(&engine).await;
    let response = call_tool(&server, "memory_stats", json!({})).await;
    assert!(response.error.is_none());

    engine.drain().await;
    let response = call_tool(&server, "memory_stats", json!({})).await;
    assert_eq!(response.error.unwrap().data.unwrap()["tag"], "DRAINING");
}

async fn warm(engine: &Arc<MemoryEngine>) {
    engine.warm().await.unwrap();
}
