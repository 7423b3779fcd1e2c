//! End-to-end test harness
//!
//! Builds fully-warmed engines over temp directories with deterministic mock
//! embedding providers, so journeys run without model downloads or network.

pub mod mocks;

use std::sync::Arc;

use engram_core::{
    EmbeddingRegistry, EngineBuilder, EngineConfig, MemoryEngine, MemoryType, StoreInput,
};
use tempfile::TempDir;

use mocks::TokenHashEmbedder;

/// Model id the harness registers as primary.
pub const PRIMARY_MODEL: &str = "hash-64";

/// Model id the harness registers as a migration target.
pub const SECONDARY_MODEL: &str = "hash-32";

/// Config over a temp dir with the mock primary model.
pub fn test_config(dir: &TempDir) -> EngineConfig {
    EngineConfig {
        data_dir: Some(dir.path().to_path_buf()),
        embedding_model: PRIMARY_MODEL.to_string(),
        embedding_dimension: 64,
        ..Default::default()
    }
}

/// Registry with both mock models.
pub fn test_registry() -> Arc<EmbeddingRegistry> {
    let registry = Arc::new(EmbeddingRegistry::new());
    registry.register(Arc::new(TokenHashEmbedder::new(PRIMARY_MODEL, 64)));
    registry.register(Arc::new(TokenHashEmbedder::new(SECONDARY_MODEL, 32)));
    registry
}

/// A warmed engine with default test config.
pub async fn ready_engine() -> (Arc<MemoryEngine>, TempDir) {
    let dir = TempDir::new().unwrap();
    ready_engine_with(test_config(&dir), dir).await
}

/// A warmed engine with custom config (the dir must back `config.data_dir`).
pub async fn ready_engine_with(
    config: EngineConfig,
    dir: TempDir,
) -> (Arc<MemoryEngine>, TempDir) {
    let engine = EngineBuilder::new(config)
        .with_registry(test_registry())
        .build();
    engine.warm().await.unwrap();
    (Arc::new(engine), dir)
}

/// Store a fact and return its id.
pub async fn store_fact(engine: &Arc<MemoryEngine>, statement: &str) -> String {
    store_fact_with(engine, statement, 0.6, vec![]).await
}

/// Store a fact with explicit importance and tags.
pub async fn store_fact_with(
    engine: &Arc<MemoryEngine>,
    statement: &str,
    importance: f64,
    tags: Vec<String>,
) -> String {
    engine
        .store_memory(StoreInput {
            memory_type: MemoryType::Fact,
            content: serde_json::json!({"statement": statement}),
            importance: Some(importance),
            tags,
            source: None,
        })
        .await
        .unwrap()
        .id
}
