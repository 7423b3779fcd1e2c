//! # Engram Core
//!
//! Tiered memory engine for conversational assistants:
//!
//! - **Typed records**: facts, entities, conversation excerpts, reflections,
//!   and code snippets with importance and provenance
//! - **Tiered storage**: short-term / long-term / archived with decay-driven
//!   demotion and access-driven promotion
//! - **Hybrid retrieval**: HNSW vector search (USearch) + BM25 (SQLite FTS5)
//!   fused with Reciprocal Rank Fusion, re-weighted by recency and importance
//! - **Consolidation**: conversation excerpts summarize into reflection
//!   memories via a pluggable generator
//! - **Dual-collection migration**: swap the embedding model with shadow
//!   writes, canary probes, quality gates, and rollback - no downtime
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use engram_core::{EngineBuilder, EngineConfig, StoreInput, MemoryType};
//!
//! let engine = EngineBuilder::new(EngineConfig::default()).build();
//! engine.warm().await?;
//!
//! let outcome = engine.store_memory(StoreInput {
//!     memory_type: MemoryType::Fact,
//!     content: serde_json::json!({"statement": "Paris is the capital of France"}),
//!     importance: Some(0.8),
//!     tags: vec!["geo".into()],
//!     source: None,
//! }).await?;
//!
//! let hits = engine.retrieve("capital of France", 5, Default::default(), None).await?;
//! ```
//!
//! ## Feature Flags
//!
//! - `embeddings` (default): local embedding generation with fastembed

#![warn(rustdoc::missing_crate_level_docs)]

// ============================================================================
// MODULES
// ============================================================================

pub mod config;
pub mod embeddings;
pub mod engine;
pub mod episodic;
pub mod error;
pub mod memory;
pub mod migration;
pub mod persistence;
pub mod semantic;
pub mod temporal;

// ============================================================================
// PUBLIC API RE-EXPORTS
// ============================================================================

// Record model
pub use memory::{
    CodeContent, ContentError, ConversationContent, ConversationMessage, ConversationRole,
    EntityContent, FactContent, IndexStats, Memory, MemoryContent, MemoryFilter, MemoryStats,
    MemoryTier, MemoryType, ReflectionContent, RetrievedMemory, StoreInput, StoreOutcome,
    UpdatePatch,
};

// Engine façade
pub use engine::{EngineBuilder, MemoryEngine, ServiceState};

// Configuration
pub use config::{BackgroundConfig, EngineConfig, MigrationConfig, RetrievalConfig, TierConfig};

// Errors
pub use error::{EngineError, ErrorCode, Result};

// Embeddings
pub use embeddings::{
    cosine_similarity, EmbeddingError, EmbeddingProvider, EmbeddingRegistry, RemoteEmbedder,
};
#[cfg(feature = "embeddings")]
pub use embeddings::LocalEmbedder;

// Persistence collaborators
pub use persistence::{HnswBackend, MemoryStore, VectorBackend, VectorError, VectorHit, VectorPayload};

// Migration controller
pub use migration::{
    MigrationController, MigrationProgress, MigrationRecord, MigrationState, QualitySnapshot,
};

// Episodic plug-ins
pub use episodic::{ConversationExcerpt, ExtractiveSummarizer, ReflectionGenerator};

// Temporal results
pub use temporal::{TemporalCycleResult, TemporalPolicy};

// ============================================================================
// VERSION INFO
// ============================================================================

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default embedding model (nomic-embed-text-v1.5, Matryoshka-truncated to
/// 256 dimensions)
pub const DEFAULT_EMBEDDING_MODEL: &str = "nomic-ai/nomic-embed-text-v1.5";

// ============================================================================
// PRELUDE
// ============================================================================

/// Convenient imports for common usage
pub mod prelude {
    pub use crate::{
        EngineBuilder, EngineConfig, EngineError, MemoryEngine, Memory, MemoryContent,
        MemoryFilter, MemoryStats, MemoryTier, MemoryType, Result, RetrievedMemory, ServiceState,
        StoreInput, StoreOutcome, UpdatePatch,
    };

    pub use crate::{EmbeddingProvider, EmbeddingRegistry};

    pub use crate::{MigrationRecord, MigrationState};
}
