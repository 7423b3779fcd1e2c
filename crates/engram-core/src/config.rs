//! Engine configuration
//!
//! One config object covers every tunable the engine exposes. `Default`
//! yields the documented defaults; `EngineConfig::load` reads a JSON file and
//! fills omitted sections from those defaults.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Tier thresholds and capacities
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TierConfig {
    /// Importance below which an aged short-term memory demotes
    pub short_term_threshold: f64,
    /// Days without access after which a long-term memory archives
    pub archival_threshold_days: f64,
    /// Capacity bound for the short-term tier
    pub max_short_term: usize,
    /// Capacity bound for the long-term tier
    pub max_long_term: usize,
    /// Days an archived memory is retained before expiry (0 = keep forever)
    pub retention_max_age_days: f64,
}

impl Default for TierConfig {
    fn default() -> Self {
        Self {
            short_term_threshold: 0.3,
            archival_threshold_days: 30.0,
            max_short_term: 1000,
            max_long_term: 10_000,
            retention_max_age_days: 365.0,
        }
    }
}

/// Retrieval pipeline weights and thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetrievalConfig {
    /// Default result count
    pub top_k: usize,
    /// Minimum normalized fused score (applied before re-weighting)
    pub semantic_threshold: f64,
    /// Weight of the fused hybrid score
    pub semantic_weight: f64,
    /// Weight of the recency term
    pub recency_weight: f64,
    /// Weight of the importance term
    pub importance_weight: f64,
    /// Whether the lexical source participates (hybrid on/off)
    pub hybrid: bool,
    /// Oversampling factor per source before fusion
    pub source_limit_multiplier: usize,
    /// Cosine threshold for fact/entity dedup on store
    pub dedup_threshold: f64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            semantic_threshold: 0.3,
            semantic_weight: 0.6,
            recency_weight: 0.2,
            importance_weight: 0.2,
            hybrid: true,
            source_limit_multiplier: 4,
            dedup_threshold: 0.92,
        }
    }
}

/// Migration controller gates
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MigrationConfig {
    /// Whether migration tooling is enabled at all
    pub enabled: bool,
    /// Rolling quality mean required to advance to FULL
    pub quality_threshold: f64,
    /// Rolling quality mean below which the controller rolls back
    pub rollback_threshold: f64,
    /// Wall-time budget for the whole migration
    pub max_time_hours: f64,
    /// Re-embedding batch size during GRADUAL
    pub batch_size: usize,
    /// Fraction of retrievals probed during CANARY
    pub canary_sample_rate: f64,
    /// Probes required before the gates fire
    pub min_probe_samples: usize,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            quality_threshold: 0.75,
            rollback_threshold: 0.6,
            max_time_hours: 24.0,
            batch_size: 100,
            canary_sample_rate: 0.05,
            min_probe_samples: 50,
        }
    }
}

/// Background work bounds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BackgroundConfig {
    /// Worker cap for background batches
    pub max_workers: usize,
    /// Queue bound for pending background work
    pub max_queue_size: usize,
    /// Temporal cycle period in seconds
    pub temporal_period_secs: u64,
}

impl Default for BackgroundConfig {
    fn default() -> Self {
        Self {
            max_workers: 4,
            max_queue_size: 1024,
            temporal_period_secs: 60,
        }
    }
}

/// Top-level engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Data directory; None = platform default
    pub data_dir: Option<PathBuf>,
    /// Endpoint of an external vector index backend; the in-process HNSW
    /// backend serves when unset
    pub vector_backend_url: Option<String>,
    /// Active vector collection name
    pub collection_name: String,
    /// Identifier of the active embedding model
    pub embedding_model: String,
    /// Declared dimension of the active embedding model
    pub embedding_dimension: usize,
    /// Optional remote embedding endpoint (POST {model, input})
    pub remote_embedding_url: Option<String>,
    /// Importance decay rate per day
    pub decay_rate: f64,
    /// Importance floor after decay
    pub importance_floor: f64,
    /// Access reinforcement factor (importance += alpha * (1 - importance))
    pub access_alpha: f64,
    /// Per-call deadline in seconds
    pub call_deadline_secs: u64,
    /// Tier policy
    pub tiers: TierConfig,
    /// Retrieval pipeline
    pub retrieval: RetrievalConfig,
    /// Migration gates
    pub migration: MigrationConfig,
    /// Background work bounds
    pub background: BackgroundConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            vector_backend_url: None,
            collection_name: "memories".to_string(),
            embedding_model: crate::DEFAULT_EMBEDDING_MODEL.to_string(),
            embedding_dimension: 256,
            remote_embedding_url: None,
            decay_rate: 0.01,
            importance_floor: 0.2,
            access_alpha: 0.02,
            call_deadline_secs: 30,
            tiers: TierConfig::default(),
            retrieval: RetrievalConfig::default(),
            migration: MigrationConfig::default(),
            background: BackgroundConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a JSON file; omitted fields take defaults.
    pub fn load(path: &Path) -> std::io::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        serde_json::from_str(&raw)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    /// Resolve the data directory, creating it if needed.
    pub fn resolve_data_dir(&self) -> std::io::Result<PathBuf> {
        let dir = match &self.data_dir {
            Some(d) => d.clone(),
            None => directories::ProjectDirs::from("dev", "engram", "engram")
                .map(|p| p.data_dir().to_path_buf())
                .ok_or_else(|| {
                    std::io::Error::other("could not determine a platform data directory")
                })?,
        };
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }
}

// ============================================================================
// TESTS
// ============================================================================
