//! Vector index backend
//!
//! The engine talks to vector storage through the [`VectorBackend`] trait:
//! named collections of `(id, vector, payload)` answering filtered
//! approximate-nearest-neighbor queries. Collections are first-class so the
//! migration controller can run two (primary + secondary) side by side.
//!
//! [`HnswBackend`] is the in-process reference implementation: one USearch
//! HNSW index per collection plus a payload map, filters applied by
//! oversampling the ANN search and matching payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use usearch::{Index, IndexOptions, MetricKind, ScalarKind};

use crate::memory::{MemoryFilter, MemoryTier, MemoryType};

/// HNSW connectivity parameter (higher = better recall, more memory)
pub const DEFAULT_CONNECTIVITY: usize = 16;

/// HNSW expansion factor for index building
pub const DEFAULT_EXPANSION_ADD: usize = 128;

/// HNSW expansion factor for search
pub const DEFAULT_EXPANSION_SEARCH: usize = 64;

/// Oversampling factor when a filter must be applied post-search
const FILTER_OVERSAMPLE: usize = 4;

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Vector backend error
#[non_exhaustive]
#[derive(Debug, Clone, thiserror::Error)]
pub enum VectorError {
    /// No collection with that name
    #[error("collection not found: {0}")]
    CollectionNotFound(String),
    /// Collection already exists
    #[error("collection already exists: {0}")]
    CollectionExists(String),
    /// Vector length differs from the collection's declared dimension
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
    /// Index-level failure
    #[error("index error: {0}")]
    Index(String),
    /// Persistence failure
    #[error("persistence error: {0}")]
    Persistence(String),
}

impl From<VectorError> for crate::error::EngineError {
    fn from(err: VectorError) -> Self {
        match err {
            VectorError::DimensionMismatch { expected, got } => {
                crate::error::EngineError::DimensionMismatch { expected, got }
            }
            other => crate::error::EngineError::Backend(other.to_string()),
        }
    }
}

// ============================================================================
// PAYLOAD AND HITS
// ============================================================================

/// Payload stored next to each vector; carries exactly the attributes the
/// search filter can constrain.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VectorPayload {
    /// Record type
    pub memory_type: MemoryType,
    /// Record tier
    pub tier: MemoryTier,
    /// Record tags
    pub tags: Vec<String>,
    /// Record creation time
    pub created_at: DateTime<Utc>,
}

/// One ANN hit; similarity already clamped to [0, 1].
#[derive(Debug, Clone)]
pub struct VectorHit {
    /// Memory id (the vector's key)
    pub id: String,
    /// Cosine similarity in [0, 1]
    pub similarity: f64,
}

// ============================================================================
// BACKEND TRAIT
// ============================================================================

/// Interface to a vector index backend.
///
/// Implementations must be safe to share across tasks; every method is a
/// suspension-point boundary from the engine's point of view.
pub trait VectorBackend: Send + Sync {
    /// Create an empty collection with a fixed dimension.
    fn create_collection(&self, name: &str, dimension: usize) -> Result<(), VectorError>;

    /// Drop a collection and everything in it. Dropping a missing collection
    /// is a no-op.
    fn drop_collection(&self, name: &str) -> Result<(), VectorError>;

    /// Whether a collection exists.
    fn has_collection(&self, name: &str) -> bool;

    /// Declared dimension of a collection.
    fn dimension(&self, name: &str) -> Result<usize, VectorError>;

    /// Insert or replace a vector with its payload.
    fn upsert(
        &self,
        collection: &str,
        id: &str,
        vector: &[f32],
        payload: VectorPayload,
    ) -> Result<(), VectorError>;

    /// Replace only the payload of an existing vector (tier moves, tag edits).
    fn set_payload(&self, collection: &str, id: &str, payload: VectorPayload)
        -> Result<bool, VectorError>;

    /// Whether a vector with this id exists in the collection.
    fn contains(&self, collection: &str, id: &str) -> Result<bool, VectorError>;

    /// Remove a vector. Returns false when the id was absent.
    fn remove(&self, collection: &str, id: &str) -> Result<bool, VectorError>;

    /// Filtered ANN search; results ordered by similarity descending.
    fn search(
        &self,
        collection: &str,
        query: &[f32],
        k: usize,
        filter: &MemoryFilter,
    ) -> Result<Vec<VectorHit>, VectorError>;

    /// Number of vectors in a collection.
    fn count(&self, collection: &str) -> Result<usize, VectorError>;
}

// ============================================================================
// IN-PROCESS HNSW BACKEND
// ============================================================================

struct Collection {
    index: Index,
    dimension: usize,
    key_to_id: HashMap<String, u64>,
    id_to_key: HashMap<u64, String>,
    payloads: HashMap<String, VectorPayload>,
    next_id: u64,
}

impl Collection {
    fn new(dimension: usize) -> Result<Self, VectorError> {
        let options = IndexOptions {
            dimensions: dimension,
            metric: MetricKind::Cos,
            quantization: ScalarKind::F32,
            connectivity: DEFAULT_CONNECTIVITY,
            expansion_add: DEFAULT_EXPANSION_ADD,
            expansion_search: DEFAULT_EXPANSION_SEARCH,
            multi: false,
        };
        let index = Index::new(&options).map_err(|e| VectorError::Index(e.to_string()))?;
        Ok(Self {
            index,
            dimension,
            key_to_id: HashMap::new(),
            id_to_key: HashMap::new(),
            payloads: HashMap::new(),
            next_id: 0,
        })
    }

    fn reserve_for_add(&self) -> Result<(), VectorError> {
        // usearch requires reserve() before add()
        let capacity = self.index.capacity();
        if self.index.size() >= capacity {
            let new_capacity = std::cmp::max(capacity * 2, 16);
            self.index
                .reserve(new_capacity)
                .map_err(|e| VectorError::Index(e.to_string()))?;
        }
        Ok(())
    }

    fn upsert(&mut self, key: &str, vector: &[f32], payload: VectorPayload) -> Result<(), VectorError> {
        if vector.len() != self.dimension {
            return Err(VectorError::DimensionMismatch {
                expected: self.dimension,
                got: vector.len(),
            });
        }

        if let Some(&existing) = self.key_to_id.get(key) {
            self.index
                .remove(existing)
                .map_err(|e| VectorError::Index(e.to_string()))?;
            self.reserve_for_add()?;
            self.index
                .add(existing, vector)
                .map_err(|e| VectorError::Index(e.to_string()))?;
        } else {
            self.reserve_for_add()?;
            let id = self.next_id;
            self.next_id += 1;
            self.index
                .add(id, vector)
                .map_err(|e| VectorError::Index(e.to_string()))?;
            self.key_to_id.insert(key.to_string(), id);
            self.id_to_key.insert(id, key.to_string());
        }

        self.payloads.insert(key.to_string(), payload);
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<bool, VectorError> {
        self.payloads.remove(key);
        if let Some(id) = self.key_to_id.remove(key) {
            self.id_to_key.remove(&id);
            self.index
                .remove(id)
                .map_err(|e| VectorError::Index(e.to_string()))?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn search(
        &self,
        query: &[f32],
        k: usize,
        filter: &MemoryFilter,
    ) -> Result<Vec<VectorHit>, VectorError> {
        if query.len() != self.dimension {
            return Err(VectorError::DimensionMismatch {
                expected: self.dimension,
                got: query.len(),
            });
        }
        if self.index.size() == 0 || k == 0 {
            return Ok(Vec::new());
        }

        let fetch = if filter.is_empty() {
            k
        } else {
            (k * FILTER_OVERSAMPLE).min(self.index.size())
        };

        let matches = self
            .index
            .search(query, fetch)
            .map_err(|e| VectorError::Index(e.to_string()))?;

        let mut hits = Vec::with_capacity(matches.keys.len());
        for (raw_key, distance) in matches.keys.iter().zip(matches.distances.iter()) {
            let Some(key) = self.id_to_key.get(raw_key) else {
                continue;
            };
            if !filter.is_empty() {
                let Some(payload) = self.payloads.get(key) else {
                    continue;
                };
                if !filter.matches(payload.memory_type, payload.tier, &payload.tags, payload.created_at)
                {
                    continue;
                }
            }
            // Cosine distance -> similarity, clamped into [0, 1] for fusion
            let similarity = (1.0 - *distance as f64).clamp(0.0, 1.0);
            hits.push(VectorHit {
                id: key.clone(),
                similarity,
            });
            if hits.len() == k {
                break;
            }
        }
        Ok(hits)
    }
}

/// In-process HNSW vector backend with named collections.
pub struct HnswBackend {
    collections: Mutex<HashMap<String, Collection>>,
}

impl Default for HnswBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl HnswBackend {
    /// Create an empty backend.
    pub fn new() -> Self {
        Self {
            collections: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Collection>> {
        // Poisoning only happens if another thread panicked mid-operation;
        // the map itself stays structurally valid.
        self.collections
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Persist every collection under `dir` (index file + payload sidecar).
    pub fn save_all(&self, dir: &Path) -> Result<(), VectorError> {
        std::fs::create_dir_all(dir).map_err(|e| VectorError::Persistence(e.to_string()))?;
        let collections = self.lock();
        for (name, collection) in collections.iter() {
            let index_path = dir.join(format!("{name}.usearch"));
            let path_str = index_path
                .to_str()
                .ok_or_else(|| VectorError::Persistence("invalid path".into()))?;
            collection
                .index
                .save(path_str)
                .map_err(|e| VectorError::Persistence(e.to_string()))?;

            let meta = serde_json::json!({
                "dimension": collection.dimension,
                "nextId": collection.next_id,
                "keyToId": collection.key_to_id,
                "payloads": collection.payloads,
            });
            let meta_str = serde_json::to_string(&meta)
                .map_err(|e| VectorError::Persistence(e.to_string()))?;
            std::fs::write(dir.join(format!("{name}.meta.json")), meta_str)
                .map_err(|e| VectorError::Persistence(e.to_string()))?;
        }
        Ok(())
    }

    /// Load every collection previously saved under `dir`.
    pub fn load_all(&self, dir: &Path) -> Result<usize, VectorError> {
        if !dir.is_dir() {
            return Ok(0);
        }
        let mut loaded = 0;
        let entries = std::fs::read_dir(dir).map_err(|e| VectorError::Persistence(e.to_string()))?;
        for entry in entries.flatten() {
            let path = entry.path();
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Some(name) = file_name.strip_suffix(".meta.json") else {
                continue;
            };

            let meta_str = std::fs::read_to_string(&path)
                .map_err(|e| VectorError::Persistence(e.to_string()))?;
            let meta: serde_json::Value = serde_json::from_str(&meta_str)
                .map_err(|e| VectorError::Persistence(e.to_string()))?;
            let dimension = meta["dimension"]
                .as_u64()
                .ok_or_else(|| VectorError::Persistence("missing dimension".into()))?
                as usize;

            let mut collection = Collection::new(dimension)?;
            let index_path = dir.join(format!("{name}.usearch"));
            if let Some(path_str) = index_path.to_str()
                && index_path.exists()
            {
                collection
                    .index
                    .load(path_str)
                    .map_err(|e| VectorError::Persistence(e.to_string()))?;
            }
            collection.key_to_id = serde_json::from_value(meta["keyToId"].clone())
                .map_err(|e| VectorError::Persistence(e.to_string()))?;
            collection.id_to_key = collection
                .key_to_id
                .iter()
                .map(|(k, &v)| (v, k.clone()))
                .collect();
            collection.payloads = serde_json::from_value(meta["payloads"].clone())
                .map_err(|e| VectorError::Persistence(e.to_string()))?;
            collection.next_id = meta["nextId"].as_u64().unwrap_or(0);

            self.lock().insert(name.to_string(), collection);
            loaded += 1;
        }
        Ok(loaded)
    }

    /// Delete any files previously saved for `name` under `dir`.
    pub fn remove_saved(&self, dir: &Path, name: &str) {
        let _ = std::fs::remove_file(dir.join(format!("{name}.usearch")));
        let _ = std::fs::remove_file(dir.join(format!("{name}.meta.json")));
    }
}

impl VectorBackend for HnswBackend {
    fn create_collection(&self, name: &str, dimension: usize) -> Result<(), VectorError> {
        let mut collections = self.lock();
        if collections.contains_key(name) {
            return Err(VectorError::CollectionExists(name.to_string()));
        }
        collections.insert(name.to_string(), Collection::new(dimension)?);
        Ok(())
    }

    fn drop_collection(&self, name: &str) -> Result<(), VectorError> {
        self.lock().remove(name);
        Ok(())
    }

    fn has_collection(&self, name: &str) -> bool {
        self.lock().contains_key(name)
    }

    fn dimension(&self, name: &str) -> Result<usize, VectorError> {
        self.lock()
            .get(name)
            .map(|c| c.dimension)
            .ok_or_else(|| VectorError::CollectionNotFound(name.to_string()))
    }

    fn upsert(
        &self,
        collection: &str,
        id: &str,
        vector: &[f32],
        payload: VectorPayload,
    ) -> Result<(), VectorError> {
        let mut collections = self.lock();
        let coll = collections
            .get_mut(collection)
            .ok_or_else(|| VectorError::CollectionNotFound(collection.to_string()))?;
        coll.upsert(id, vector, payload)
    }

    fn set_payload(
        &self,
        collection: &str,
        id: &str,
        payload: VectorPayload,
    ) -> Result<bool, VectorError> {
        let mut collections = self.lock();
        let coll = collections
            .get_mut(collection)
            .ok_or_else(|| VectorError::CollectionNotFound(collection.to_string()))?;
        if !coll.key_to_id.contains_key(id) {
            return Ok(false);
        }
        coll.payloads.insert(id.to_string(), payload);
        Ok(true)
    }

    fn contains(&self, collection: &str, id: &str) -> Result<bool, VectorError> {
        let collections = self.lock();
        let coll = collections
            .get(collection)
            .ok_or_else(|| VectorError::CollectionNotFound(collection.to_string()))?;
        Ok(coll.key_to_id.contains_key(id))
    }

    fn remove(&self, collection: &str, id: &str) -> Result<bool, VectorError> {
        let mut collections = self.lock();
        let coll = collections
            .get_mut(collection)
            .ok_or_else(|| VectorError::CollectionNotFound(collection.to_string()))?;
        coll.remove(id)
    }

    fn search(
        &self,
        collection: &str,
        query: &[f32],
        k: usize,
        filter: &MemoryFilter,
    ) -> Result<Vec<VectorHit>, VectorError> {
        let collections = self.lock();
        let coll = collections
            .get(collection)
            .ok_or_else(|| VectorError::CollectionNotFound(collection.to_string()))?;
        coll.search(query, k, filter)
    }

    fn count(&self, collection: &str) -> Result<usize, VectorError> {
        self.lock()
            .get(collection)
            .map(|c| c.index.size())
            .ok_or_else(|| VectorError::CollectionNotFound(collection.to_string()))
    }
}

// ============================================================================
// TESTS
// ============================================================================
