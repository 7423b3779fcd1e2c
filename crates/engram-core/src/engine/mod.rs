//! Domain manager
//!
//! [`MemoryEngine`] is the façade over the four domains (persistence,
//! temporal, semantic, episodic) and the migration controller. It owns the
//! service state machine, validates and routes every operation, and enforces
//! the write orderings that keep readers consistent:
//!
//! - "index before inline": vector + lexical entries are written before the
//!   record row, so a lexical hit always resolves to a live record or is
//!   dropped at the join
//! - "record before index" on delete: the record row goes first, index
//!   entries are swept afterwards
//!
//! The embedding registry, vector backend, record store, and access batcher
//! are process-wide singletons owned here; their lifecycle is tied to
//! warming and draining, never to lazy module state.

use chrono::Utc;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::embeddings::{EmbeddingProvider, EmbeddingRegistry};
use crate::episodic::{
    ConversationBuffer, ExtractiveSummarizer, ReflectionBatch, ReflectionGenerator,
    REFLECTION_IMPORTANCE,
};
use crate::error::{EngineError, Result};
use crate::memory::{
    Memory, MemoryContent, MemoryFilter, MemoryStats, MemoryTier, MemoryType, ReflectionContent,
    RetrievedMemory, StoreInput, StoreOutcome, UpdatePatch,
};
use crate::migration::{MigrationController, MigrationRecord, MigrationSidecar};
use crate::persistence::{
    AccessBatcher, HnswBackend, LockStripes, MemoryStore, VectorBackend, VectorPayload,
};
use crate::semantic::{
    dedup_applies, fuse, merge_into, min_max_normalize, project, recency_score, should_merge,
    RetrievalWeights,
};
use crate::temporal::{TemporalCycleResult, TemporalPolicy, TierAction};

/// Subdirectory of the data dir holding persisted vector collections.
const COLLECTIONS_DIR: &str = "collections";

/// Query-embedding LRU capacity.
const QUERY_CACHE_SIZE: usize = 100;

/// Result list cap, matching the tool schema bound.
const MAX_RESULTS: usize = 100;

// ============================================================================
// SERVICE STATE
// ============================================================================

/// Engine lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    /// Process started, transport not yet up
    Starting,
    /// Transport handshake done; tool list is servable, calls are not
    TransportReady,
    /// Backends opening, embedding model loading
    Warming,
    /// All domains healthy
    Ready,
    /// Shutdown signalled; in-flight calls finishing
    Draining,
    /// Batchers drained, state persisted
    Stopped,
    /// Absorbing error state
    Failed,
}

impl ServiceState {
    /// Wire name of the state.
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceState::Starting => "starting",
            ServiceState::TransportReady => "transport_ready",
            ServiceState::Warming => "warming",
            ServiceState::Ready => "ready",
            ServiceState::Draining => "draining",
            ServiceState::Stopped => "stopped",
            ServiceState::Failed => "failed",
        }
    }
}

impl std::fmt::Display for ServiceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// BUILDER
// ============================================================================

/// Builds a [`MemoryEngine`] with injectable collaborators.
pub struct EngineBuilder {
    config: EngineConfig,
    registry: Arc<EmbeddingRegistry>,
    reflector: Box<dyn ReflectionGenerator>,
}

impl EngineBuilder {
    /// Start from a config; the registry starts empty and the reflection
    /// generator defaults to the extractive summarizer.
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            registry: Arc::new(EmbeddingRegistry::new()),
            reflector: Box::new(ExtractiveSummarizer::default()),
        }
    }

    /// Use a pre-populated embedding registry.
    pub fn with_registry(mut self, registry: Arc<EmbeddingRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Plug in a reflection generator.
    pub fn with_reflector(mut self, reflector: Box<dyn ReflectionGenerator>) -> Self {
        self.reflector = reflector;
        self
    }

    /// Build the engine in `Starting` state. Call [`MemoryEngine::warm`]
    /// to open backends.
    pub fn build(self) -> MemoryEngine {
        let policy = TemporalPolicy::new(&self.config);
        MemoryEngine {
            policy,
            config: self.config,
            registry: self.registry,
            reflector: self.reflector,
            stripes: LockStripes::default(),
            buffer: ConversationBuffer::default(),
            state: std::sync::RwLock::new(ServiceState::Starting),
            domains: OnceLock::new(),
        }
    }
}

// ============================================================================
// DOMAINS (built during warming)
// ============================================================================

struct Domains {
    store: Arc<MemoryStore>,
    backend: Arc<HnswBackend>,
    batcher: AccessBatcher,
    migration: Arc<MigrationController>,
    query_cache: std::sync::Mutex<LruCache<String, Vec<f32>>>,
    last_cycle: std::sync::Mutex<chrono::DateTime<Utc>>,
    data_dir: PathBuf,
}

// ============================================================================
// ENGINE
// ============================================================================

/// The memory engine façade.
pub struct MemoryEngine {
    config: EngineConfig,
    registry: Arc<EmbeddingRegistry>,
    reflector: Box<dyn ReflectionGenerator>,
    policy: TemporalPolicy,
    stripes: LockStripes,
    buffer: ConversationBuffer,
    state: std::sync::RwLock<ServiceState>,
    domains: OnceLock<Domains>,
}

impl MemoryEngine {
    /// Current lifecycle state.
    pub fn state(&self) -> ServiceState {
        *self.state.read().unwrap_or_else(|p| p.into_inner())
    }

    fn set_state(&self, next: ServiceState) {
        let mut state = self.state.write().unwrap_or_else(|p| p.into_inner());
        if *state == ServiceState::Failed && next != ServiceState::Stopped {
            return; // failed is absorbing
        }
        *state = next;
    }

    /// Latch the absorbing failure state.
    pub fn mark_failed(&self, reason: &str) {
        warn!("engine entering failed state: {}", reason);
        self.set_state(ServiceState::Failed);
    }

    /// Transport handshake completed; tool list may now be served.
    pub fn mark_transport_ready(&self) {
        if self.state() == ServiceState::Starting {
            self.set_state(ServiceState::TransportReady);
        }
    }

    /// Engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Per-call deadline.
    pub fn call_deadline(&self) -> Duration {
        Duration::from_secs(self.config.call_deadline_secs.max(1))
    }

    /// The shared embedding registry.
    pub fn registry(&self) -> &Arc<EmbeddingRegistry> {
        &self.registry
    }

    // ========================================================================
    // WARMING / DRAINING
    // ========================================================================

    /// Open the persistence backend, restore vector collections, and bring
    /// all domains up. On error the engine latches `Failed`.
    pub async fn warm(&self) -> Result<()> {
        self.set_state(ServiceState::Warming);
        match self.warm_inner().await {
            Ok(()) => {
                self.set_state(ServiceState::Ready);
                info!("engine ready");
                Ok(())
            }
            Err(e) => {
                self.mark_failed(&e.to_string());
                Err(e)
            }
        }
    }

    async fn warm_inner(&self) -> Result<()> {
        let data_dir = self.config.resolve_data_dir()?;
        let store = Arc::new(MemoryStore::open(&data_dir.join("engram.db"))?);

        let backend = Arc::new(HnswBackend::new());
        let restored = backend
            .load_all(&data_dir.join(COLLECTIONS_DIR))
            .map_err(EngineError::from)?;
        if restored > 0 {
            info!(collections = restored, "vector collections restored");
        }

        // Resume (or initialize) the migration record before touching
        // collections: after a completed migration the active model may
        // differ from the configured one.
        let sidecar = MigrationSidecar::new(&data_dir);
        let mut record = sidecar.load(&self.config.embedding_model)?;

        let primary = self.registry.get(&record.primary_model).map_err(|e| {
            EngineError::Internal(format!("active embedding model unavailable: {e}"))
        })?;
        if record.primary_model == self.config.embedding_model
            && primary.dimensions() != self.config.embedding_dimension
        {
            return Err(EngineError::Internal(format!(
                "configured dimension {} does not match model dimension {}",
                self.config.embedding_dimension,
                primary.dimensions()
            )));
        }

        let active_collection =
            crate::migration::collection_for(&self.config.collection_name, &record.primary_model);
        if !backend.has_collection(&active_collection) {
            backend
                .create_collection(&active_collection, primary.dimensions())
                .map_err(EngineError::from)?;
        }

        // An interrupted migration whose secondary collection did not survive
        // the restart cannot continue; reset it, keeping the reason.
        if record.state.is_active()
            && let Some(secondary_model) = &record.secondary_model
        {
            let secondary_collection =
                crate::migration::collection_for(&self.config.collection_name, secondary_model);
            if !backend.has_collection(&secondary_collection) {
                warn!("secondary collection lost across restart, resetting migration");
                record.secondary_model = None;
                record.state = crate::migration::MigrationState::Inactive;
                record.last_failure_reason = Some("restart_interrupted".to_string());
                sidecar.save(&record)?;
            }
        }

        let migration = Arc::new(MigrationController::new(
            self.config.migration.clone(),
            &self.config.collection_name,
            sidecar,
            record,
            store.clone(),
            backend.clone() as Arc<dyn VectorBackend>,
            self.registry.clone(),
        ));

        let batcher = AccessBatcher::spawn(
            store.clone(),
            self.config.access_alpha,
            self.config.background.max_queue_size,
        );

        let domains = Domains {
            store,
            backend,
            batcher,
            migration,
            query_cache: std::sync::Mutex::new(LruCache::new(
                NonZeroUsize::new(QUERY_CACHE_SIZE).expect("cache size is non-zero"),
            )),
            last_cycle: std::sync::Mutex::new(Utc::now()),
            data_dir,
        };
        self.domains
            .set(domains)
            .map_err(|_| EngineError::Internal("engine warmed twice".into()))?;
        Ok(())
    }

    /// Drain in-flight work and stop: flush the access batcher, persist
    /// vector collections, release the state machine.
    pub async fn drain(&self) {
        self.set_state(ServiceState::Draining);
        if let Some(domains) = self.domains.get() {
            domains.batcher.shutdown().await;
            if let Err(e) = domains
                .backend
                .save_all(&domains.data_dir.join(COLLECTIONS_DIR))
            {
                warn!("failed to persist vector collections: {}", e);
            }
        }
        self.set_state(ServiceState::Stopped);
        info!("engine stopped");
    }

    /// Readiness gate every operation passes through.
    fn domains(&self) -> Result<&Domains> {
        match self.state() {
            ServiceState::Ready => self
                .domains
                .get()
                .ok_or_else(|| EngineError::Internal("ready without domains".into())),
            ServiceState::Starting | ServiceState::TransportReady | ServiceState::Warming => {
                Err(EngineError::Initializing(self.state().as_str().to_string()))
            }
            ServiceState::Draining | ServiceState::Stopped => Err(EngineError::Draining),
            ServiceState::Failed => Err(EngineError::Internal("engine failed".into())),
        }
    }

    /// Latch fatal (internal) errors into the absorbing failed state.
    fn latch<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(EngineError::Internal(reason)) = &result {
            if self.state() == ServiceState::Ready {
                self.mark_failed(reason);
            }
        }
        result
    }

    fn provider(&self, model: &str) -> Result<Arc<dyn EmbeddingProvider>> {
        self.registry
            .get(model)
            .map_err(|e| EngineError::Backend(e.to_string()))
    }

    // ========================================================================
    // STORE
    // ========================================================================

    /// Store a new memory (or merge into a near-duplicate fact/entity).
    pub async fn store_memory(&self, input: StoreInput) -> Result<StoreOutcome> {
        let result = self.store_inner(input).await;
        self.latch(result)
    }

    async fn store_inner(&self, input: StoreInput) -> Result<StoreOutcome> {
        let domains = self.domains()?;

        let importance = input.importance.unwrap_or(0.5);
        if !(0.0..=1.0).contains(&importance) {
            return Err(EngineError::InvalidArguments(format!(
                "importance {importance} outside [0, 1]"
            )));
        }
        let content = MemoryContent::from_value(input.memory_type, input.content)?;
        let text = project(&content);

        let read = domains.migration.read_target().await;
        let provider = self.provider(&read.model)?;
        let vector = embed_blocking(provider, text.clone()).await?;

        // Dedup probe: the only path by which store returns an existing id.
        if dedup_applies(input.memory_type) {
            let probe_filter = MemoryFilter {
                types: vec![input.memory_type],
                ..Default::default()
            };
            let hits = domains
                .backend
                .search(&read.collection, &vector, 1, &probe_filter)?;
            if let Some(hit) = hits.first()
                && should_merge(hit.similarity, self.config.retrieval.dedup_threshold)
            {
                let id = hit.id.clone();
                let _guard = self.stripes.lock(&id).await;
                if let Some(mut existing) = domains.store.get(&id)? {
                    merge_into(&mut existing, &input.tags, input.source.as_deref(), importance);
                    self.refresh_payloads(domains, &existing).await;
                    domains.store.replace_record(&existing)?;
                    return Ok(StoreOutcome { id, merged: true });
                }
                // The near-duplicate vanished under us; store fresh below.
            }
        }

        let mut memory = Memory::new(input.memory_type, content, importance);
        memory.set_tags(input.tags);
        memory.source = input.source;
        memory.embedding_model = Some(read.model.clone());
        memory.embedding_ref = Some(memory.id.clone());

        self.write_indexed(domains, &memory, &text, &read.model, vector)
            .await?;

        if memory.memory_type == MemoryType::Conversation
            && let Some(batch) = self.buffer.push(&memory.id, &text)
        {
            self.generate_reflection(domains, batch).await;
        }

        Ok(StoreOutcome {
            id: memory.id,
            merged: false,
        })
    }

    /// Write a record's index entries then its row ("index before inline"),
    /// compensating on failure so no orphan index entry survives.
    async fn write_indexed(
        &self,
        domains: &Domains,
        memory: &Memory,
        text: &str,
        embedded_model: &str,
        embedded_vector: Vec<f32>,
    ) -> Result<()> {
        let plan = domains.migration.write_plan().await;
        let payload = payload_of(memory);

        let mut written: Vec<String> = Vec::new();
        for (i, target) in plan.targets().into_iter().enumerate() {
            let vector = if target.model == embedded_model {
                embedded_vector.clone()
            } else {
                let provider = self.provider(&target.model)?;
                match embed_blocking(provider, text.to_string()).await {
                    Ok(v) => v,
                    Err(e) if i > 0 => {
                        // Secondary (shadow) writes are best-effort; GRADUAL
                        // re-embeds whatever is missing.
                        warn!(id = %memory.id, "shadow embed failed: {}", e);
                        continue;
                    }
                    Err(e) => return Err(e),
                }
            };
            let result = domains
                .backend
                .upsert(&target.collection, &memory.id, &vector, payload.clone());
            match result {
                Ok(()) => written.push(target.collection.clone()),
                Err(e) if i > 0 => {
                    warn!(id = %memory.id, "shadow write failed: {}", e);
                }
                Err(e) => {
                    return Err(e.into());
                }
            }
        }

        domains.store.insert_lexical(&memory.id, text)?;

        if let Err(e) = domains.store.insert_record(memory) {
            // Compensate: never leave an index entry pointing at nothing.
            let _ = domains.store.delete_lexical(&memory.id);
            for collection in &written {
                let _ = domains.backend.remove(collection, &memory.id);
            }
            return Err(EngineError::Backend(e.to_string()));
        }
        Ok(())
    }

    /// Refresh the filterable payload of a record in every write-plan
    /// collection (after tier moves and tag edits).
    async fn refresh_payloads(&self, domains: &Domains, memory: &Memory) {
        let plan = domains.migration.write_plan().await;
        let payload = payload_of(memory);
        for target in plan.targets() {
            let _ = domains
                .backend
                .set_payload(&target.collection, &memory.id, payload.clone());
        }
    }

    async fn generate_reflection(&self, domains: &Domains, batch: ReflectionBatch) {
        let body = match self.reflector.reflect(&batch.excerpts) {
            Ok(body) => body,
            Err(e) => {
                // Non-fatal: the excerpts stay unreflected for the next attempt.
                warn!("reflection generation failed: {}", e);
                return;
            }
        };

        let content = MemoryContent::Reflection(ReflectionContent {
            body,
            refs: batch.ids(),
        });
        let text = project(&content);
        let mut memory = Memory::new(MemoryType::Reflection, content, REFLECTION_IMPORTANCE);
        memory.source = Some("consolidation".to_string());

        let read = domains.migration.read_target().await;
        let result = match self.provider(&read.model) {
            Ok(provider) => match embed_blocking(provider, text.clone()).await {
                Ok(vector) => {
                    memory.embedding_model = Some(read.model.clone());
                    memory.embedding_ref = Some(memory.id.clone());
                    self.write_indexed(domains, &memory, &text, &read.model, vector)
                        .await
                }
                Err(e) => Err(e),
            },
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => {
                info!(id = %memory.id, excerpts = batch.excerpts.len(), "reflection stored");
                self.buffer.mark_reflected(&batch.ids());
            }
            Err(e) => warn!("failed to store reflection: {}", e),
        }
    }

    // ========================================================================
    // RETRIEVE
    // ========================================================================

    /// Hybrid retrieval with recency/importance re-weighting and access
    /// side-effects on the returned ids.
    pub async fn retrieve(
        &self,
        query: &str,
        limit: usize,
        filter: MemoryFilter,
        min_similarity: Option<f64>,
    ) -> Result<Vec<RetrievedMemory>> {
        let result = self
            .retrieve_inner(query, limit, filter, min_similarity)
            .await;
        self.latch(result)
    }

    async fn retrieve_inner(
        &self,
        query: &str,
        limit: usize,
        filter: MemoryFilter,
        min_similarity: Option<f64>,
    ) -> Result<Vec<RetrievedMemory>> {
        let domains = self.domains()?;
        let query = query.trim();
        if query.is_empty() {
            return Err(EngineError::InvalidArguments("query cannot be empty".into()));
        }
        let limit = limit.clamp(1, MAX_RESULTS);
        let threshold = min_similarity.unwrap_or(self.config.retrieval.semantic_threshold);

        let read = domains.migration.read_target().await;
        let vector = self.query_vector(domains, &read.model, query).await?;

        let fetch = limit * self.config.retrieval.source_limit_multiplier.max(1);

        // Concurrent source lookups
        let vector_task = {
            let backend = domains.backend.clone();
            let collection = read.collection.clone();
            let filter = filter.clone();
            let vector = vector.clone();
            tokio::task::spawn_blocking(move || backend.search(&collection, &vector, fetch, &filter))
        };
        let lexical_task = {
            let store = domains.store.clone();
            let query = query.to_string();
            let filter = filter.clone();
            let hybrid = self.config.retrieval.hybrid;
            tokio::task::spawn_blocking(move || {
                if hybrid {
                    store.lexical_search(&query, fetch, &filter)
                } else {
                    Ok(Vec::new())
                }
            })
        };
        let (vector_hits, lexical_hits) = tokio::join!(vector_task, lexical_task);
        let vector_hits = vector_hits
            .map_err(|e| EngineError::Internal(format!("vector task: {e}")))??;
        let lexical_hits = lexical_hits
            .map_err(|e| EngineError::Internal(format!("lexical task: {e}")))??;

        let vector_pairs: Vec<(String, f64)> = vector_hits
            .into_iter()
            .map(|h| (h.id, h.similarity))
            .collect();

        let fused = fuse(
            &min_max_normalize(&vector_pairs),
            &min_max_normalize(&lexical_hits),
        );

        let weights = RetrievalWeights {
            semantic: self.config.retrieval.semantic_weight,
            recency: self.config.retrieval.recency_weight,
            importance: self.config.retrieval.importance_weight,
        };
        let now = Utc::now();

        let mut results: Vec<RetrievedMemory> = Vec::new();
        for hit in fused {
            if hit.fused < threshold {
                continue;
            }
            // Hits may reference records deleted mid-flight; drop them.
            let Some(mut memory) = domains.store.get(&hit.id)? else {
                continue;
            };
            self.filter_reflection_refs(domains, &mut memory)?;
            let score = weights.score(
                hit.fused,
                recency_score(memory.last_accessed_at, now),
                memory.importance,
            );
            results.push(RetrievedMemory {
                memory,
                score,
                fused_score: hit.fused,
                vector_score: hit.vector_score,
                lexical_score: hit.lexical_score,
            });
        }

        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.memory.id.cmp(&b.memory.id))
        });
        results.truncate(limit);

        // Access side-effects for consumed results, batched off the read path.
        for result in &results {
            domains.batcher.record(&result.memory.id);
        }

        // Migration probes feed off real traffic.
        domains.migration.note_query(query);
        domains.migration.maybe_canary(query);

        Ok(results)
    }

    async fn query_vector(
        &self,
        domains: &Domains,
        model: &str,
        query: &str,
    ) -> Result<Vec<f32>> {
        let cache_key = format!("{model}\u{1f}{query}");
        if let Some(hit) = domains
            .query_cache
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(&cache_key)
        {
            return Ok(hit.clone());
        }
        let provider = self.provider(model)?;
        let vector = embed_blocking(provider, query.to_string()).await?;
        domains
            .query_cache
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .put(cache_key, vector.clone());
        Ok(vector)
    }

    /// Drop refs to deleted memories from reflections (weak back-references).
    fn filter_reflection_refs(&self, domains: &Domains, memory: &mut Memory) -> Result<()> {
        if memory.memory_type != MemoryType::Reflection {
            return Ok(());
        }
        let store = &domains.store;
        memory
            .content
            .filter_refs(|id| matches!(store.get(id), Ok(Some(_))));
        Ok(())
    }

    // ========================================================================
    // GET / UPDATE / DELETE / LIST / STATS
    // ========================================================================

    /// Fetch one record by id.
    pub async fn get_memory(&self, id: &str) -> Result<Memory> {
        let domains = self.domains()?;
        let mut memory = self.latch(domains.store.get(id))?
            .ok_or_else(|| EngineError::NotFound(id.to_string()))?;
        self.filter_reflection_refs(domains, &mut memory)?;
        Ok(memory)
    }

    /// Apply a partial update; re-embeds and re-indexes when content changed.
    pub async fn update_memory(&self, id: &str, patch: UpdatePatch) -> Result<Memory> {
        let result = self.update_inner(id, patch).await;
        self.latch(result)
    }

    async fn update_inner(&self, id: &str, patch: UpdatePatch) -> Result<Memory> {
        let domains = self.domains()?;
        if let Some(importance) = patch.importance
            && !(0.0..=1.0).contains(&importance)
        {
            return Err(EngineError::InvalidArguments(format!(
                "importance {importance} outside [0, 1]"
            )));
        }

        let _guard = self.stripes.lock(id).await;
        let mut memory = domains
            .store
            .get(id)?
            .ok_or_else(|| EngineError::NotFound(id.to_string()))?;

        if patch.is_empty() {
            return Ok(memory);
        }

        let mut content_changed = false;
        if let Some(content_value) = patch.content {
            let content = MemoryContent::from_value(memory.memory_type, content_value)?;
            if content != memory.content {
                memory.content = content;
                content_changed = true;
            }
        }
        if let Some(importance) = patch.importance {
            memory.importance = importance;
        }
        if let Some(tags) = patch.tags {
            memory.set_tags(tags);
        }
        if let Some(source) = patch.source {
            memory.source = Some(source);
        }
        memory.clamp_importance();
        memory.updated_at = Utc::now();

        if content_changed {
            let text = project(&memory.content);
            let read = domains.migration.read_target().await;
            let provider = self.provider(&read.model)?;
            let vector = embed_blocking(provider, text.clone()).await?;
            memory.embedding_model = Some(read.model.clone());
            memory.embedding_ref = Some(memory.id.clone());

            // Same ordering as store: indexes first, record last.
            let plan = domains.migration.write_plan().await;
            let payload = payload_of(&memory);
            for (i, target) in plan.targets().into_iter().enumerate() {
                let target_vector = if target.model == read.model {
                    vector.clone()
                } else {
                    match self.provider(&target.model) {
                        Ok(p) => match embed_blocking(p, text.clone()).await {
                            Ok(v) => v,
                            Err(e) => {
                                warn!(id = %memory.id, "shadow re-embed failed: {}", e);
                                continue;
                            }
                        },
                        Err(e) => {
                            warn!("shadow provider missing: {}", e);
                            continue;
                        }
                    }
                };
                let result =
                    domains
                        .backend
                        .upsert(&target.collection, &memory.id, &target_vector, payload.clone());
                if let Err(e) = result {
                    if i == 0 {
                        return Err(e.into());
                    }
                    warn!(id = %memory.id, "shadow write failed: {}", e);
                }
            }
            domains.store.insert_lexical(&memory.id, &text)?;
        } else {
            self.refresh_payloads(domains, &memory).await;
        }

        domains.store.replace_record(&memory)?;
        Ok(memory)
    }

    /// Delete a record and sweep its index entries. Idempotent: deleting a
    /// missing id reports `false`.
    pub async fn delete_memory(&self, id: &str) -> Result<bool> {
        let domains = self.domains()?;
        let _guard = self.stripes.lock(id).await;
        self.delete_swept(domains, id).await
    }

    async fn delete_swept(&self, domains: &Domains, id: &str) -> Result<bool> {
        // Record row first; index sweep after ("record before index").
        let deleted = self.latch(domains.store.delete_record(id))?;
        if !deleted {
            return Ok(false);
        }
        let _ = domains.store.delete_lexical(id);
        let plan = domains.migration.write_plan().await;
        for target in plan.targets() {
            let _ = domains.backend.remove(&target.collection, id);
        }
        self.buffer.forget(id);
        Ok(true)
    }

    /// List records matching a filter, newest first.
    pub async fn list_memories(
        &self,
        filter: MemoryFilter,
        limit: usize,
        offset: usize,
    ) -> Result<(Vec<Memory>, i64)> {
        let domains = self.domains()?;
        let limit = limit.clamp(1, MAX_RESULTS);
        self.latch(domains.store.list(&filter, limit, offset))
    }

    /// Counts by type and tier plus index sizes.
    pub async fn stats(&self) -> Result<MemoryStats> {
        let domains = self.domains()?;
        let (total, by_type, by_tier) = self.latch(domains.store.counts())?;
        let read = domains.migration.read_target().await;
        let vectors = domains.backend.count(&read.collection).unwrap_or(0);
        let lexical_entries = domains.store.lexical_count()?;
        Ok(MemoryStats {
            total,
            by_type,
            by_tier,
            index: crate::memory::IndexStats {
                vectors,
                lexical_entries,
            },
        })
    }

    // ========================================================================
    // BACKGROUND CYCLES
    // ========================================================================

    /// One temporal cycle: decay, tier policy, capacity bounds, retention.
    pub async fn run_temporal_cycle(&self) -> Result<TemporalCycleResult> {
        let result = self.temporal_inner().await;
        self.latch(result)
    }

    async fn temporal_inner(&self) -> Result<TemporalCycleResult> {
        let domains = self.domains()?;
        let started = Instant::now();
        let now = Utc::now();
        let mut result = TemporalCycleResult::default();

        let elapsed_days = {
            let mut last = domains.last_cycle.lock().unwrap_or_else(|p| p.into_inner());
            let elapsed = (now - *last).num_milliseconds().max(0) as f64 / 86_400_000.0;
            *last = now;
            elapsed
        };

        for memory in domains.store.scan_non_archived()? {
            let decayed = self.policy.decayed_importance(memory.importance, elapsed_days);
            let mut current = memory;
            if (decayed - current.importance).abs() > f64::EPSILON {
                domains.store.set_importance(&current.id, decayed)?;
                current.importance = decayed;
                result.decayed += 1;
            }

            match self.policy.evaluate(&current, now) {
                TierAction::Stay => {}
                TierAction::Demote(tier) => {
                    if self.apply_tier_move(domains, &mut current, tier).await {
                        result.demoted += 1;
                    }
                }
                TierAction::Promote(tier) => {
                    if self.apply_tier_move(domains, &mut current, tier).await {
                        result.promoted += 1;
                    }
                }
            }
        }

        // Capacity bounds, after the policy moves settled.
        for (tier, target) in [
            (MemoryTier::ShortTerm, MemoryTier::LongTerm),
            (MemoryTier::LongTerm, MemoryTier::Archived),
        ] {
            let members = domains.store.scan_tier(tier)?;
            for id in self.policy.overflow_victims(tier, &members) {
                if let Some(mut memory) = domains.store.get(&id)?
                    && self.apply_tier_move(domains, &mut memory, target).await
                {
                    result.demoted += 1;
                }
            }
        }

        // Retention expiry in the archived tier; never silent.
        for memory in domains.store.scan_tier(MemoryTier::Archived)? {
            if self.policy.is_expired(&memory, now) {
                info!(
                    id = %memory.id,
                    importance = memory.importance,
                    "archived memory expired by retention policy"
                );
                domains
                    .store
                    .log_expiry(&memory.id, memory.memory_type, memory.importance)?;
                self.delete_swept(domains, &memory.id).await?;
                result.expired += 1;
            }
        }

        result.duration_ms = started.elapsed().as_millis() as i64;
        Ok(result)
    }

    async fn apply_tier_move(
        &self,
        domains: &Domains,
        memory: &mut Memory,
        tier: MemoryTier,
    ) -> bool {
        match domains.store.move_tier(&memory.id, tier) {
            Ok(()) => {
                memory.tier = tier;
                self.refresh_payloads(domains, memory).await;
                true
            }
            Err(e) => {
                warn!(id = %memory.id, "tier move failed: {}", e);
                false
            }
        }
    }

    /// One migration driver cycle (gates + GRADUAL batch).
    pub async fn drive_migration(&self) -> Result<MigrationRecord> {
        let domains = self.domains()?;
        domains.migration.drive().await
    }

    // ========================================================================
    // MIGRATION TOOL SURFACE
    // ========================================================================

    fn migration_enabled(&self) -> Result<()> {
        if !self.config.migration.enabled {
            return Err(EngineError::InvalidArguments(
                "migration is disabled by configuration".into(),
            ));
        }
        Ok(())
    }

    /// `migration_start(target_model)`
    pub async fn migration_start(&self, target_model: &str) -> Result<MigrationRecord> {
        self.migration_enabled()?;
        let domains = self.domains()?;
        domains.migration.start(target_model).await
    }

    /// `migration_status()`
    pub async fn migration_status(&self) -> Result<MigrationRecord> {
        let domains = self.domains()?;
        Ok(domains.migration.status().await)
    }

    /// `migration_advance()`
    pub async fn migration_advance(&self) -> Result<MigrationRecord> {
        self.migration_enabled()?;
        let domains = self.domains()?;
        domains.migration.advance().await
    }

    /// `migration_pause()`
    pub async fn migration_pause(&self) -> Result<MigrationRecord> {
        self.migration_enabled()?;
        let domains = self.domains()?;
        domains.migration.pause().await
    }

    /// `migration_resume()`
    pub async fn migration_resume(&self) -> Result<MigrationRecord> {
        self.migration_enabled()?;
        let domains = self.domains()?;
        domains.migration.resume().await
    }

    /// `migration_rollback()`
    pub async fn migration_rollback(&self) -> Result<MigrationRecord> {
        self.migration_enabled()?;
        let domains = self.domains()?;
        domains.migration.rollback("manual").await
    }

    /// Feed an externally computed probe score into the rolling quality
    /// window (hosts that evaluate retrieval quality out-of-band).
    pub fn record_migration_probe(&self, primary: f64, combined: f64) {
        if let Some(domains) = self.domains.get() {
            domains.migration.record_probe_scores(primary, combined);
        }
    }
}

fn payload_of(memory: &Memory) -> VectorPayload {
    VectorPayload {
        memory_type: memory.memory_type,
        tier: memory.tier,
        tags: memory.tags.clone(),
        created_at: memory.created_at,
    }
}

async fn embed_blocking(
    provider: Arc<dyn EmbeddingProvider>,
    text: String,
) -> Result<Vec<f32>> {
    tokio::task::spawn_blocking(move || provider.embed(&text))
        .await
        .map_err(|e| EngineError::Internal(format!("embedding task panicked: {e}")))?
        .map_err(|e| EngineError::Backend(e.to_string()))
}

// ============================================================================
// TESTS
// ============================================================================
