//! Migration controller
//!
//! Replaces the active embedding model without downtime: a secondary vector
//! collection is built next to the primary, writes shadow into both, quality
//! is probed against real queries, existing memories are re-embedded in
//! batches, and only then does the read pointer flip. A quality regression or
//! a blown time budget rolls everything back.
//!
//! All state transitions are serialized by one controller mutex and persisted
//! atomically to the JSON sidecar.

mod quality;
mod record;

pub use quality::{primary_score, quality_score, ProbeRing, QualityTracker, PROBE_TOP_K};
pub use record::{
    MigrationProgress, MigrationRecord, MigrationSidecar, MigrationState, QualitySnapshot,
    SIDECAR_FILE,
};

use chrono::Utc;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::config::MigrationConfig;
use crate::embeddings::EmbeddingRegistry;
use crate::error::{EngineError, Result};
use crate::memory::MemoryFilter;
use crate::persistence::{MemoryStore, VectorBackend, VectorPayload};
use crate::semantic::project;

/// Exponential backoff schedule for failed GRADUAL batches, in milliseconds.
const BATCH_BACKOFF_MS: [u64; 5] = [250, 500, 1000, 2000, 4000];

/// Probe queries evaluated per drive cycle during GRADUAL.
const PROBES_PER_CYCLE: usize = 8;

// ============================================================================
// WRITE PLAN
// ============================================================================

/// One write destination: a collection and the model that feeds it.
#[derive(Debug, Clone)]
pub struct WriteTarget {
    /// Collection name
    pub collection: String,
    /// Embedding model id
    pub model: String,
}

/// Where a write must land. `secondary` is set while dual writes are active.
#[derive(Debug, Clone)]
pub struct WritePlan {
    /// Always written
    pub primary: WriteTarget,
    /// Written additionally during SHADOW..FULL
    pub secondary: Option<WriteTarget>,
}

impl WritePlan {
    /// Targets in write order (primary first).
    pub fn targets(&self) -> Vec<&WriteTarget> {
        let mut targets = vec![&self.primary];
        if let Some(secondary) = &self.secondary {
            targets.push(secondary);
        }
        targets
    }
}

/// Collection name for a model under the configured base name.
pub fn collection_for(base: &str, model: &str) -> String {
    let slug: String = model
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
        .collect();
    format!("{base}__{slug}")
}

// ============================================================================
// CONTROLLER
// ============================================================================

/// Dual-collection migration state machine.
pub struct MigrationController {
    config: MigrationConfig,
    collection_base: String,
    sidecar: MigrationSidecar,
    record: Mutex<MigrationRecord>,
    quality: QualityTracker,
    probes: ProbeRing,
    deferred: std::sync::Mutex<VecDeque<String>>,
    canary_counter: AtomicU64,
    store: Arc<MemoryStore>,
    backend: Arc<dyn VectorBackend>,
    registry: Arc<EmbeddingRegistry>,
}

impl MigrationController {
    /// Build the controller over the shared persistence singletons, resuming
    /// from the persisted record when one exists.
    pub fn new(
        config: MigrationConfig,
        collection_base: &str,
        sidecar: MigrationSidecar,
        initial: MigrationRecord,
        store: Arc<MemoryStore>,
        backend: Arc<dyn VectorBackend>,
        registry: Arc<EmbeddingRegistry>,
    ) -> Self {
        Self {
            quality: QualityTracker::new(config.min_probe_samples.max(1) * 2),
            config,
            collection_base: collection_base.to_string(),
            sidecar,
            record: Mutex::new(initial),
            probes: ProbeRing::new(),
            deferred: std::sync::Mutex::new(VecDeque::new()),
            canary_counter: AtomicU64::new(0),
            store,
            backend,
            registry,
        }
    }

    fn persist(&self, record: &mut MigrationRecord) -> Result<()> {
        record.last_checkpoint = Some(Utc::now());
        let (primary, combined, samples) = self.quality.snapshot();
        record.quality = QualitySnapshot {
            primary_score: primary,
            secondary_score: combined,
            samples,
        };
        self.sidecar.save(record)
    }

    fn primary_collection(&self, record: &MigrationRecord) -> String {
        collection_for(&self.collection_base, &record.primary_model)
    }

    fn secondary_collection(&self, record: &MigrationRecord) -> Option<String> {
        record
            .secondary_model
            .as_ref()
            .map(|m| collection_for(&self.collection_base, m))
    }

    // ========================================================================
    // READ / WRITE TARGETS
    // ========================================================================

    /// Where reads are served from right now.
    pub async fn read_target(&self) -> WriteTarget {
        let record = self.record.lock().await;
        self.read_target_of(&record)
    }

    fn read_target_of(&self, record: &MigrationRecord) -> WriteTarget {
        if record.state.reads_from_secondary()
            && let Some(model) = &record.secondary_model
        {
            return WriteTarget {
                collection: collection_for(&self.collection_base, model),
                model: model.clone(),
            };
        }
        WriteTarget {
            collection: self.primary_collection(record),
            model: record.primary_model.clone(),
        }
    }

    /// Where writes must land right now.
    pub async fn write_plan(&self) -> WritePlan {
        let record = self.record.lock().await;
        let primary = WriteTarget {
            collection: self.primary_collection(&record),
            model: record.primary_model.clone(),
        };
        let secondary = if record.state.dual_writes() {
            record.secondary_model.as_ref().map(|model| WriteTarget {
                collection: collection_for(&self.collection_base, model),
                model: model.clone(),
            })
        } else {
            None
        };
        WritePlan { primary, secondary }
    }

    // ========================================================================
    // TOOL SURFACE
    // ========================================================================

    /// Current record (with a fresh quality snapshot).
    pub async fn status(&self) -> MigrationRecord {
        let mut record = self.record.lock().await.clone();
        let (primary, combined, samples) = self.quality.snapshot();
        record.quality = QualitySnapshot {
            primary_score: primary,
            secondary_score: combined,
            samples,
        };
        record
    }

    /// Begin a migration to `target_model`.
    pub async fn start(&self, target_model: &str) -> Result<MigrationRecord> {
        let mut record = self.record.lock().await;
        if !matches!(
            record.state,
            MigrationState::Inactive | MigrationState::Completed
        ) {
            return Err(EngineError::InvalidTransition {
                from: record.state.as_str().to_string(),
                to: MigrationState::Preparation.as_str().to_string(),
            });
        }
        if target_model == record.primary_model {
            return Err(EngineError::InvalidArguments(
                "target model is already the primary".to_string(),
            ));
        }
        let provider = self
            .registry
            .get(target_model)
            .map_err(|e| EngineError::InvalidArguments(e.to_string()))?;

        // PREPARATION: create the secondary collection with the target
        // dimension. A failure here is critical.
        let secondary = collection_for(&self.collection_base, target_model);
        if self.backend.has_collection(&secondary) {
            self.backend.drop_collection(&secondary)?;
        }
        if let Err(e) = self
            .backend
            .create_collection(&secondary, provider.dimensions())
        {
            record.last_failure_reason = Some(format!("collection_create_failed: {e}"));
            self.persist(&mut record)?;
            return Err(e.into());
        }

        record.state = MigrationState::Preparation;
        record.secondary_model = Some(target_model.to_string());
        record.started_at = Some(Utc::now());
        record.progress = MigrationProgress::default();
        record.last_failure_reason = None;
        record.paused = false;
        self.quality.reset();
        self.deferred.lock().unwrap_or_else(|p| p.into_inner()).clear();
        self.persist(&mut record)?;
        info!(target = target_model, "migration started");
        Ok(record.clone())
    }

    /// Advance one state, running the entered state's entry actions.
    pub async fn advance(&self) -> Result<MigrationRecord> {
        let mut record = self.record.lock().await;
        if record.paused {
            return Err(EngineError::Conflict("migration is paused".to_string()));
        }
        let next = record.state.next().ok_or_else(|| EngineError::InvalidTransition {
            from: record.state.as_str().to_string(),
            to: "next".to_string(),
        })?;

        match next {
            MigrationState::Gradual => {
                // Work set: everything still embedded only with the primary.
                let secondary = self
                    .secondary_collection(&record)
                    .ok_or_else(|| EngineError::Internal("no secondary model".into()))?;
                let pending = self.unmigrated_ids(&record.primary_model, &secondary, usize::MAX)?;
                record.progress = MigrationProgress {
                    migrated: 0,
                    total: pending.len(),
                };
            }
            MigrationState::Full => {
                if record.progress.migrated < record.progress.total {
                    return Err(EngineError::Conflict(format!(
                        "gradual incomplete: {}/{} migrated",
                        record.progress.migrated, record.progress.total
                    )));
                }
                let (_, combined, samples) = self.quality.snapshot();
                if samples > 0 && combined < self.config.quality_threshold {
                    return Err(EngineError::Conflict(format!(
                        "quality gate not met: {combined:.3} < {}",
                        self.config.quality_threshold
                    )));
                }
                // Entering FULL flips the read pointer (reads_from_secondary).
            }
            MigrationState::Cleanup => {
                // Drop the old primary, swap models, stop dual writes. The
                // record is only mutated once every fallible step succeeded.
                let old_primary = self.primary_collection(&record);
                let new_primary = record
                    .secondary_model
                    .clone()
                    .ok_or_else(|| EngineError::Internal("no secondary model".into()))?;
                if let Err(e) = self.backend.drop_collection(&old_primary) {
                    drop(record);
                    self.finish_rollback(format!("cleanup_failed: {e}")).await?;
                    return Err(e.into());
                }
                let migrated = self
                    .store
                    .reassign_embedding_model(&record.primary_model, &new_primary)?;
                info!(
                    from = %record.primary_model,
                    to = %new_primary,
                    records = migrated,
                    "embedding model swapped"
                );
                record.primary_model = new_primary;
                record.secondary_model = None;
            }
            _ => {}
        }

        record.state = next;
        self.persist(&mut record)?;
        info!(state = next.as_str(), "migration advanced");
        Ok(record.clone())
    }

    /// Pause the background driver.
    pub async fn pause(&self) -> Result<MigrationRecord> {
        let mut record = self.record.lock().await;
        if !record.state.is_active() {
            return Err(EngineError::InvalidTransition {
                from: record.state.as_str().to_string(),
                to: "pause".to_string(),
            });
        }
        record.paused = true;
        self.persist(&mut record)?;
        Ok(record.clone())
    }

    /// Resume the background driver.
    pub async fn resume(&self) -> Result<MigrationRecord> {
        let mut record = self.record.lock().await;
        if !record.state.is_active() {
            return Err(EngineError::InvalidTransition {
                from: record.state.as_str().to_string(),
                to: "resume".to_string(),
            });
        }
        record.paused = false;
        self.persist(&mut record)?;
        Ok(record.clone())
    }

    /// Roll back the migration: drop the secondary, restore the primary read
    /// pointer, reset to INACTIVE keeping the failure reason.
    pub async fn rollback(&self, reason: &str) -> Result<MigrationRecord> {
        {
            let record = self.record.lock().await;
            if !record.state.is_active() {
                return Err(EngineError::InvalidTransition {
                    from: record.state.as_str().to_string(),
                    to: MigrationState::RollingBack.as_str().to_string(),
                });
            }
        }
        self.finish_rollback(reason.to_string()).await?;
        Ok(self.status().await)
    }

    /// Perform the rollback teardown: stop dual writes, drop the secondary
    /// collection, restore the primary read pointer, reset to INACTIVE.
    async fn finish_rollback(&self, reason: String) -> Result<()> {
        let mut record = self.record.lock().await;
        record.state = MigrationState::RollingBack;
        self.persist(&mut record)?;

        if let Some(secondary) = self.secondary_collection(&record)
            && let Err(e) = self.backend.drop_collection(&secondary)
        {
            warn!("failed to drop secondary collection during rollback: {}", e);
        }

        record.secondary_model = None;
        record.state = MigrationState::Inactive;
        record.progress = MigrationProgress::default();
        record.paused = false;
        record.last_failure_reason = Some(reason.clone());
        self.quality.reset();
        self.deferred.lock().unwrap_or_else(|p| p.into_inner()).clear();
        self.persist(&mut record)?;
        warn!(reason = %reason, "migration rolled back");
        Ok(())
    }

    // ========================================================================
    // PROBES
    // ========================================================================

    /// Feed the probe ring from a real retrieval query.
    pub fn note_query(&self, query: &str) {
        self.probes.push(query);
    }

    /// During CANARY, probe a sampled fraction of retrievals in the
    /// background. Call from the retrieval path; never blocks it.
    pub fn maybe_canary(self: &Arc<Self>, query: &str) {
        let every = (1.0 / self.config.canary_sample_rate.max(0.0001)).round() as u64;
        let n = self.canary_counter.fetch_add(1, Ordering::Relaxed);
        if n % every.max(1) != 0 {
            return;
        }
        let controller = Arc::clone(self);
        let query = query.to_string();
        tokio::spawn(async move {
            let state = controller.record.lock().await.state;
            if state == MigrationState::Canary {
                controller.run_probe(&query).await;
            }
        });
    }

    /// Run one probe query against both collections and record the signal.
    pub async fn run_probe(&self, query: &str) {
        let (primary_target, secondary_target) = {
            let record = self.record.lock().await;
            if !record.state.dual_writes() {
                return;
            }
            let Some(secondary_model) = record.secondary_model.clone() else {
                return;
            };
            (
                WriteTarget {
                    collection: self.primary_collection(&record),
                    model: record.primary_model.clone(),
                },
                WriteTarget {
                    collection: collection_for(&self.collection_base, &secondary_model),
                    model: secondary_model,
                },
            )
        };

        let primary_hits = self.probe_side(&primary_target, query);
        let secondary_hits = self.probe_side(&secondary_target, query);
        let (primary_hits, secondary_hits) = match (primary_hits, secondary_hits) {
            (Ok(p), Ok(s)) => (p, s),
            (p, s) => {
                warn!(
                    "probe failed: primary={:?} secondary={:?}",
                    p.err().map(|e| e.to_string()),
                    s.err().map(|e| e.to_string())
                );
                return;
            }
        };

        let primary = primary_score(&primary_hits);
        let combined = quality_score(&primary_hits, &secondary_hits);
        self.quality.record(primary, combined);
    }

    fn probe_side(&self, target: &WriteTarget, query: &str) -> Result<Vec<(String, f64)>> {
        let provider = self
            .registry
            .get(&target.model)
            .map_err(|e| EngineError::Backend(e.to_string()))?;
        let vector = provider
            .embed(query)
            .map_err(|e| EngineError::Backend(e.to_string()))?;
        let hits = self.backend.search(
            &target.collection,
            &vector,
            PROBE_TOP_K,
            &MemoryFilter::default(),
        )?;
        Ok(hits.into_iter().map(|h| (h.id, h.similarity)).collect())
    }

    // ========================================================================
    // BACKGROUND DRIVER
    // ========================================================================

    /// One driver cycle: enforce gates, and in GRADUAL re-embed a batch and
    /// evaluate probes. Meant to be called periodically by the host loop.
    pub async fn drive(&self) -> Result<MigrationRecord> {
        let (state, paused, started_at) = {
            let record = self.record.lock().await;
            (record.state, record.paused, record.started_at)
        };

        if !state.is_active() {
            return Ok(self.status().await);
        }

        // Time budget gate
        if let Some(started) = started_at {
            let elapsed_hours = (Utc::now() - started).num_seconds() as f64 / 3600.0;
            if elapsed_hours > self.config.max_time_hours {
                self.finish_rollback("time_budget_exceeded".to_string()).await?;
                return Ok(self.status().await);
            }
        }

        // Quality gate over the rolling window
        let (_, combined, samples) = self.quality.snapshot();
        if samples >= self.config.min_probe_samples && combined < self.config.rollback_threshold {
            self.finish_rollback("quality_regression".to_string()).await?;
            return Ok(self.status().await);
        }

        if state == MigrationState::Gradual && !paused {
            self.drive_gradual_batch().await?;
            for query in self.probes.sample(PROBES_PER_CYCLE) {
                self.run_probe(&query).await;
            }
            // Re-check the quality gate with the fresh probes
            let (_, combined, samples) = self.quality.snapshot();
            if samples >= self.config.min_probe_samples && combined < self.config.rollback_threshold {
                self.finish_rollback("quality_regression".to_string()).await?;
            }
        }

        Ok(self.status().await)
    }

    /// Ids still embedded only with the primary model.
    fn unmigrated_ids(
        &self,
        primary_model: &str,
        secondary_collection: &str,
        limit: usize,
    ) -> Result<Vec<String>> {
        let mut pending = Vec::new();
        for id in self.store.ids_embedded_with(primary_model)? {
            if !self.backend.contains(secondary_collection, &id)? {
                pending.push(id);
                if pending.len() >= limit {
                    break;
                }
            }
        }
        Ok(pending)
    }

    /// Re-embed one batch into the secondary collection, with exponential
    /// backoff on failure and deferral after the retry budget is spent.
    async fn drive_gradual_batch(&self) -> Result<()> {
        let (primary_model, secondary_model, secondary_collection) = {
            let record = self.record.lock().await;
            let Some(model) = record.secondary_model.clone() else {
                return Ok(());
            };
            let collection = collection_for(&self.collection_base, &model);
            (record.primary_model.clone(), model, collection)
        };

        let mut batch =
            self.unmigrated_ids(&primary_model, &secondary_collection, self.config.batch_size)?;
        let mut from_deferred = false;
        if batch.is_empty() {
            // Main pass exhausted: retry deferred ids before quality evaluation.
            let mut deferred = self.deferred.lock().unwrap_or_else(|p| p.into_inner());
            while batch.len() < self.config.batch_size {
                match deferred.pop_front() {
                    Some(id) => batch.push(id),
                    None => break,
                }
            }
            from_deferred = !batch.is_empty();
        }
        if batch.is_empty() {
            return Ok(());
        }

        let provider = self
            .registry
            .get(&secondary_model)
            .map_err(|e| EngineError::Backend(e.to_string()))?;

        let mut migrated = 0_usize;
        for id in &batch {
            let Some(memory) = self.store.get(id)? else {
                // Deleted while migrating; nothing to carry over.
                migrated += 1;
                continue;
            };
            let text = project(&memory.content);
            let payload = VectorPayload {
                memory_type: memory.memory_type,
                tier: memory.tier,
                tags: memory.tags.clone(),
                created_at: memory.created_at,
            };

            let mut ok = false;
            for (attempt, backoff) in BATCH_BACKOFF_MS.iter().enumerate() {
                let result = provider
                    .embed(&text)
                    .map_err(|e| EngineError::Backend(e.to_string()))
                    .and_then(|vector| {
                        self.backend
                            .upsert(&secondary_collection, id, &vector, payload.clone())
                            .map_err(EngineError::from)
                    });
                match result {
                    Ok(()) => {
                        ok = true;
                        break;
                    }
                    Err(e) if e.is_transient() && attempt + 1 < BATCH_BACKOFF_MS.len() => {
                        warn!(id = %id, attempt, "re-embed failed, backing off: {}", e);
                        tokio::time::sleep(std::time::Duration::from_millis(*backoff)).await;
                    }
                    Err(e) => {
                        warn!(id = %id, "re-embed abandoned, deferring: {}", e);
                        break;
                    }
                }
            }
            if ok {
                migrated += 1;
            } else if !from_deferred {
                self.deferred
                    .lock()
                    .unwrap_or_else(|p| p.into_inner())
                    .push_back(id.clone());
            }
        }

        let mut record = self.record.lock().await;
        record.progress.migrated = (record.progress.migrated + migrated).min(record.progress.total);
        self.persist(&mut record)?;
        Ok(())
    }

    /// Deferred ids still waiting for a retry.
    pub fn deferred_count(&self) -> usize {
        self.deferred.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    /// Seed the quality window directly (host integrations and tests).
    pub fn record_probe_scores(&self, primary: f64, combined: f64) {
        self.quality.record(primary, combined);
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::embeddings::{EmbeddingError, EmbeddingProvider};
    use crate::memory::{FactContent, Memory, MemoryContent, MemoryType};
    use crate::persistence::HnswBackend;
    use tempfile::TempDir;

    struct SeededProvider {
        model: String,
        dims: usize,
        seed: f32,
    }

    impl EmbeddingProvider for SeededProvider {
        fn model(&self) -> &str {
            &self.model
        }
        fn dimensions(&self) -> usize {
            self.dims
        }
        fn embed(&self, text: &str) -> std::result::Result<Vec<f32>, EmbeddingError> {
            // Deterministic pseudo-embedding from text bytes
            let mut v: Vec<f32> = (0..self.dims)
                .map(|i| {
                    let byte = text.as_bytes().get(i % text.len().max(1)).copied().unwrap_or(1);
                    ((byte as f32) * (i as f32 + self.seed)).sin()
                })
                .collect();
            crate::embeddings::l2_normalize(&mut v);
            Ok(v)
        }
    }

    struct Fixture {
        controller: Arc<MigrationController>,
        store: Arc<MemoryStore>,
        backend: Arc<HnswBackend>,
        _dir: TempDir,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::open(&dir.path().join("test.db")).unwrap());
        let backend = Arc::new(HnswBackend::new());
        let registry = Arc::new(EmbeddingRegistry::new());
        registry.register(Arc::new(SeededProvider {
            model: "m1".into(),
            dims: 8,
            seed: 1.0,
        }));
        registry.register(Arc::new(SeededProvider {
            model: "m2".into(),
            dims: 16,
            seed: 2.0,
        }));

        backend
            .create_collection(&collection_for("memories", "m1"), 8)
            .unwrap();

        let config = EngineConfig::default();
        let sidecar = MigrationSidecar::new(dir.path());
        let initial = sidecar.load("m1").unwrap();
        let controller = Arc::new(MigrationController::new(
            config.migration.clone(),
            "memories",
            sidecar,
            initial,
            store.clone(),
            backend.clone() as Arc<dyn VectorBackend>,
            registry,
        ));
        Fixture {
            controller,
            store,
            backend,
            _dir: dir,
        }
    }

    fn seed_memory(fixture: &Fixture, statement: &str) -> Memory {
        let mut m = Memory::new(
            MemoryType::Fact,
            MemoryContent::Fact(FactContent {
                statement: statement.into(),
                confidence: None,
            }),
            0.5,
        );
        m.embedding_ref = Some(m.id.clone());
        m.embedding_model = Some("m1".to_string());
        let vector = SeededProvider {
            model: "m1".into(),
            dims: 8,
            seed: 1.0,
        }
        .embed(statement)
        .unwrap();
        fixture
            .backend
            .upsert(
                &collection_for("memories", "m1"),
                &m.id,
                &vector,
                VectorPayload {
                    memory_type: m.memory_type,
                    tier: m.tier,
                    tags: vec![],
                    created_at: m.created_at,
                },
            )
            .unwrap();
        fixture.store.insert_record(&m).unwrap();
        m
    }

    #[tokio::test]
    async fn test_start_requires_known_model() {
        let f = fixture();
        let err = f.controller.start("m404").await;
        assert!(matches!(err, Err(EngineError::InvalidArguments(_))));
    }

    #[tokio::test]
    async fn test_start_twice_is_invalid_transition() {
        let f = fixture();
        f.controller.start("m2").await.unwrap();
        let err = f.controller.start("m2").await;
        assert!(matches!(err, Err(EngineError::InvalidTransition { .. })));
    }

    #[tokio::test]
    async fn test_advance_from_inactive_rejected() {
        let f = fixture();
        let err = f.controller.advance().await;
        assert!(matches!(err, Err(EngineError::InvalidTransition { .. })));
    }

    #[tokio::test]
    async fn test_full_walk_to_completed() {
        let f = fixture();
        for i in 0..5 {
            seed_memory(&f, &format!("fact number {i} about the world"));
        }

        let record = f.controller.start("m2").await.unwrap();
        assert_eq!(record.state, MigrationState::Preparation);
        assert!(f.backend.has_collection(&collection_for("memories", "m2")));

        assert_eq!(f.controller.advance().await.unwrap().state, MigrationState::Shadow);
        assert_eq!(f.controller.advance().await.unwrap().state, MigrationState::Canary);
        let record = f.controller.advance().await.unwrap();
        assert_eq!(record.state, MigrationState::Gradual);
        assert_eq!(record.progress.total, 5);

        // Gradual blocks FULL until everything migrated
        let err = f.controller.advance().await;
        assert!(matches!(err, Err(EngineError::Conflict(_))));

        let record = f.controller.drive().await.unwrap();
        assert_eq!(record.progress.migrated, 5);

        let record = f.controller.advance().await.unwrap();
        assert_eq!(record.state, MigrationState::Full);

        // Reads now come from the secondary collection
        let target = f.controller.read_target().await;
        assert_eq!(target.model, "m2");

        let record = f.controller.advance().await.unwrap();
        assert_eq!(record.state, MigrationState::Cleanup);
        assert!(!f.backend.has_collection(&collection_for("memories", "m1")));
        assert_eq!(record.primary_model, "m2");

        let record = f.controller.advance().await.unwrap();
        assert_eq!(record.state, MigrationState::Completed);

        // Records were re-stamped with the new model
        let ids = f.store.ids_embedded_with("m2").unwrap();
        assert_eq!(ids.len(), 5);

        // And a new migration (back to m1) can start again from COMPLETED
        let record = f.controller.start("m1").await.unwrap();
        assert_eq!(record.state, MigrationState::Preparation);
    }

    #[tokio::test]
    async fn test_dual_writes_during_shadow() {
        let f = fixture();
        f.controller.start("m2").await.unwrap();
        f.controller.advance().await.unwrap(); // Shadow

        let plan = f.controller.write_plan().await;
        assert_eq!(plan.primary.model, "m1");
        assert_eq!(plan.secondary.as_ref().unwrap().model, "m2");
        assert_eq!(plan.targets().len(), 2);
    }

    #[tokio::test]
    async fn test_quality_regression_rolls_back() {
        let f = fixture();
        seed_memory(&f, "a lone fact");
        f.controller.start("m2").await.unwrap();
        f.controller.advance().await.unwrap(); // Shadow
        f.controller.advance().await.unwrap(); // Canary
        f.controller.advance().await.unwrap(); // Gradual

        // 50 terrible probes
        for _ in 0..50 {
            f.controller.record_probe_scores(0.9, 0.1);
        }
        let record = f.controller.drive().await.unwrap();
        assert_eq!(record.state, MigrationState::Inactive);
        assert_eq!(record.last_failure_reason.as_deref(), Some("quality_regression"));
        assert!(!f.backend.has_collection(&collection_for("memories", "m2")));
        // Reads restored to primary
        assert_eq!(f.controller.read_target().await.model, "m1");
    }

    #[tokio::test]
    async fn test_manual_rollback_from_inactive_rejected() {
        let f = fixture();
        let err = f.controller.rollback("manual").await;
        assert!(matches!(err, Err(EngineError::InvalidTransition { .. })));
    }

    #[tokio::test]
    async fn test_pause_blocks_advance() {
        let f = fixture();
        f.controller.start("m2").await.unwrap();
        f.controller.pause().await.unwrap();
        let err = f.controller.advance().await;
        assert!(matches!(err, Err(EngineError::Conflict(_))));
        f.controller.resume().await.unwrap();
        assert_eq!(f.controller.advance().await.unwrap().state, MigrationState::Shadow);
    }

    #[test]
    fn test_collection_naming_is_stable() {
        assert_eq!(collection_for("memories", "m1"), "memories__m1");
        assert_eq!(
            collection_for("memories", "nomic-ai/nomic-embed-text-v1.5"),
            "memories__nomic-ai-nomic-embed-text-v1-5"
        );
    }
}
