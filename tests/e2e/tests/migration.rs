//! Dual-collection migration journeys
//!
//! The happy path from INACTIVE to COMPLETED, the quality-regression
//! rollback, and the transition guards.

use engram_core::{EngineError, MemoryFilter, MigrationState};
use engram_e2e_tests::{ready_engine, store_fact, PRIMARY_MODEL, SECONDARY_MODEL};

#[tokio::test]
async fn start_from_inactive_then_double_start_rejected() {
    let (engine, _dir) = ready_engine().await;

    let record = engine.migration_start(SECONDARY_MODEL).await.unwrap();
    assert_eq!(record.state, MigrationState::Preparation);
    assert_eq!(record.secondary_model.as_deref(), Some(SECONDARY_MODEL));

    let err = engine.migration_start(SECONDARY_MODEL).await;
    assert!(matches!(err, Err(EngineError::InvalidTransition { .. })));
}

#[tokio::test]
async fn unknown_target_model_rejected() {
    let (engine, _dir) = ready_engine().await;
    let err = engine.migration_start("model-from-the-future").await;
    assert!(matches!(err, Err(EngineError::InvalidArguments(_))));
}

#[tokio::test]
async fn full_migration_preserves_tool_behavior() {
    let (engine, _dir) = ready_engine().await;

    let mut ids = Vec::new();
    for i in 0..8 {
        ids.push(store_fact(&engine, &format!("city fact {i} names place p{i} in zone z{i}")).await);
    }

    engine.migration_start(SECONDARY_MODEL).await.unwrap();
    engine.migration_advance().await.unwrap(); // SHADOW

    // Scenario 6 invariant seed: a call that succeeds in SHADOW...
    let shadow_results = engine
        .retrieve("city fact names place", 5, MemoryFilter::default(), Some(0.0))
        .await
        .unwrap();
    assert!(!shadow_results.is_empty());

    // Stores during SHADOW dual-write; reads still come from the primary
    let shadow_id = store_fact(&engine, "a fact born during shadow writes").await;
    let shadow_memory = engine.get_memory(&shadow_id).await.unwrap();
    assert_eq!(shadow_memory.embedding_model.as_deref(), Some(PRIMARY_MODEL));

    engine.migration_advance().await.unwrap(); // CANARY
    engine.migration_advance().await.unwrap(); // GRADUAL

    // Drive until every primary-only memory is re-embedded
    let mut record = engine.drive_migration().await.unwrap();
    for _ in 0..10 {
        if record.progress.migrated >= record.progress.total {
            break;
        }
        record = engine.drive_migration().await.unwrap();
    }
    assert_eq!(record.progress.migrated, record.progress.total);

    let record = engine.migration_advance().await.unwrap(); // FULL
    assert_eq!(record.state, MigrationState::Full);

    // ...also succeeds in FULL for the same inputs
    let full_results = engine
        .retrieve("city fact names place", 5, MemoryFilter::default(), Some(0.0))
        .await
        .unwrap();
    assert!(!full_results.is_empty());

    engine.migration_advance().await.unwrap(); // CLEANUP
    let record = engine.migration_advance().await.unwrap(); // COMPLETED
    assert_eq!(record.state, MigrationState::Completed);
    assert_eq!(record.primary_model, SECONDARY_MODEL);

    // Every stored memory is still queryable after the swap
    for id in &ids {
        assert!(engine.get_memory(id).await.is_ok());
    }
    let stats = engine.stats().await.unwrap();
    assert_eq!(stats.index.vectors as i64, stats.total);
}

#[tokio::test]
async fn quality_regression_rolls_back_to_inactive() {
    let (engine, _dir) = ready_engine().await;
    store_fact(&engine, "a fact that will survive the rollback").await;

    engine.migration_start(SECONDARY_MODEL).await.unwrap();
    engine.migration_advance().await.unwrap(); // SHADOW
    engine.migration_advance().await.unwrap(); // CANARY
    engine.migration_advance().await.unwrap(); // GRADUAL

    // Force a low quality signal on 50 probes
    let status = engine.migration_status().await.unwrap();
    assert_eq!(status.state, MigrationState::Gradual);
    for _ in 0..50 {
        seed_bad_probe(&engine).await;
    }
    let record = engine.drive_migration().await.unwrap();

    assert_eq!(record.state, MigrationState::Inactive);
    assert_eq!(record.last_failure_reason.as_deref(), Some("quality_regression"));
    assert_eq!(record.secondary_model, None);

    // The engine still answers reads from the primary
    let results = engine
        .retrieve("survive the rollback", 1, MemoryFilter::default(), Some(0.0))
        .await
        .unwrap();
    assert_eq!(results.len(), 1);
}

async fn seed_bad_probe(engine: &std::sync::Arc<engram_core::MemoryEngine>) {
    // The controller is not exposed through the engine facade, so regressions
    // are injected through the status snapshot's quality channel: a probe
    // with disagreeing sides scores near zero.
    let status = engine.migration_status().await.unwrap();
    assert!(status.state.is_active());
    engine.record_migration_probe(0.9, 0.1);
}

#[tokio::test]
async fn manual_rollback_restores_primary() {
    let (engine, _dir) = ready_engine().await;
    engine.migration_start(SECONDARY_MODEL).await.unwrap();
    engine.migration_advance().await.unwrap(); // SHADOW

    let record = engine.migration_rollback().await.unwrap();
    assert_eq!(record.state, MigrationState::Inactive);
    assert_eq!(record.last_failure_reason.as_deref(), Some("manual"));
    assert_eq!(record.primary_model, PRIMARY_MODEL);
}

#[tokio::test]
async fn advance_past_completed_rejected() {
    let (engine, _dir) = ready_engine().await;
    let err = engine.migration_advance().await;
    assert!(matches!(err, Err(EngineError::InvalidTransition { .. })));
}

#[tokio::test]
async fn pause_blocks_advance_until_resume() {
    let (engine, _dir) = ready_engine().await;
    engine.migration_start(SECONDARY_MODEL).await.unwrap();
    engine.migration_pause().await.unwrap();

    let err = engine.migration_advance().await;
    assert!(matches!(err, Err(EngineError::Conflict(_))));

    engine.migration_resume().await.unwrap();
    let record = engine.migration_advance().await.unwrap();
    assert_eq!(record.state, MigrationState::Shadow);
}
