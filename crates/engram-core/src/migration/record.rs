//! Migration record and sidecar persistence
//!
//! The migration record is a singleton describing the current (or last)
//! embedding-model migration. It is persisted to a JSON sidecar with
//! write-temp + atomic rename on every state transition, so a crash never
//! leaves a half-written record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{EngineError, Result};

/// Sidecar file name inside the data directory.
pub const SIDECAR_FILE: &str = "migration.json";

// ============================================================================
// STATES
// ============================================================================

/// Migration state machine states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MigrationState {
    /// No migration in progress
    #[default]
    Inactive,
    /// Secondary collection being created and verified
    Preparation,
    /// Dual writes active; reads still from primary
    Shadow,
    /// Sampled retrievals probed against the secondary
    Canary,
    /// Existing memories re-embedded in batches
    Gradual,
    /// Reads flipped to the secondary; dual writes continue
    Full,
    /// Old primary dropped; models swapped
    Cleanup,
    /// Migration finished; start() accepted again
    Completed,
    /// Tearing down after a gate trip or failure
    RollingBack,
}

impl MigrationState {
    /// Wire name of the state.
    pub fn as_str(&self) -> &'static str {
        match self {
            MigrationState::Inactive => "INACTIVE",
            MigrationState::Preparation => "PREPARATION",
            MigrationState::Shadow => "SHADOW",
            MigrationState::Canary => "CANARY",
            MigrationState::Gradual => "GRADUAL",
            MigrationState::Full => "FULL",
            MigrationState::Cleanup => "CLEANUP",
            MigrationState::Completed => "COMPLETED",
            MigrationState::RollingBack => "ROLLING_BACK",
        }
    }

    /// The state `advance()` moves to, when allowed.
    pub fn next(&self) -> Option<MigrationState> {
        match self {
            MigrationState::Preparation => Some(MigrationState::Shadow),
            MigrationState::Shadow => Some(MigrationState::Canary),
            MigrationState::Canary => Some(MigrationState::Gradual),
            MigrationState::Gradual => Some(MigrationState::Full),
            MigrationState::Full => Some(MigrationState::Cleanup),
            MigrationState::Cleanup => Some(MigrationState::Completed),
            _ => None,
        }
    }

    /// Whether a migration is underway (rollback is reachable).
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            MigrationState::Preparation
                | MigrationState::Shadow
                | MigrationState::Canary
                | MigrationState::Gradual
                | MigrationState::Full
                | MigrationState::Cleanup
        )
    }

    /// Whether writes go to both collections in this state.
    pub fn dual_writes(&self) -> bool {
        matches!(
            self,
            MigrationState::Shadow
                | MigrationState::Canary
                | MigrationState::Gradual
                | MigrationState::Full
        )
    }

    /// Whether reads are served from the secondary collection.
    pub fn reads_from_secondary(&self) -> bool {
        matches!(
            self,
            MigrationState::Full | MigrationState::Cleanup | MigrationState::Completed
        )
    }
}

impl std::fmt::Display for MigrationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// RECORD
// ============================================================================

/// Re-embedding progress during GRADUAL.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationProgress {
    /// Ids re-embedded into the secondary collection
    pub migrated: usize,
    /// Total ids to migrate
    pub total: usize,
}

/// Rolling quality snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualitySnapshot {
    /// Mean primary-side score over the window
    pub primary_score: f64,
    /// Mean combined quality signal over the window
    pub secondary_score: f64,
    /// Probes in the window
    pub samples: usize,
}

/// The singleton migration record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationRecord {
    /// Current state
    pub state: MigrationState,
    /// Active model (reads + primary writes)
    pub primary_model: String,
    /// Target model while a migration is underway
    pub secondary_model: Option<String>,
    /// When the migration started
    pub started_at: Option<DateTime<Utc>>,
    /// GRADUAL progress
    pub progress: MigrationProgress,
    /// Rolling quality
    pub quality: QualitySnapshot,
    /// Last persisted checkpoint
    pub last_checkpoint: Option<DateTime<Utc>>,
    /// Why the last migration rolled back, if it did
    pub last_failure_reason: Option<String>,
    /// Whether the driver is paused
    pub paused: bool,
}

// ============================================================================
// SIDECAR
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SidecarFile {
    engine_version: String,
    migration: MigrationRecord,
}

/// Atomic JSON sidecar for the migration record.
pub struct MigrationSidecar {
    path: PathBuf,
}

impl MigrationSidecar {
    /// Sidecar in the given data directory.
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(SIDECAR_FILE),
        }
    }

    /// Load the persisted record; a missing file yields the default record
    /// with the given primary model.
    pub fn load(&self, default_primary_model: &str) -> Result<MigrationRecord> {
        if !self.path.exists() {
            return Ok(MigrationRecord {
                primary_model: default_primary_model.to_string(),
                ..Default::default()
            });
        }
        let raw = std::fs::read_to_string(&self.path)?;
        let file: SidecarFile = serde_json::from_str(&raw)
            .map_err(|e| EngineError::Internal(format!("corrupt migration sidecar: {e}")))?;
        Ok(file.migration)
    }

    /// Persist the record atomically (write-temp + rename).
    pub fn save(&self, record: &MigrationRecord) -> Result<()> {
        let file = SidecarFile {
            engine_version: crate::VERSION.to_string(),
            migration: record.clone(),
        };
        let json = serde_json::to_string_pretty(&file)
            .map_err(|e| EngineError::Internal(format!("serialize migration record: {e}")))?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_state_graph_walk() {
        let mut state = MigrationState::Preparation;
        let expected = [
            MigrationState::Shadow,
            MigrationState::Canary,
            MigrationState::Gradual,
            MigrationState::Full,
            MigrationState::Cleanup,
            MigrationState::Completed,
        ];
        for next in expected {
            state = state.next().unwrap();
            assert_eq!(state, next);
        }
        assert!(state.next().is_none());
        assert!(MigrationState::Inactive.next().is_none());
        assert!(MigrationState::RollingBack.next().is_none());
    }

    #[test]
    fn test_dual_write_and_read_flags() {
        assert!(!MigrationState::Preparation.dual_writes());
        assert!(MigrationState::Shadow.dual_writes());
        assert!(MigrationState::Full.dual_writes());
        assert!(!MigrationState::Cleanup.dual_writes());

        assert!(!MigrationState::Gradual.reads_from_secondary());
        assert!(MigrationState::Full.reads_from_secondary());
    }

    #[test]
    fn test_wire_names() {
        assert_eq!(MigrationState::RollingBack.as_str(), "ROLLING_BACK");
        let json = serde_json::to_string(&MigrationState::RollingBack).unwrap();
        assert_eq!(json, "\"ROLLING_BACK\"");
    }

    #[test]
    fn test_sidecar_roundtrip() {
        let dir = TempDir::new().unwrap();
        let sidecar = MigrationSidecar::new(dir.path());

        // Missing file -> default record with the configured primary
        let record = sidecar.load("m1").unwrap();
        assert_eq!(record.state, MigrationState::Inactive);
        assert_eq!(record.primary_model, "m1");

        let mut record = record;
        record.state = MigrationState::Shadow;
        record.secondary_model = Some("m2".into());
        sidecar.save(&record).unwrap();

        let reloaded = sidecar.load("ignored").unwrap();
        assert_eq!(reloaded.state, MigrationState::Shadow);
        assert_eq!(reloaded.secondary_model.as_deref(), Some("m2"));
        // No stray temp file left behind
        assert!(!dir.path().join("migration.json.tmp").exists());
    }
}
