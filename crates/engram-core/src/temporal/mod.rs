//! Temporal domain
//!
//! Age-aware importance decay, tier promotion/demotion, capacity enforcement,
//! and archived-tier retention. The policy here is pure; the engine applies
//! its decisions through the persistence layer on each background cycle.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{EngineConfig, TierConfig};
use crate::memory::{Memory, MemoryTier};

/// Window within which an access promotes a memory one tier.
const PROMOTION_WINDOW_HOURS: i64 = 6;

/// Minimum age before a short-term memory can demote.
const MIN_DEMOTION_AGE_DAYS: f64 = 1.0;

// ============================================================================
// POLICY
// ============================================================================

/// What the temporal cycle decided for one memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TierAction {
    /// Leave the memory where it is
    Stay,
    /// Move one step toward archived
    Demote(MemoryTier),
    /// Move one step toward short_term
    Promote(MemoryTier),
}

/// Pure tier/decay policy derived from config.
#[derive(Debug, Clone)]
pub struct TemporalPolicy {
    decay_rate: f64,
    importance_floor: f64,
    tiers: TierConfig,
}

impl TemporalPolicy {
    /// Build the policy from engine config.
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            decay_rate: config.decay_rate,
            importance_floor: config.importance_floor,
            tiers: config.tiers.clone(),
        }
    }

    /// Apply exponential decay over `elapsed_days`:
    /// `importance <- max(floor, importance * exp(-lambda * dt))`.
    pub fn decayed_importance(&self, importance: f64, elapsed_days: f64) -> f64 {
        if elapsed_days <= 0.0 {
            return importance;
        }
        (importance * (-self.decay_rate * elapsed_days).exp()).max(self.importance_floor)
    }

    /// Evaluate the tier transition policy for one memory after decay.
    pub fn evaluate(&self, memory: &Memory, now: DateTime<Utc>) -> TierAction {
        // Recent access promotes one level (never past short_term).
        if memory.tier != MemoryTier::ShortTerm
            && now - memory.last_accessed_at < Duration::hours(PROMOTION_WINDOW_HOURS)
        {
            if let Some(up) = memory.tier.promoted() {
                return TierAction::Promote(up);
            }
        }

        match memory.tier {
            MemoryTier::ShortTerm => {
                if memory.importance < self.tiers.short_term_threshold
                    && memory.age_days(now) > MIN_DEMOTION_AGE_DAYS
                {
                    TierAction::Demote(MemoryTier::LongTerm)
                } else {
                    TierAction::Stay
                }
            }
            MemoryTier::LongTerm => {
                // No access during the whole archival window
                if memory.idle_days(now) > self.tiers.archival_threshold_days {
                    TierAction::Demote(MemoryTier::Archived)
                } else {
                    TierAction::Stay
                }
            }
            MemoryTier::Archived => TierAction::Stay,
        }
    }

    /// Ids to demote from an over-capacity tier: lowest importance first,
    /// ties broken by oldest last access. `members` need not be sorted.
    pub fn overflow_victims(&self, tier: MemoryTier, members: &[Memory]) -> Vec<String> {
        let max = match tier {
            MemoryTier::ShortTerm => self.tiers.max_short_term,
            MemoryTier::LongTerm => self.tiers.max_long_term,
            MemoryTier::Archived => return Vec::new(),
        };
        if members.len() <= max {
            return Vec::new();
        }

        let mut ordered: Vec<&Memory> = members.iter().collect();
        ordered.sort_by(|a, b| {
            a.importance
                .partial_cmp(&b.importance)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.last_accessed_at.cmp(&b.last_accessed_at))
        });
        ordered
            .into_iter()
            .take(members.len() - max)
            .map(|m| m.id.clone())
            .collect()
    }

    /// Whether an archived memory has outlived its retention window.
    pub fn is_expired(&self, memory: &Memory, now: DateTime<Utc>) -> bool {
        if memory.tier != MemoryTier::Archived || self.tiers.retention_max_age_days <= 0.0 {
            return false;
        }
        memory.idle_days(now) > self.tiers.retention_max_age_days
    }
}

// ============================================================================
// CYCLE RESULT
// ============================================================================

/// Outcome of one temporal cycle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemporalCycleResult {
    /// Memories whose importance changed through decay
    pub decayed: i64,
    /// Demotions applied (policy + capacity)
    pub demoted: i64,
    /// Promotions applied
    pub promoted: i64,
    /// Archived memories expired by retention
    pub expired: i64,
    /// Cycle duration in milliseconds
    pub duration_ms: i64,
}

// ============================================================================
// TESTS
// ============================================================================
