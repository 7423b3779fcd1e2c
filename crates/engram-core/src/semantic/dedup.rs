//! Fact/entity dedup
//!
//! Before a `fact` or `entity` is stored, a tight vector probe looks for an
//! existing near-duplicate of the same type. On a hit the incoming record is
//! merged into the existing one rather than stored. This is the only path by
//! which `store` returns a pre-existing id.

use chrono::Utc;

use crate::memory::{Memory, MemoryType};

/// Whether this type participates in dedup at all.
pub fn dedup_applies(memory_type: MemoryType) -> bool {
    matches!(memory_type, MemoryType::Fact | MemoryType::Entity)
}

/// Whether a probe hit is close enough to merge.
pub fn should_merge(similarity: f64, threshold: f64) -> bool {
    similarity >= threshold
}

/// Merge an incoming record's provenance into an existing near-duplicate:
/// tags are unioned, sources are unioned (semicolon-joined), importance takes
/// the max, and `updated_at` is bumped. Content and id stay as they were.
pub fn merge_into(existing: &mut Memory, tags: &[String], source: Option<&str>, importance: f64) {
    existing.merge_tags(tags);
    if let Some(incoming) = source {
        match &existing.source {
            None => existing.source = Some(incoming.to_string()),
            Some(current) if !current.split("; ").any(|s| s == incoming) => {
                existing.source = Some(format!("{current}; {incoming}"));
            }
            Some(_) => {}
        }
    }
    existing.importance = existing.importance.max(importance);
    existing.clamp_importance();
    existing.updated_at = Utc::now();
}

// ============================================================================
// TESTS
// ============================================================================
