//! Hybrid retrieval scoring
//!
//! Fuses vector and lexical results with Reciprocal Rank Fusion, then
//! re-weights with recency and importance:
//!
//! 1. Min-max normalize each source's scores to [0, 1]
//! 2. RRF: `score(id) = sum over sources of 1 / (60 + rank)`
//! 3. Normalize the fused score by the attainable maximum for the number of
//!    contributing sources, so a top-ranked-everywhere id scores 1.0 and the
//!    semantic threshold operates on a stable scale
//! 4. `final = w_s * fused + w_r * recency + w_i * importance` with
//!    `recency = exp(-idle_days / 30)`

use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// RRF dampening constant.
pub const RRF_K: f64 = 60.0;

/// Recency half-life scale in days.
const RECENCY_SCALE_DAYS: f64 = 30.0;

/// One fused candidate before re-weighting.
#[derive(Debug, Clone)]
pub struct FusedHit {
    /// Memory id
    pub id: String,
    /// Normalized RRF score in [0, 1]
    pub fused: f64,
    /// Min-max normalized vector similarity, if the vector source matched
    pub vector_score: Option<f64>,
    /// Min-max normalized lexical score, if the lexical source matched
    pub lexical_score: Option<f64>,
}

/// Min-max normalize scores over the returned set. A lone result (or a set
/// of ties) normalizes to 1.0.
pub fn min_max_normalize(results: &[(String, f64)]) -> Vec<(String, f64)> {
    if results.is_empty() {
        return Vec::new();
    }
    let min = results.iter().map(|(_, s)| *s).fold(f64::INFINITY, f64::min);
    let max = results
        .iter()
        .map(|(_, s)| *s)
        .fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;
    results
        .iter()
        .map(|(id, s)| {
            let normalized = if range > 0.0 { (s - min) / range } else { 1.0 };
            (id.clone(), normalized)
        })
        .collect()
}

/// Fuse vector and lexical result lists with normalized RRF.
///
/// Inputs must be ordered best-first (they come from the backends that way).
/// Output is ordered by fused score descending.
pub fn fuse(vector: &[(String, f64)], lexical: &[(String, f64)]) -> Vec<FusedHit> {
    let sources = [vector, lexical];
    let active_sources = sources.iter().filter(|s| !s.is_empty()).count().max(1);
    // Best attainable: rank 0 in every active source.
    let max_attainable = active_sources as f64 / RRF_K;

    let mut fused: HashMap<String, f64> = HashMap::new();
    for source in sources {
        for (rank, (id, _)) in source.iter().enumerate() {
            *fused.entry(id.clone()).or_default() += 1.0 / (RRF_K + rank as f64);
        }
    }

    let vector_scores: HashMap<&str, f64> =
        vector.iter().map(|(id, s)| (id.as_str(), *s)).collect();
    let lexical_scores: HashMap<&str, f64> =
        lexical.iter().map(|(id, s)| (id.as_str(), *s)).collect();

    let mut hits: Vec<FusedHit> = fused
        .into_iter()
        .map(|(id, score)| {
            let vector_score = vector_scores.get(id.as_str()).copied();
            let lexical_score = lexical_scores.get(id.as_str()).copied();
            FusedHit {
                fused: (score / max_attainable).min(1.0),
                vector_score,
                lexical_score,
                id,
            }
        })
        .collect();

    hits.sort_by(|a, b| {
        b.fused
            .partial_cmp(&a.fused)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
    hits
}

/// Recency term: `exp(-idle_days / 30)`.
pub fn recency_score(last_accessed_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let idle_days = (now - last_accessed_at).num_milliseconds().max(0) as f64 / 86_400_000.0;
    (-idle_days / RECENCY_SCALE_DAYS).exp()
}

/// Re-weighting parameters.
#[derive(Debug, Clone, Copy)]
pub struct RetrievalWeights {
    /// Weight of the fused hybrid score
    pub semantic: f64,
    /// Weight of the recency term
    pub recency: f64,
    /// Weight of the importance term
    pub importance: f64,
}

impl Default for RetrievalWeights {
    fn default() -> Self {
        Self {
            semantic: 0.6,
            recency: 0.2,
            importance: 0.2,
        }
    }
}

impl RetrievalWeights {
    /// Final score for one candidate.
    pub fn score(&self, fused: f64, recency: f64, importance: f64) -> f64 {
        self.semantic * fused + self.recency * recency + self.importance * importance
    }
}

// ============================================================================
// TESTS
// ============================================================================
