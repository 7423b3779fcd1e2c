//! Migration quality signal
//!
//! Probe queries accumulate at runtime from real retrieval calls. For each
//! probe, the primary and secondary collections answer top-10 vector
//! searches; the signal blends the rank-normalized overlap of the two id
//! sets with the mean cosine of the secondary's hits against the query. Both
//! halves live in [0, 1], so the combined score does too.

use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;

/// How many ids each side contributes to the overlap.
pub const PROBE_TOP_K: usize = 10;

/// Probe query ring capacity.
const PROBE_RING_CAPACITY: usize = 256;

// ============================================================================
// SIGNAL
// ============================================================================

/// Combined quality score for one probe.
///
/// `primary` / `secondary` are (id, similarity) lists, best-first, as
/// returned by the two collections.
pub fn quality_score(primary: &[(String, f64)], secondary: &[(String, f64)]) -> f64 {
    if primary.is_empty() && secondary.is_empty() {
        // Nothing indexed on either side: vacuously in agreement.
        return 1.0;
    }

    let primary_top: HashSet<&str> = primary
        .iter()
        .take(PROBE_TOP_K)
        .map(|(id, _)| id.as_str())
        .collect();
    let secondary_top: HashSet<&str> = secondary
        .iter()
        .take(PROBE_TOP_K)
        .map(|(id, _)| id.as_str())
        .collect();

    let denom = primary_top.len().max(secondary_top.len()).max(1);
    let overlap = primary_top.intersection(&secondary_top).count() as f64 / denom as f64;

    let mean_cosine = if secondary.is_empty() {
        0.0
    } else {
        let sum: f64 = secondary
            .iter()
            .take(PROBE_TOP_K)
            .map(|(_, s)| s.clamp(0.0, 1.0))
            .sum();
        sum / secondary.len().min(PROBE_TOP_K) as f64
    };

    (0.5 * overlap + 0.5 * mean_cosine).clamp(0.0, 1.0)
}

/// Mean primary-side similarity, reported alongside the combined signal.
pub fn primary_score(primary: &[(String, f64)]) -> f64 {
    if primary.is_empty() {
        return 0.0;
    }
    let sum: f64 = primary
        .iter()
        .take(PROBE_TOP_K)
        .map(|(_, s)| s.clamp(0.0, 1.0))
        .sum();
    sum / primary.len().min(PROBE_TOP_K) as f64
}

// ============================================================================
// PROBE RING
// ============================================================================

/// Bounded ring of recent real queries, used as probes during GRADUAL.
#[derive(Default)]
pub struct ProbeRing {
    queries: Mutex<VecDeque<String>>,
}

impl ProbeRing {
    /// Create an empty ring.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a real retrieval query.
    pub fn push(&self, query: &str) {
        let query = query.trim();
        if query.is_empty() {
            return;
        }
        let mut ring = self.queries.lock().unwrap_or_else(|p| p.into_inner());
        if ring.back().map(|q| q.as_str()) == Some(query) {
            return;
        }
        while ring.len() >= PROBE_RING_CAPACITY {
            ring.pop_front();
        }
        ring.push_back(query.to_string());
    }

    /// Up to `n` recent probe queries, newest first.
    pub fn sample(&self, n: usize) -> Vec<String> {
        let ring = self.queries.lock().unwrap_or_else(|p| p.into_inner());
        ring.iter().rev().take(n).cloned().collect()
    }

    /// Queries currently buffered.
    pub fn len(&self) -> usize {
        self.queries.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    /// Whether the ring is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ============================================================================
// ROLLING TRACKER
// ============================================================================

/// Rolling window over probe scores; the gates read its mean.
pub struct QualityTracker {
    window: Mutex<VecDeque<(f64, f64)>>,
    capacity: usize,
}

impl QualityTracker {
    /// Track the last `capacity` probes.
    pub fn new(capacity: usize) -> Self {
        Self {
            window: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity: capacity.max(1),
        }
    }

    /// Record one probe's (primary, combined) scores.
    pub fn record(&self, primary: f64, combined: f64) {
        let mut window = self.window.lock().unwrap_or_else(|p| p.into_inner());
        while window.len() >= self.capacity {
            window.pop_front();
        }
        window.push_back((primary, combined));
    }

    /// (mean primary, mean combined, samples) over the window.
    pub fn snapshot(&self) -> (f64, f64, usize) {
        let window = self.window.lock().unwrap_or_else(|p| p.into_inner());
        let n = window.len();
        if n == 0 {
            return (0.0, 0.0, 0);
        }
        let (sum_p, sum_c) = window
            .iter()
            .fold((0.0, 0.0), |(p, c), (wp, wc)| (p + wp, c + wc));
        (sum_p / n as f64, sum_c / n as f64, n)
    }

    /// Drop all recorded probes.
    pub fn reset(&self) {
        self.window.lock().unwrap_or_else(|p| p.into_inner()).clear();
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn hits(items: &[(&str, f64)]) -> Vec<(String, f64)> {
        items.iter().map(|(id, s)| (id.to_string(), *s)).collect()
    }

    #[test]
    fn test_identical_results_score_high() {
        let primary = hits(&[("a", 0.95), ("b", 0.9), ("c", 0.85)]);
        let secondary = primary.clone();
        let score = quality_score(&primary, &secondary);
        assert!(score > 0.9);
    }

    #[test]
    fn test_disjoint_results_score_low() {
        let primary = hits(&[("a", 0.9), ("b", 0.9)]);
        let secondary = hits(&[("x", 0.2), ("y", 0.2)]);
        let score = quality_score(&primary, &secondary);
        assert!(score < 0.2);
    }

    #[test]
    fn test_empty_sides() {
        assert_eq!(quality_score(&[], &[]), 1.0);
        // Primary has data, secondary empty: bad signal
        let primary = hits(&[("a", 0.9)]);
        assert!(quality_score(&primary, &[]) < 0.1);
    }

    #[test]
    fn test_score_is_bounded() {
        let primary = hits(&[("a", 2.5)]);
        let secondary = hits(&[("a", 3.0)]);
        let score = quality_score(&primary, &secondary);
        assert!((0.0..=1.0).contains(&score));
    }

    #[test]
    fn test_probe_ring_dedups_consecutive_and_bounds() {
        let ring = ProbeRing::new();
        ring.push("capital of France");
        ring.push("capital of France");
        assert_eq!(ring.len(), 1);

        for i in 0..400 {
            ring.push(&format!("query {i}"));
        }
        assert!(ring.len() <= PROBE_RING_CAPACITY);
        let sample = ring.sample(3);
        assert_eq!(sample[0], "query 399");
    }

    #[test]
    fn test_tracker_rolling_mean() {
        let tracker = QualityTracker::new(3);
        tracker.record(0.9, 0.3);
        tracker.record(0.9, 0.6);
        tracker.record(0.9, 0.9);
        let (_, mean, n) = tracker.snapshot();
        assert_eq!(n, 3);
        assert!((mean - 0.6).abs() < 0.0001);

        // Window slides
        tracker.record(0.9, 0.9);
        let (_, mean, n) = tracker.snapshot();
        assert_eq!(n, 3);
        assert!((mean - 0.8).abs() < 0.0001);
    }
}
