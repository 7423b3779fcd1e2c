//! Per-id write serialization
//!
//! Writes to a single id are serialized by hashing the id into a fixed set of
//! async mutex stripes. `put` of a brand-new id takes no stripe; every
//! subsequent write to that id serializes on its stripe. Guards are held
//! across the index/record write sequence, which is why these are async
//! mutexes rather than std ones.

use std::hash::{DefaultHasher, Hash, Hasher};
use tokio::sync::{Mutex, MutexGuard};

/// Default stripe count.
pub const DEFAULT_STRIPES: usize = 1024;

/// Fixed-size stripe table of async mutexes.
pub struct LockStripes {
    stripes: Vec<Mutex<()>>,
}

impl Default for LockStripes {
    fn default() -> Self {
        Self::new(DEFAULT_STRIPES)
    }
}

impl LockStripes {
    /// Create a table with `count` stripes (minimum 1).
    pub fn new(count: usize) -> Self {
        let count = count.max(1);
        Self {
            stripes: (0..count).map(|_| Mutex::new(())).collect(),
        }
    }

    fn stripe_for(&self, id: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        id.hash(&mut hasher);
        (hasher.finish() as usize) % self.stripes.len()
    }

    /// Acquire the stripe guarding `id`.
    pub async fn lock(&self, id: &str) -> MutexGuard<'_, ()> {
        self.stripes[self.stripe_for(id)].lock().await
    }
}

// ============================================================================
// TESTS
// ============================================================================
