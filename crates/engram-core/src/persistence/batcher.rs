//! Access side-effect batcher
//!
//! Retrieval results trigger per-id side effects (access_count bump,
//! last_accessed_at, importance reinforcement). Applying them inline would put
//! a write on every read path, so they are funneled through a single-writer
//! task that flushes every 250 ms or 64 pending updates, whichever comes
//! first. Updates are applied in receipt order.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::store::{AccessUpdate, MemoryStore};

/// Flush when this many updates are pending.
const MAX_BATCH: usize = 64;

/// Flush at least this often while updates are pending.
const FLUSH_INTERVAL: Duration = Duration::from_millis(250);

/// Single-writer batcher for access side-effects.
pub struct AccessBatcher {
    tx: std::sync::Mutex<Option<mpsc::Sender<AccessUpdate>>>,
    worker: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl AccessBatcher {
    /// Spawn the batcher worker against a store.
    pub fn spawn(store: Arc<MemoryStore>, alpha: f64, queue_size: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<AccessUpdate>(queue_size.max(MAX_BATCH));

        let worker = tokio::spawn(async move {
            let mut pending: Vec<AccessUpdate> = Vec::with_capacity(MAX_BATCH);
            let mut ticker = tokio::time::interval(FLUSH_INTERVAL);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    update = rx.recv() => match update {
                        Some(u) => {
                            pending.push(u);
                            if pending.len() >= MAX_BATCH {
                                flush(&store, &mut pending, alpha);
                            }
                        }
                        // Channel closed: drain what's left and exit.
                        None => {
                            flush(&store, &mut pending, alpha);
                            break;
                        }
                    },
                    _ = ticker.tick() => {
                        if !pending.is_empty() {
                            flush(&store, &mut pending, alpha);
                        }
                    }
                }
            }
            debug!("access batcher drained and stopped");
        });

        Self {
            tx: std::sync::Mutex::new(Some(tx)),
            worker: tokio::sync::Mutex::new(Some(worker)),
        }
    }

    /// Record an access for a returned id. Never blocks the read path; if the
    /// queue is full the update is dropped with a warning.
    pub fn record(&self, id: &str) {
        let guard = self.tx.lock().unwrap_or_else(|p| p.into_inner());
        let Some(tx) = guard.as_ref() else {
            return;
        };
        let update = AccessUpdate {
            id: id.to_string(),
            at: Utc::now(),
        };
        if let Err(e) = tx.try_send(update) {
            warn!("access batcher queue full, dropping update: {}", e);
        }
    }

    /// Close the queue and wait for the worker to drain.
    pub async fn shutdown(&self) {
        // Dropping the sender closes the channel; the worker flushes and exits.
        self.tx.lock().unwrap_or_else(|p| p.into_inner()).take();
        let handle = self.worker.lock().await.take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

fn flush(store: &MemoryStore, pending: &mut Vec<AccessUpdate>, alpha: f64) {
    if pending.is_empty() {
        return;
    }
    let batch = std::mem::take(pending);
    let count = batch.len();
    if let Err(e) = store.apply_access_updates(&batch, alpha) {
        warn!("failed to flush {} access updates: {}", count, e);
    } else {
        debug!(count, "flushed access updates");
    }
}

// ============================================================================
// TESTS
// ============================================================================
