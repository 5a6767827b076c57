//! Per-node mutation serialization
//!
//! Two optimistic updates of the same node that overlap in time could
//! otherwise interleave as: A applies, B applies, A fails and restores the
//! pre-A snapshot, erasing B. [`MutationQueue`] hands out one async lock per
//! node id so updates of one node run strictly one after another, while
//! updates of different nodes still proceed concurrently.
//!
//! # Example
//!
//! ```rust
//! use nodegraph_core::services::MutationQueue;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let queue = MutationQueue::new();
//! {
//!     let _guard = queue.acquire("node-123").await;
//!     // snapshot, apply, persist, settle
//! }
//! assert_eq!(queue.pending(), 0);
//! # }
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Held for the duration of one node mutation
pub struct MutationGuard {
    _guard: OwnedMutexGuard<()>,
}

#[derive(Default)]
pub struct MutationQueue {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl MutationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until no other mutation of `node_id` is in flight
    pub async fn acquire(&self, node_id: &str) -> MutationGuard {
        let lock = {
            let mut locks = self
                .locks
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            // Entries only referenced by the map belong to settled mutations
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks
                .entry(node_id.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };

        if lock.try_lock().is_err() {
            tracing::debug!("Mutation of node '{}' queued behind an in-flight one", node_id);
        }

        MutationGuard {
            _guard: lock.lock_owned().await,
        }
    }

    /// Lock several nodes at once.
    ///
    /// Ids are deduplicated and acquired in sorted order, so two callers
    /// locking overlapping sets cannot deadlock each other.
    pub async fn acquire_all<I, S>(&self, node_ids: I) -> Vec<MutationGuard>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut ids: Vec<String> = node_ids
            .into_iter()
            .map(|id| id.as_ref().to_string())
            .collect();
        ids.sort();
        ids.dedup();

        let mut guards = Vec::with_capacity(ids.len());
        for id in &ids {
            guards.push(self.acquire(id).await);
        }
        guards
    }

    /// Node ids with a mutation in flight or queued
    pub fn pending(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .values()
            .filter(|lock| Arc::strong_count(lock) > 1)
            .count()
    }
}
