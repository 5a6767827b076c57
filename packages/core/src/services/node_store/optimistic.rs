//! Optimistic apply / persist / confirm-or-restore command
//!
//! Create and update share one protocol:
//!
//! 1. **apply** - snapshot the target node (or its absence) and mutate the
//!    arena in the same state swap
//! 2. **persist** - await the remote write
//! 3. **settle** - on success reconcile the node in place; on failure put the
//!    exact snapshot back (or remove the node if it did not exist), record a
//!    transient error and emit `NodeRolledBack`. A node that left the arena
//!    while the write was in flight is not brought back.

use super::NodeStore;
use crate::db::{DomainEvent, PersistenceError};
use crate::models::{Node, NodeArena};
use crate::services::error::NodeStoreError;
use std::future::Future;

pub(super) struct OptimisticMutation<'a> {
    store: &'a NodeStore,
    id: String,
    snapshot: Option<Node>,
}

impl<'a> OptimisticMutation<'a> {
    /// Snapshot `id` and run `mutate` against the arena atomically
    pub(super) fn apply(store: &'a NodeStore, id: &str, mutate: impl FnOnce(&mut NodeArena)) -> Self {
        let snapshot = store.mutate(|state| {
            let snapshot = state.nodes.get(id).cloned();
            mutate(&mut state.nodes);
            snapshot
        });

        Self {
            store,
            id: id.to_string(),
            snapshot,
        }
    }

    /// Await `persist`, then confirm with `reconcile` or restore the snapshot.
    ///
    /// Returns the confirmed node, or `None` if it vanished from the arena
    /// while the write was in flight.
    pub(super) async fn settle<F>(
        self,
        persist: F,
        reconcile: impl FnOnce(&mut Node),
    ) -> Result<Option<Node>, NodeStoreError>
    where
        F: Future<Output = Result<(), PersistenceError>>,
    {
        match persist.await {
            Ok(()) => {
                let confirmed = self.store.mutate(|state| {
                    let node = state.nodes.get_mut(&self.id)?;
                    reconcile(node);
                    Some(node.clone())
                });
                self.store.clear_error();
                Ok(confirmed)
            }
            Err(err) => Err(self.restore(err)),
        }
    }

    fn restore(self, err: PersistenceError) -> NodeStoreError {
        let Self {
            store,
            id,
            snapshot,
        } = self;

        // A node deleted or reloaded away meanwhile stays gone
        store.mutate(|state| match snapshot {
            Some(before) if state.nodes.contains(&id) => state.nodes.insert(before),
            Some(_) => {}
            None => {
                state.nodes.remove(&id);
            }
        });

        tracing::warn!("Rolled back optimistic change to node '{}': {}", id, err);
        let error = store.fail_transient(NodeStoreError::from(err));
        store.emit_event(DomainEvent::NodeRolledBack {
            id,
            reason: error.to_string(),
        });
        error
    }
}
