//! CRUD operations
//!
//! Create and update go through [`OptimisticMutation`]; delete and bulk
//! update commit a batch first and only then touch the arena.

use super::optimistic::OptimisticMutation;
use super::NodeStore;
use crate::db::document::{decode_document, node_to_create_fields, patch_to_fields};
use crate::db::{DocRef, DomainEvent, WriteBatch};
use crate::models::recurrence::{latest_completed_date, remove_completion, upsert_completion};
use crate::models::{CompletionStatus, Node, NodeArena, NodeDraft, NodePatch, RecurringCompletion};
use crate::services::error::NodeStoreError;
use chrono::NaiveDate;
use serde_json::Value;

impl NodeStore {
    /// Replace the collection with every node of `user_id`.
    ///
    /// Documents that fail to decode are skipped with a warning. Returns the
    /// number of nodes loaded.
    pub async fn load_nodes(&self, user_id: &str) -> Result<usize, NodeStoreError> {
        if user_id.trim().is_empty() {
            return Err(self.fail(NodeStoreError::AuthRequired));
        }

        self.mutate(|state| state.is_loading = true);

        let documents = match self.persistence.fetch_all(user_id).await {
            Ok(documents) => documents,
            Err(err) => {
                tracing::warn!("Failed to load nodes for user '{}': {}", user_id, err);
                self.mutate(|state| {
                    state.nodes = NodeArena::new();
                    state.is_loading = false;
                });
                return Err(self.fail(err.into()));
            }
        };

        let nodes = documents.into_iter().filter_map(|mut doc| {
            let id = doc.id.clone();
            doc.fields
                .entry("userId")
                .or_insert_with(|| Value::String(user_id.to_string()));
            match decode_document(doc) {
                Ok(node) => Some(node),
                Err(err) => {
                    tracing::warn!("Skipping undecodable document '{}': {}", id, err);
                    None
                }
            }
        });
        let arena = NodeArena::from_nodes(nodes);
        let count = arena.len();

        self.mutate(|state| {
            if let Some(selected) = &state.selected_node_id {
                if !arena.contains(selected) {
                    state.selected_node_id = None;
                }
            }
            state.nodes = arena;
            state.is_loading = false;
        });
        self.clear_error();

        tracing::info!("Loaded {} nodes for user '{}'", count, user_id);
        self.emit_event(DomainEvent::NodesLoaded {
            user_id: user_id.to_string(),
            count,
        });
        Ok(count)
    }

    /// Create a node optimistically and return its id.
    ///
    /// The node is visible in `state().nodes` (flagged `is_optimistic`) as
    /// soon as this future is first polled. If the write fails it is removed
    /// again and a transient error is recorded.
    pub async fn create_node(&self, draft: NodeDraft) -> Result<String, NodeStoreError> {
        if draft.user_id.trim().is_empty() {
            return Err(self.fail(NodeStoreError::AuthRequired));
        }

        let mut node = draft.into_node(
            &self.config.default_title,
            self.config.default_node_type,
            &self.config.default_tags,
            self.now(),
        );
        node.validate().map_err(|e| self.fail(e.into()))?;
        let fields = node_to_create_fields(&node).map_err(|e| self.fail(e.into()))?;

        node.is_optimistic = true;
        let id = node.id.clone();
        let user_id = node.user_id.clone();

        let mutation = OptimisticMutation::apply(self, &id, |nodes| nodes.insert(node));
        let confirmed = mutation
            .settle(self.persistence.create(&user_id, &id, fields), |node| {
                node.is_optimistic = false
            })
            .await?;

        tracing::info!("Created node '{}'", id);
        if let Some(node) = confirmed {
            self.emit_event(DomainEvent::NodeCreated(node));
        }
        Ok(id)
    }

    /// Apply `patch` optimistically and persist it.
    ///
    /// # Errors
    ///
    /// - `InvalidUpdate` if the patch is empty
    /// - `NodeNotFound` if `id` is not in the collection
    /// - `Persistence` if the write failed; the node is restored to its
    ///   exact pre-update value
    pub async fn update_node(&self, id: &str, patch: NodePatch) -> Result<Node, NodeStoreError> {
        if patch.is_empty() {
            return Err(self.fail(NodeStoreError::invalid_update(
                "Update contains no changes",
            )));
        }
        let _hierarchy = if patch.touches_hierarchy() {
            Some(self.hierarchy.lock().await)
        } else {
            None
        };
        self.modify_node(id, move |_| Ok(patch)).await
    }

    /// Compute a patch from the node's current value and apply it.
    ///
    /// Runs under the node's mutation lock, so `build` sees the value left
    /// by any earlier mutation of the same node. An empty patch is a no-op.
    pub(super) async fn modify_node<F>(&self, id: &str, build: F) -> Result<Node, NodeStoreError>
    where
        F: FnOnce(&Node) -> Result<NodePatch, NodeStoreError>,
    {
        let _guard = self.mutations.acquire(id).await;

        let current = self
            .state()
            .nodes
            .get(id)
            .cloned()
            .ok_or_else(|| self.fail(NodeStoreError::node_not_found(id)))?;

        let patch = build(&current).map_err(|e| self.fail(e))?;
        if patch.is_empty() {
            return Ok(current);
        }
        patch.validate().map_err(|e| self.fail(e.into()))?;

        let now = self.now();
        let mut preview = current.clone();
        patch.apply_to(&mut preview, now);
        preview.validate().map_err(|e| self.fail(e.into()))?;

        let fields = patch_to_fields(&patch).map_err(|e| self.fail(e.into()))?;

        let mutation = OptimisticMutation::apply(self, id, |nodes| {
            if let Some(node) = nodes.get_mut(id) {
                patch.apply_to(node, now);
            }
        });
        let confirmed = mutation
            .settle(self.persistence.patch(&current.user_id, id, fields), |_| {})
            .await?
            .ok_or_else(|| self.fail(NodeStoreError::node_not_found(id)))?;

        tracing::debug!("Updated node '{}'", id);
        self.emit_event(DomainEvent::NodeUpdated(confirmed.clone()));
        Ok(confirmed)
    }

    /// Delete a node and clear every reference to it in one atomic batch.
    ///
    /// The parent (and any other node listing `id` as a child) loses the
    /// entry in `children`; every node whose `parent` is `id` gets its
    /// `parent` cleared. Local state changes only after the commit succeeds.
    pub async fn delete_node(&self, id: &str) -> Result<(), NodeStoreError> {
        let _hierarchy = self.hierarchy.lock().await;
        self.remove_node(id).await
    }

    /// [`delete_node`](Self::delete_node) for callers already holding the
    /// hierarchy lock
    pub(super) async fn remove_node(&self, id: &str) -> Result<(), NodeStoreError> {
        let related: Vec<String> = self
            .state()
            .nodes
            .iter()
            .filter(|n| {
                n.id == id
                    || n.parent.as_deref() == Some(id)
                    || n.children.iter().any(|c| c == id)
            })
            .map(|n| n.id.clone())
            .collect();
        let _guards = self.mutations.acquire_all(&related).await;

        let state = self.state();
        let node = state
            .nodes
            .get(id)
            .ok_or_else(|| self.fail(NodeStoreError::node_not_found(id)))?;

        let mut cleanup: Vec<(String, String, NodePatch)> = Vec::new();
        for other in state.nodes.iter().filter(|n| n.id != id) {
            let mut patch = NodePatch::new();
            if other.children.iter().any(|c| c == id) {
                patch = patch.with_children(
                    other.children.iter().filter(|c| *c != id).cloned().collect(),
                );
            }
            if other.parent.as_deref() == Some(id) {
                patch = patch.with_parent(None);
            }
            if !patch.is_empty() {
                cleanup.push((other.id.clone(), other.user_id.clone(), patch));
            }
        }

        let mut batch = WriteBatch::new();
        batch.delete(DocRef::new(&node.user_id, id));
        for (other_id, user_id, patch) in &cleanup {
            let fields = patch_to_fields(patch).map_err(|e| self.fail(e.into()))?;
            batch.update(DocRef::new(user_id, other_id), fields);
        }

        if let Err(err) = self.persistence.commit(batch).await {
            tracing::warn!("Delete of node '{}' failed: {}", id, err);
            return Err(self.fail(err.into()));
        }

        let now = self.now();
        self.mutate(|state| {
            for (other_id, _, patch) in &cleanup {
                if let Some(other) = state.nodes.get_mut(other_id) {
                    patch.apply_to(other, now);
                }
            }
            state.nodes.remove(id);
            if state.selected_node_id.as_deref() == Some(id) {
                state.selected_node_id = None;
            }
        });
        self.clear_error();

        tracing::info!(
            "Deleted node '{}' and cleaned up {} related node(s)",
            id,
            cleanup.len()
        );
        self.emit_event(DomainEvent::NodeDeleted { id: id.to_string() });
        Ok(())
    }

    /// Patch several nodes in one atomic batch.
    ///
    /// Local state is updated after the commit. On failure the collection is
    /// re-fetched for the affected user instead of rolled back field by
    /// field, and the commit error is returned.
    pub async fn bulk_update_nodes(
        &self,
        updates: Vec<(String, NodePatch)>,
    ) -> Result<usize, NodeStoreError> {
        let _hierarchy = self.hierarchy.lock().await;
        let _guards = self
            .mutations
            .acquire_all(updates.iter().map(|(id, _)| id))
            .await;

        let state = self.state();
        let mut batch = WriteBatch::new();
        let mut affected_user: Option<String> = None;

        for (id, patch) in &updates {
            let node = state
                .nodes
                .get(id)
                .ok_or_else(|| self.fail(NodeStoreError::node_not_found(id)))?;
            if patch.is_empty() {
                return Err(self.fail(NodeStoreError::invalid_update(format!(
                    "Update for node {} contains no changes",
                    id
                ))));
            }
            patch.validate().map_err(|e| self.fail(e.into()))?;
            let fields = patch_to_fields(patch).map_err(|e| self.fail(e.into()))?;
            batch.update(DocRef::new(&node.user_id, id), fields);
            affected_user.get_or_insert_with(|| node.user_id.clone());
        }

        if batch.is_empty() {
            return Ok(0);
        }

        if let Err(err) = self.persistence.commit(batch).await {
            tracing::warn!("Bulk update of {} node(s) failed: {}", updates.len(), err);
            let error = NodeStoreError::from(err);
            if let Some(user_id) = affected_user {
                if let Err(reload_err) = self.load_nodes(&user_id).await {
                    tracing::warn!("Reload after failed bulk update also failed: {}", reload_err);
                }
            }
            return Err(self.fail(error));
        }

        let now = self.now();
        let updated: Vec<Node> = self.mutate(|state| {
            updates
                .iter()
                .filter_map(|(id, patch)| {
                    let node = state.nodes.get_mut(id)?;
                    patch.apply_to(node, now);
                    Some(node.clone())
                })
                .collect()
        });
        self.clear_error();

        tracing::info!("Bulk updated {} node(s)", updated.len());
        let count = updated.len();
        for node in updated {
            self.emit_event(DomainEvent::NodeUpdated(node));
        }
        Ok(count)
    }

    /// Record a completion of a recurring node for `date`.
    ///
    /// Any existing record for the same date is replaced, never duplicated.
    pub async fn complete_recurring_task(
        &self,
        id: &str,
        date: NaiveDate,
    ) -> Result<Node, NodeStoreError> {
        let now = self.now();
        self.modify_node(id, move |node| {
            let record = RecurringCompletion {
                date,
                status: CompletionStatus::Completed,
                completed_at: now,
            };
            let completions = upsert_completion(&node.recurring_completions, record);
            Ok(NodePatch::new().with_recurring_completions(completions, Some(date)))
        })
        .await
    }

    /// Remove the completion record for `date`, if any
    pub async fn uncomplete_recurring_task(
        &self,
        id: &str,
        date: NaiveDate,
    ) -> Result<Node, NodeStoreError> {
        self.modify_node(id, move |node| {
            if !node.recurring_completions.iter().any(|c| c.date == date) {
                return Ok(NodePatch::new());
            }
            let completions = remove_completion(&node.recurring_completions, date);
            let last = latest_completed_date(&completions);
            Ok(NodePatch::new().with_recurring_completions(completions, last))
        })
        .await
    }

    /// Flip `completed`
    pub async fn toggle_node_completed(&self, id: &str) -> Result<Node, NodeStoreError> {
        self.modify_node(id, |node| Ok(NodePatch::new().with_completed(!node.completed)))
            .await
    }
}
