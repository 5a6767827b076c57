//! Parent/child relationship management
//!
//! Every edge is stored twice: `child.parent == Some(parent.id)` and
//! `parent.children` contains `child.id`. The operations here keep both
//! sides in step and refuse any link that would make a node its own
//! ancestor.

use super::NodeStore;
use crate::db::document::patch_to_fields;
use crate::db::{DocRef, DomainEvent, HierarchyRelationship, WriteBatch};
use crate::models::{Node, NodeDraft, NodePatch};
use crate::services::error::NodeStoreError;

/// Patches that remove every reference between two nodes
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UnlinkPlan {
    pub a: Option<NodePatch>,
    pub b: Option<NodePatch>,
}

/// Compute the patches that erase all references between `a` and `b`.
///
/// Looks at both `parent` and `children` of both nodes, so orphaned
/// one-sided entries are cleaned up too. Returns `None` if neither node
/// references the other.
pub fn plan_unlink(a: &Node, b: &Node) -> Option<UnlinkPlan> {
    let plan = UnlinkPlan {
        a: detach(a, &b.id),
        b: detach(b, &a.id),
    };
    (plan.a.is_some() || plan.b.is_some()).then_some(plan)
}

fn detach(node: &Node, partner_id: &str) -> Option<NodePatch> {
    let mut patch = NodePatch::new();
    if node.parent.as_deref() == Some(partner_id) {
        patch = patch.with_parent(None);
    }
    if node.children.iter().any(|c| c == partner_id) {
        patch = patch.with_children(without(&node.children, partner_id));
    }
    (!patch.is_empty()).then_some(patch)
}

fn without(ids: &[String], id: &str) -> Vec<String> {
    ids.iter().filter(|c| *c != id).cloned().collect()
}

impl NodeStore {
    /// Make `child_id` a child of `parent_id`.
    ///
    /// If the child already hangs under another parent it is detached from
    /// that parent first. Linking an existing edge again is a no-op.
    ///
    /// # Errors
    ///
    /// - `NodeNotFound` if either node is missing
    /// - `CircularDependency` if the ids are equal or `child_id` is an
    ///   ancestor of `parent_id`; nothing is changed
    pub async fn link_as_child(&self, parent_id: &str, child_id: &str) -> Result<(), NodeStoreError> {
        let _hierarchy = self.hierarchy.lock().await;
        let state = self.state();
        let parent = state
            .nodes
            .get(parent_id)
            .ok_or_else(|| self.fail(NodeStoreError::node_not_found(parent_id)))?;
        let child = state
            .nodes
            .get(child_id)
            .ok_or_else(|| self.fail(NodeStoreError::node_not_found(child_id)))?;

        if parent_id == child_id
            || state
                .nodes
                .ancestors(parent_id)
                .iter()
                .any(|ancestor| ancestor.id == child_id)
        {
            tracing::debug!(
                "Refusing to link '{}' under '{}': would create a cycle",
                child_id,
                parent_id
            );
            return Err(self.fail(NodeStoreError::circular_dependency(parent_id, child_id)));
        }

        if child.parent.as_deref() == Some(parent_id) && parent.children.iter().any(|c| c == child_id)
        {
            return Ok(());
        }

        if let Some(old_parent) = child
            .parent
            .as_deref()
            .filter(|old| *old != parent_id && state.nodes.contains(old))
        {
            self.modify_node(old_parent, |node| {
                if !node.children.iter().any(|c| c == child_id) {
                    return Ok(NodePatch::new());
                }
                Ok(NodePatch::new().with_children(without(&node.children, child_id)))
            })
            .await?;
        }

        self.modify_node(parent_id, |node| {
            if node.children.iter().any(|c| c == child_id) {
                return Ok(NodePatch::new());
            }
            let mut children = node.children.clone();
            children.push(child_id.to_string());
            Ok(NodePatch::new().with_children(children))
        })
        .await?;

        self.modify_node(child_id, |_| {
            Ok(NodePatch::new().with_parent(Some(parent_id.to_string())))
        })
        .await?;

        tracing::info!("Linked '{}' as child of '{}'", child_id, parent_id);
        self.emit_event(DomainEvent::HierarchyLinked(HierarchyRelationship::new(
            parent_id, child_id,
        )));
        Ok(())
    }

    /// Same edge as [`link_as_child`](Self::link_as_child), argument order flipped
    pub async fn link_as_parent(&self, child_id: &str, parent_id: &str) -> Result<(), NodeStoreError> {
        self.link_as_child(parent_id, child_id).await
    }

    /// Remove every reference between `a` and `b` in one atomic batch.
    ///
    /// Works regardless of which node is the parent and also repairs
    /// one-sided references.
    pub async fn unlink_nodes(&self, a: &str, b: &str) -> Result<(), NodeStoreError> {
        let _hierarchy = self.hierarchy.lock().await;
        let _guards = self.mutations.acquire_all([a, b]).await;

        let state = self.state();
        let node_a = state
            .nodes
            .get(a)
            .ok_or_else(|| self.fail(NodeStoreError::node_not_found(a)))?;
        let node_b = state
            .nodes
            .get(b)
            .ok_or_else(|| self.fail(NodeStoreError::node_not_found(b)))?;

        let plan = plan_unlink(node_a, node_b)
            .ok_or_else(|| self.fail(NodeStoreError::relationship_not_found(a, b)))?;

        let b_is_parent =
            node_a.parent.as_deref() == Some(b) || node_b.children.iter().any(|c| c == a);
        let relationship = if b_is_parent {
            HierarchyRelationship::new(b, a)
        } else {
            HierarchyRelationship::new(a, b)
        };

        let mut batch = WriteBatch::new();
        for (node, patch) in [(node_a, &plan.a), (node_b, &plan.b)] {
            if let Some(patch) = patch {
                let fields = patch_to_fields(patch).map_err(|e| self.fail(e.into()))?;
                batch.update(DocRef::new(&node.user_id, &node.id), fields);
            }
        }

        if let Err(err) = self.persistence.commit(batch).await {
            tracing::warn!("Unlink of '{}' and '{}' failed: {}", a, b, err);
            return Err(self.fail(err.into()));
        }

        let now = self.now();
        self.mutate(|state| {
            for (id, patch) in [(a, &plan.a), (b, &plan.b)] {
                if let (Some(node), Some(patch)) = (state.nodes.get_mut(id), patch) {
                    patch.apply_to(node, now);
                }
            }
        });
        self.clear_error();

        tracing::info!(
            "Unlinked '{}' from '{}'",
            relationship.child_id,
            relationship.parent_id
        );
        self.emit_event(DomainEvent::HierarchyUnlinked(relationship));
        Ok(())
    }

    /// Create a node under `parent_id` and return its id.
    ///
    /// The new node takes the parent's `user_id`. If appending it to the
    /// parent's `children` fails, the new node is deleted again.
    pub async fn create_child_node(
        &self,
        parent_id: &str,
        mut draft: NodeDraft,
    ) -> Result<String, NodeStoreError> {
        let _hierarchy = self.hierarchy.lock().await;
        let parent_user = self
            .state()
            .nodes
            .get(parent_id)
            .map(|p| p.user_id.clone())
            .ok_or_else(|| self.fail(NodeStoreError::node_not_found(parent_id)))?;

        draft.user_id = parent_user;
        draft.parent = Some(parent_id.to_string());
        draft.children.clear();
        let child_id = self.create_node(draft).await?;

        let appended = self
            .modify_node(parent_id, |node| {
                let mut children = node.children.clone();
                children.push(child_id.clone());
                Ok(NodePatch::new().with_children(children))
            })
            .await;

        if let Err(err) = appended {
            tracing::warn!(
                "Removing child '{}' after failing to attach it to '{}': {}",
                child_id,
                parent_id,
                err
            );
            if let Err(cleanup_err) = self.remove_node(&child_id).await {
                tracing::warn!("Cleanup of child '{}' failed: {}", child_id, cleanup_err);
            }
            return Err(self.fail(err));
        }

        self.emit_event(DomainEvent::HierarchyLinked(HierarchyRelationship::new(
            parent_id, &child_id,
        )));
        Ok(child_id)
    }

    /// Create a node above `child_id` and return its id.
    ///
    /// The child moves out of its previous parent's `children`, if any. The
    /// child and old parent are rewritten in one batch; if that fails the new
    /// node is deleted again and the child keeps its old parent.
    pub async fn create_parent_node(
        &self,
        child_id: &str,
        mut draft: NodeDraft,
    ) -> Result<String, NodeStoreError> {
        let _hierarchy = self.hierarchy.lock().await;
        let child_user = self
            .state()
            .nodes
            .get(child_id)
            .map(|c| c.user_id.clone())
            .ok_or_else(|| self.fail(NodeStoreError::node_not_found(child_id)))?;

        draft.user_id = child_user;
        draft.parent = None;
        draft.children = vec![child_id.to_string()];
        let parent_id = self.create_node(draft).await?;

        if let Err(err) = self.adopt(&parent_id, child_id).await {
            tracing::warn!(
                "Removing parent '{}' after failing to move '{}' under it: {}",
                parent_id,
                child_id,
                err
            );
            if let Err(cleanup_err) = self.remove_node(&parent_id).await {
                tracing::warn!("Cleanup of parent '{}' failed: {}", parent_id, cleanup_err);
            }
            return Err(self.fail(err));
        }

        self.emit_event(DomainEvent::HierarchyLinked(HierarchyRelationship::new(
            &parent_id, child_id,
        )));
        Ok(parent_id)
    }

    /// Point `child_id` at `parent_id` and drop it from its previous
    /// parent's `children` in one atomic batch
    async fn adopt(&self, parent_id: &str, child_id: &str) -> Result<(), NodeStoreError> {
        let old_parent = {
            let state = self.state();
            state
                .nodes
                .get(child_id)
                .and_then(|child| child.parent.clone())
                .filter(|old| old != parent_id && state.nodes.contains(old))
        };
        let _guards = self
            .mutations
            .acquire_all(std::iter::once(child_id).chain(old_parent.as_deref()))
            .await;

        let state = self.state();
        let child = state
            .nodes
            .get(child_id)
            .ok_or_else(|| NodeStoreError::node_not_found(child_id))?;

        let mut patches = vec![(
            child.user_id.clone(),
            child_id.to_string(),
            NodePatch::new().with_parent(Some(parent_id.to_string())),
        )];
        if let Some(old) = old_parent.as_deref().and_then(|old| state.nodes.get(old)) {
            if old.children.iter().any(|c| c == child_id) {
                patches.push((
                    old.user_id.clone(),
                    old.id.clone(),
                    NodePatch::new().with_children(without(&old.children, child_id)),
                ));
            }
        }

        let mut batch = WriteBatch::new();
        for (user_id, id, patch) in &patches {
            batch.update(DocRef::new(user_id, id), patch_to_fields(patch)?);
        }
        self.persistence.commit(batch).await?;

        let now = self.now();
        self.mutate(|state| {
            for (_, id, patch) in &patches {
                if let Some(node) = state.nodes.get_mut(id) {
                    patch.apply_to(node, now);
                }
            }
        });
        self.clear_error();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NodeDraft;
    use chrono::Utc;

    fn node(id: &str, parent: Option<&str>, children: &[&str]) -> Node {
        let mut node = NodeDraft::new("user-1").into_node("n", Default::default(), &[], Utc::now());
        node.id = id.to_string();
        node.parent = parent.map(str::to_string);
        node.children = children.iter().map(|c| c.to_string()).collect();
        node
    }

    #[test]
    fn test_plan_unlink_parent_child() {
        let parent = node("p", None, &["c", "x"]);
        let child = node("c", Some("p"), &[]);

        let plan = plan_unlink(&parent, &child).unwrap();

        assert_eq!(
            plan.a,
            Some(NodePatch::new().with_children(vec!["x".to_string()]))
        );
        assert_eq!(plan.b, Some(NodePatch::new().with_parent(None)));
    }

    #[test]
    fn test_plan_unlink_is_order_independent() {
        let parent = node("p", None, &["c"]);
        let child = node("c", Some("p"), &[]);

        let forward = plan_unlink(&parent, &child).unwrap();
        let reverse = plan_unlink(&child, &parent).unwrap();

        assert_eq!(forward.a, reverse.b);
        assert_eq!(forward.b, reverse.a);
    }

    #[test]
    fn test_plan_unlink_repairs_one_sided_reference() {
        let stale_parent = node("p", None, &["c"]);
        let child = node("c", None, &[]);

        let plan = plan_unlink(&stale_parent, &child).unwrap();

        assert!(plan.a.is_some());
        assert!(plan.b.is_none());
    }

    #[test]
    fn test_plan_unlink_unrelated_nodes() {
        assert!(plan_unlink(&node("a", None, &[]), &node("b", None, &[])).is_none());
    }
}
