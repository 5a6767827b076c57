//! Read-only lookups over the current snapshot, plus selection and pinning
//!
//! All getters return owned clones so callers never hold the state lock.

use super::{NodeStore, StoreState};
use crate::db::DomainEvent;
use crate::models::{Node, NodePatch, NodeType};
use crate::services::error::NodeStoreError;

fn cloned(nodes: Vec<&Node>) -> Vec<Node> {
    nodes.into_iter().cloned().collect()
}

impl NodeStore {
    pub fn get_node_by_id(&self, id: &str) -> Option<Node> {
        self.state().nodes.get(id).cloned()
    }

    pub fn get_nodes_by_type(&self, node_type: NodeType) -> Vec<Node> {
        cloned(self.state().nodes.by_type(node_type))
    }

    pub fn get_nodes_by_tag(&self, tag: &str) -> Vec<Node> {
        cloned(self.state().nodes.by_tag(tag))
    }

    /// Resolved children in `children` order; dangling ids are dropped
    pub fn get_node_children(&self, id: &str) -> Vec<Node> {
        cloned(self.state().nodes.children_of(id))
    }

    pub fn get_node_parent(&self, id: &str) -> Option<Node> {
        self.state().nodes.parent_of(id).cloned()
    }

    /// Nearest ancestor first; terminates on corrupted parent cycles
    pub fn get_node_ancestors(&self, id: &str) -> Vec<Node> {
        cloned(self.state().nodes.ancestors(id))
    }

    /// Breadth-first, each node at most once, never the node itself
    pub fn get_node_descendants(&self, id: &str) -> Vec<Node> {
        cloned(self.state().nodes.descendants(id))
    }

    /// Nodes without a resolvable parent
    pub fn get_root_nodes(&self) -> Vec<Node> {
        cloned(self.state().nodes.roots())
    }

    pub fn get_pinned_nodes(&self) -> Vec<Node> {
        self.state()
            .nodes
            .iter()
            .filter(|n| n.is_pinned)
            .cloned()
            .collect()
    }

    /// Set or clear the selection. Selecting an unknown id is allowed.
    pub fn select_node(&self, id: Option<&str>) {
        self.mutate(|state| state.selected_node_id = id.map(str::to_string));
    }

    /// Flip `is_pinned`; returns the new value
    pub async fn toggle_node_pin(&self, id: &str) -> Result<bool, NodeStoreError> {
        let node = self
            .modify_node(id, |node| Ok(NodePatch::new().with_pinned(!node.is_pinned)))
            .await?;
        Ok(node.is_pinned)
    }

    /// Reset to the initial empty state
    pub fn clear_nodes(&self) {
        self.mutate(|state| *state = StoreState::default());
        tracing::debug!("Cleared node store");
        self.emit_event(DomainEvent::NodesCleared);
    }
}
