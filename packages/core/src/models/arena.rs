//! Node Arena
//!
//! Flat id → [`Node`] map plus display order. Every cross-reference between
//! nodes is an id that must be resolved through the arena; ids that do not
//! resolve are dangling and are skipped by every walk below.
//!
//! # Invariants maintained by the store (not enforced here)
//!
//! 1. `a.parent == Some(b.id)` ⇔ `b.children` contains `a.id`
//! 2. Following `parent` from any node terminates
//!
//! The walks tolerate data that breaks either invariant: ancestor and
//! descendant traversals carry a visited set and never revisit an id.

use super::node::{Node, NodeType};
use std::collections::{HashMap, HashSet, VecDeque};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeArena {
    order: Vec<String>,
    nodes: HashMap<String, Node>,
}

impl NodeArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an arena preserving the iteration order of `nodes`.
    ///
    /// A repeated id replaces the earlier entry in place.
    pub fn from_nodes(nodes: impl IntoIterator<Item = Node>) -> Self {
        let mut arena = Self::new();
        for node in nodes {
            arena.insert(node);
        }
        arena
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Node> {
        self.nodes.get_mut(id)
    }

    /// Insert a node, appending new ids and replacing existing ones in place
    pub fn insert(&mut self, node: Node) {
        if !self.nodes.contains_key(&node.id) {
            self.order.push(node.id.clone());
        }
        self.nodes.insert(node.id.clone(), node);
    }

    pub fn remove(&mut self, id: &str) -> Option<Node> {
        let removed = self.nodes.remove(id)?;
        self.order.retain(|existing| existing != id);
        Some(removed)
    }

    /// Nodes in display order
    pub fn iter(&self) -> impl Iterator<Item = &Node> + '_ {
        self.order.iter().filter_map(|id| self.nodes.get(id))
    }

    pub fn ids(&self) -> &[String] {
        &self.order
    }

    pub fn by_type(&self, node_type: NodeType) -> Vec<&Node> {
        self.iter().filter(|n| n.node_type == node_type).collect()
    }

    pub fn by_tag(&self, tag: &str) -> Vec<&Node> {
        self.iter().filter(|n| n.has_tag(tag)).collect()
    }

    /// Resolved children in `children` order, dangling ids dropped
    pub fn children_of(&self, id: &str) -> Vec<&Node> {
        self.get(id)
            .map(|node| {
                node.children
                    .iter()
                    .filter_map(|child_id| self.get(child_id))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn parent_of(&self, id: &str) -> Option<&Node> {
        self.get(id)
            .and_then(|node| node.parent.as_deref())
            .and_then(|parent_id| self.get(parent_id))
    }

    /// Walk `parent` upward, nearest ancestor first.
    ///
    /// Stops at a missing parent or the first id already visited, so the
    /// result never exceeds `len() - 1` entries.
    pub fn ancestors(&self, id: &str) -> Vec<&Node> {
        let mut chain = Vec::new();
        let mut visited: HashSet<&str> = HashSet::new();
        visited.insert(id);

        let mut current = self.get(id);
        while let Some(node) = current {
            let Some(parent_id) = node.parent.as_deref() else {
                break;
            };
            if !visited.insert(parent_id) {
                tracing::debug!("Parent cycle detected at '{}' while walking from '{}'", parent_id, id);
                break;
            }
            current = self.get(parent_id);
            if let Some(parent) = current {
                chain.push(parent);
            }
        }

        chain
    }

    pub fn ancestor_ids(&self, id: &str) -> Vec<String> {
        self.ancestors(id).into_iter().map(|n| n.id.clone()).collect()
    }

    /// Breadth-first walk over `children` with an explicit work-list.
    ///
    /// Excludes the start node itself, even when a corrupted `children`
    /// list leads back to it.
    pub fn descendants(&self, id: &str) -> Vec<&Node> {
        let mut result = Vec::new();
        let mut visited: HashSet<&str> = HashSet::new();
        visited.insert(id);

        let mut queue: VecDeque<&Node> = self.get(id).into_iter().collect();
        while let Some(node) = queue.pop_front() {
            for child_id in &node.children {
                if !visited.insert(child_id.as_str()) {
                    continue;
                }
                if let Some(child) = self.get(child_id) {
                    result.push(child);
                    queue.push_back(child);
                }
            }
        }

        result
    }

    /// Nodes whose `parent` is absent or dangling
    pub fn roots(&self) -> Vec<&Node> {
        self.iter()
            .filter(|n| n.parent.as_deref().map_or(true, |p| !self.contains(p)))
            .collect()
    }

    /// Every pair violating the parent/children back-reference invariant.
    ///
    /// Returned as `(parent_id, child_id)`; dangling ids are not reported.
    pub fn inconsistent_links(&self) -> Vec<(String, String)> {
        let mut broken = Vec::new();
        for node in self.iter() {
            if let Some(parent) = node.parent.as_deref().and_then(|p| self.get(p)) {
                if !parent.children.contains(&node.id) {
                    broken.push((parent.id.clone(), node.id.clone()));
                }
            }
            for child in node.children.iter().filter_map(|c| self.get(c)) {
                if child.parent.as_deref() != Some(node.id.as_str()) {
                    broken.push((node.id.clone(), child.id.clone()));
                }
            }
        }
        broken
    }
}
