//! Domain Events for the NodeStore
//!
//! Events follow the observer pattern so presentation code can react to
//! confirmed changes without polling the store.
//!
//! # Event Flow
//!
//! 1. `NodeStore` performs an operation (create, update, link, ...)
//! 2. After the persistence call resolves, a domain event is emitted on a
//!    tokio broadcast channel
//! 3. All subscribers receive the event asynchronously
//!
//! Optimistic writes that are later rolled back emit `NodeRolledBack` instead
//! of a change event.

use crate::models::Node;
use serde::{Deserialize, Serialize};

/// A parent → child edge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HierarchyRelationship {
    pub parent_id: String,
    pub child_id: String,
}

impl HierarchyRelationship {
    pub fn new(parent_id: impl Into<String>, child_id: impl Into<String>) -> Self {
        Self {
            parent_id: parent_id.into(),
            child_id: child_id.into(),
        }
    }
}

/// Domain events emitted by `NodeStore`
#[derive(Debug, Clone)]
pub enum DomainEvent {
    /// The collection was replaced by a load
    NodesLoaded { user_id: String, count: usize },

    /// A node create was confirmed by the store
    NodeCreated(Node),

    /// A node update was confirmed by the store
    NodeUpdated(Node),

    /// A node was deleted along with its back-references
    NodeDeleted { id: String },

    /// An optimistic mutation failed and local state was restored
    NodeRolledBack { id: String, reason: String },

    /// A parent/child edge was established
    HierarchyLinked(HierarchyRelationship),

    /// A parent/child edge was removed
    HierarchyUnlinked(HierarchyRelationship),

    /// The store was reset to its initial state
    NodesCleared,
}

impl DomainEvent {
    /// String representation of the event type, for logging
    pub fn event_type(&self) -> &str {
        match self {
            DomainEvent::NodesLoaded { .. } => "nodes:loaded",
            DomainEvent::NodeCreated(_) => "node:created",
            DomainEvent::NodeUpdated(_) => "node:updated",
            DomainEvent::NodeDeleted { .. } => "node:deleted",
            DomainEvent::NodeRolledBack { .. } => "node:rolled-back",
            DomainEvent::HierarchyLinked(_) => "hierarchy:linked",
            DomainEvent::HierarchyUnlinked(_) => "hierarchy:unlinked",
            DomainEvent::NodesCleared => "nodes:cleared",
        }
    }
}
