//! Service Layer Error Types
//!
//! Every `NodeStore` operation returns these and also records the display
//! string in `StoreState::error` for presentation code.

use crate::db::PersistenceError;
use crate::models::ValidationError;
use thiserror::Error;

/// Node store operation errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NodeStoreError {
    /// No user id was supplied for a user-scoped operation
    #[error("Authentication required: no user id supplied")]
    AuthRequired,

    /// Node not found by ID
    #[error("Node not found: {id}")]
    NodeNotFound { id: String },

    /// Activity-log entry not found on an existing node
    #[error("Update {update_id} not found on node {node_id}")]
    UpdateNotFound { node_id: String, update_id: String },

    /// Linking would make a node its own ancestor
    #[error("Circular dependency: {child_id} is already an ancestor of {parent_id}")]
    CircularDependency { parent_id: String, child_id: String },

    /// Unlink found no reference between the two nodes
    #[error("No relationship found between {a} and {b}")]
    RelationshipNotFound { a: String, b: String },

    /// Invalid update operation
    #[error("Invalid update: {0}")]
    InvalidUpdate(String),

    /// Store configuration failed validation
    #[error("Invalid store configuration: {0}")]
    InvalidConfig(String),

    /// Validation failed for node
    #[error("Node validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Remote write or read failed
    #[error("Persistence failure: {0}")]
    Persistence(#[from] PersistenceError),
}

impl NodeStoreError {
    pub fn node_not_found(id: impl Into<String>) -> Self {
        Self::NodeNotFound { id: id.into() }
    }

    pub fn update_not_found(node_id: impl Into<String>, update_id: impl Into<String>) -> Self {
        Self::UpdateNotFound {
            node_id: node_id.into(),
            update_id: update_id.into(),
        }
    }

    pub fn circular_dependency(parent_id: impl Into<String>, child_id: impl Into<String>) -> Self {
        Self::CircularDependency {
            parent_id: parent_id.into(),
            child_id: child_id.into(),
        }
    }

    pub fn relationship_not_found(a: impl Into<String>, b: impl Into<String>) -> Self {
        Self::RelationshipNotFound {
            a: a.into(),
            b: b.into(),
        }
    }

    pub fn invalid_update(msg: impl Into<String>) -> Self {
        Self::InvalidUpdate(msg.into())
    }

    /// Errors raised by a failed remote call; these trigger rollback
    pub fn is_persistence(&self) -> bool {
        matches!(self, Self::Persistence(_))
    }
}
