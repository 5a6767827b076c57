//! Persistence Error Types
//!
//! Errors surfaced by a [`DocumentStore`](super::DocumentStore)
//! implementation. The service layer wraps these in
//! `NodeStoreError::Persistence`.

use thiserror::Error;

/// Document store operation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PersistenceError {
    /// The backend could not be reached or refused the request
    #[error("Document store unavailable: {0}")]
    Unavailable(String),

    /// A patch or batch update targeted a document that does not exist
    #[error("Document not found: users/{user_id}/nodes/{id}")]
    DocumentNotFound { user_id: String, id: String },

    /// The write was rejected (permissions, precondition, quota)
    #[error("Write rejected: {0}")]
    Rejected(String),

    /// Fields could not be encoded or a document could not be decoded
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl PersistenceError {
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    pub fn document_not_found(user_id: impl Into<String>, id: impl Into<String>) -> Self {
        Self::DocumentNotFound {
            user_id: user_id.into(),
            id: id.into(),
        }
    }

    pub fn rejected(msg: impl Into<String>) -> Self {
        Self::Rejected(msg.into())
    }

    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }
}

impl From<serde_json::Error> for PersistenceError {
    fn from(err: serde_json::Error) -> Self {
        PersistenceError::Serialization(err.to_string())
    }
}
