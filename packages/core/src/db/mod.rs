//! Persistence Layer
//!
//! This module handles the boundary with the remote document store:
//!
//! - [`DocumentStore`] - the collaborator contract (fetch, create, patch, batch)
//! - [`InMemoryDocumentStore`] - in-process implementation with failure injection
//! - Document encoding and timestamp normalization
//! - Domain events broadcast after confirmed changes
//!
//! # Layout
//!
//! Documents are scoped per user (`users/{uid}/nodes/{id}`). The store
//! resolves server timestamps on write; the core normalizes provider
//! timestamp wrappers on read.

pub mod document;
mod document_store;
mod error;
pub mod events;

pub use document::{DocRef, DocumentFields, FieldValue, RawDocument, WriteBatch, WriteOp};
pub use document_store::{DocumentStore, InMemoryDocumentStore};
pub use error::PersistenceError;
pub use events::{DomainEvent, HierarchyRelationship};
