//! NodeGraph Core
//!
//! In-memory store for a user's hierarchical graph of goals, projects, tasks
//! and ideas, backed by a remote document collection.
//!
//! # Architecture
//!
//! - **Arena of ids**: nodes reference each other by id only; the
//!   parent/children back-references are kept consistent by the store
//! - **Optimistic writes**: creates and updates are visible immediately and
//!   rolled back to an exact snapshot if persistence fails
//! - **Copy-on-write state**: readers get an immutable `Arc<StoreState>`
//! - **Pluggable persistence**: anything implementing [`db::DocumentStore`]
//!
//! # Modules
//!
//! - [`models`] - Node, patch, recurrence and arena types
//! - [`db`] - Persistence contract, document codec, domain events
//! - [`services`] - `NodeStore` and its configuration

pub mod db;
pub mod models;
pub mod services;

// Re-export commonly used types
pub use db::{DocumentStore, DomainEvent, InMemoryDocumentStore, PersistenceError};
pub use models::*;
pub use services::*;

/// Install a `tracing` subscriber filtered by `RUST_LOG`.
///
/// Defaults to `info` when `RUST_LOG` is unset. Safe to call more than once;
/// later calls are ignored.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
