//! Business Services
//!
//! - [`NodeStore`] - session-scoped node graph with optimistic mutations
//! - [`MutationQueue`] - per-node serialization of in-flight mutations
//! - [`StoreConfig`] - tunables with JSON and environment loading
//!
//! Services coordinate between the persistence layer and the in-memory
//! collection, enforcing the hierarchy invariants and recording errors for
//! presentation code.

pub mod config;
pub mod error;
pub mod mutation_queue;
pub mod node_store;

pub use config::StoreConfig;
pub use error::NodeStoreError;
pub use mutation_queue::{MutationGuard, MutationQueue};
pub use node_store::{plan_unlink, NodeStore, StoreState, UnlinkPlan};
