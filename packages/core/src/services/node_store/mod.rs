//! Node Store - the session-scoped container for the node graph
//!
//! `NodeStore` owns the in-memory collection and composes the operation
//! modules:
//!
//! - [`crud`] - load, create, update, delete, bulk update, recurring completion
//! - [`update_log`] - activity-log entries on a node
//! - [`relationships`] - link/unlink with cycle prevention, create-and-link
//! - [`traversal`] - lookups, filters, ancestor/descendant walks, selection
//! - [`snooze`] - time-gated deferral
//!
//! # State model
//!
//! State lives in a [`StoreState`] behind `RwLock<Arc<_>>`. Every write
//! clones the current state, edits the clone and swaps it in, so a reader
//! holding an `Arc<StoreState>` never observes a partial write. No lock is
//! held across an `.await`.
//!
//! # Errors
//!
//! Operations return `Result<_, NodeStoreError>` and also record the message
//! in `StoreState::error`. Failures that rolled back an optimistic write are
//! transient and cleared after `StoreConfig::error_clear_delay`; structural
//! errors stay until the next successful operation.
//!
//! # Ordering
//!
//! Mutations of one node run one at a time under its [`MutationQueue`]
//! lock. Operations that rewrite `parent`/`children` across nodes (link,
//! unlink, create-and-link, delete, bulk update) additionally hold the
//! store-wide hierarchy lock from their first read to their last write, so
//! a cycle check can never be invalidated by a concurrent link. The
//! hierarchy lock is always taken before any node lock.

mod crud;
mod optimistic;
mod relationships;
mod snooze;
mod traversal;
mod update_log;

pub use relationships::{plan_unlink, UnlinkPlan};

use crate::db::{DocumentStore, DomainEvent};
use crate::models::{NodeArena, SystemTimeProvider, TimeProvider};
use crate::services::config::StoreConfig;
use crate::services::error::NodeStoreError;
use crate::services::mutation_queue::MutationQueue;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::{broadcast, Mutex as AsyncMutex};

/// Read-only view handed to presentation code
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreState {
    /// The full node collection
    pub nodes: NodeArena,
    /// True while `load_nodes` is fetching
    pub is_loading: bool,
    /// Last error message, if any
    pub error: Option<String>,
    /// Currently selected node
    pub selected_node_id: Option<String>,
}

struct Shared {
    state: RwLock<Arc<StoreState>>,
    /// Bumped on every error write so a stale auto-clear timer is a no-op
    error_generation: AtomicU64,
}

impl Shared {
    fn snapshot(&self) -> Arc<StoreState> {
        self.state
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn mutate<R>(&self, f: impl FnOnce(&mut StoreState) -> R) -> R {
        let mut guard = self
            .state
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut next = StoreState::clone(&guard);
        let result = f(&mut next);
        *guard = Arc::new(next);
        result
    }

    fn set_error(&self, message: Option<String>) -> u64 {
        let generation = self.error_generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.mutate(|state| state.error = message);
        generation
    }

    fn clear_error_if_current(&self, generation: u64) {
        let mut guard = self
            .state
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if self.error_generation.load(Ordering::SeqCst) == generation && guard.error.is_some() {
            let mut next = StoreState::clone(&guard);
            next.error = None;
            *guard = Arc::new(next);
        }
    }
}

/// Session-scoped node graph store
///
/// Cloning is cheap and yields a handle to the same state.
///
/// # Examples
///
/// ```rust
/// use nodegraph_core::db::InMemoryDocumentStore;
/// use nodegraph_core::models::{NodeDraft, NodeType};
/// use nodegraph_core::services::NodeStore;
/// use std::sync::Arc;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let store = NodeStore::new(Arc::new(InMemoryDocumentStore::new()));
///
/// let goal = store
///     .create_node(NodeDraft::new("user-1").with_title("Launch").with_node_type(NodeType::Goal))
///     .await?;
/// let task = store
///     .create_child_node(&goal, NodeDraft::new("user-1").with_title("Write docs"))
///     .await?;
///
/// assert_eq!(store.get_node_children(&goal)[0].id, task);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct NodeStore {
    shared: Arc<Shared>,
    persistence: Arc<dyn DocumentStore>,
    config: Arc<StoreConfig>,
    clock: Arc<dyn TimeProvider>,
    mutations: Arc<MutationQueue>,
    hierarchy: Arc<AsyncMutex<()>>,
    event_tx: broadcast::Sender<DomainEvent>,
}

impl NodeStore {
    /// Create a store with the default configuration and system clock
    pub fn new(persistence: Arc<dyn DocumentStore>) -> Self {
        Self::build(persistence, StoreConfig::default())
    }

    /// Create a store with a validated custom configuration
    pub fn with_config(
        persistence: Arc<dyn DocumentStore>,
        config: StoreConfig,
    ) -> Result<Self, NodeStoreError> {
        config.validate().map_err(NodeStoreError::InvalidConfig)?;
        Ok(Self::build(persistence, config))
    }

    fn build(persistence: Arc<dyn DocumentStore>, config: StoreConfig) -> Self {
        let (event_tx, _) = broadcast::channel(config.event_channel_capacity);
        Self {
            shared: Arc::new(Shared {
                state: RwLock::new(Arc::new(StoreState::default())),
                error_generation: AtomicU64::new(0),
            }),
            persistence,
            config: Arc::new(config),
            clock: Arc::new(SystemTimeProvider),
            mutations: Arc::new(MutationQueue::new()),
            hierarchy: Arc::new(AsyncMutex::new(())),
            event_tx,
        }
    }

    /// Replace the clock used for timestamps and snooze evaluation
    pub fn with_clock(mut self, clock: Arc<dyn TimeProvider>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Immutable snapshot of the current state
    pub fn state(&self) -> Arc<StoreState> {
        self.shared.snapshot()
    }

    /// Subscribe to domain events emitted after confirmed changes
    pub fn subscribe_to_events(&self) -> broadcast::Receiver<DomainEvent> {
        self.event_tx.subscribe()
    }

    /// Ignores errors if no subscribers (expected in most tests)
    fn emit_event(&self, event: DomainEvent) {
        tracing::debug!("Emitting {}", event.event_type());
        let _ = self.event_tx.send(event);
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    fn mutate<R>(&self, f: impl FnOnce(&mut StoreState) -> R) -> R {
        self.shared.mutate(f)
    }

    /// Record a structural error and hand it back for `?`/`Err`
    fn fail(&self, error: NodeStoreError) -> NodeStoreError {
        tracing::debug!("Operation failed: {}", error);
        self.shared.set_error(Some(error.to_string()));
        error
    }

    /// Record an error that clears itself after the configured delay
    fn fail_transient(&self, error: NodeStoreError) -> NodeStoreError {
        let generation = self.shared.set_error(Some(error.to_string()));
        let delay = self.config.error_clear_delay();
        let shared = Arc::clone(&self.shared);

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    tokio::time::sleep(delay).await;
                    shared.clear_error_if_current(generation);
                });
            }
            Err(_) => {
                tracing::warn!("No tokio runtime; transient error will not auto-clear");
            }
        }
        error
    }

    /// A successful operation overwrites any previous error
    fn clear_error(&self) {
        if self.shared.snapshot().error.is_some() {
            self.shared.set_error(None);
        }
    }
}
