//! Data Models
//!
//! This module contains the core data structures of the node graph:
//!
//! - `Node` - hierarchical task/idea entity with its activity log
//! - `NodePatch` - partial update applied optimistically and persisted
//! - `NodeArena` - id-addressed collection with cycle-safe walks
//! - Recurrence rules and completion records
//! - `TimeProvider` - injectable clock

mod arena;
mod node;
mod patch;
pub mod recurrence;
pub mod time;

pub use arena::NodeArena;
pub use node::{
    Node, NodeDraft, NodeType, NodeUpdate, NodeUpdateDraft, UpdateKind, ValidationError, MAX_SCORE,
};
pub use patch::NodePatch;
pub use recurrence::{CompletionStatus, Recurrence, RecurrenceFrequency, RecurringCompletion};
pub use time::{MockTimeProvider, SystemTimeProvider, TimeProvider};
