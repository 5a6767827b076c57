//! Node Data Structures
//!
//! This module defines the `Node` entity held in the store's arena, the
//! `NodeUpdate` entries of its activity log, and the `NodeDraft` used to
//! create new nodes.
//!
//! # Architecture
//!
//! - **Flat collection**: nodes never own each other; `parent` and `children`
//!   hold ids that are re-resolved through the [`NodeArena`](super::NodeArena)
//! - **camelCase wire format**: field names match the remote document layout
//! - **Absent, not null**: unset optional fields are skipped on serialization
//!
//! # Examples
//!
//! ```rust
//! use nodegraph_core::models::{NodeDraft, NodeType};
//!
//! let draft = NodeDraft::new("user-1")
//!     .with_title("Ship v1")
//!     .with_node_type(NodeType::Goal);
//! let node = draft.into_node("Untitled", NodeType::Thought, &["misc".to_string()], chrono::Utc::now());
//! assert_eq!(node.title, "Ship v1");
//! assert_eq!(node.tags, vec!["misc".to_string()]);
//! ```

use super::recurrence::{Recurrence, RecurringCompletion};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Highest accepted value for `urgency` and `importance`
pub const MAX_SCORE: u8 = 10;

/// Validation errors for Node operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid node type: {0}")]
    InvalidNodeType(String),

    #[error("Invalid parent reference: {0}")]
    InvalidParent(String),

    #[error("Invalid children list: {0}")]
    InvalidChildren(String),

    #[error("{field} must be between 0 and {MAX_SCORE}, got {value}")]
    ScoreOutOfRange { field: String, value: u8 },
}

/// Closed set of node kinds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    Goal,
    Project,
    Task,
    Idea,
    #[default]
    Thought,
    Note,
    Question,
    Habit,
}

impl NodeType {
    pub const ALL: [NodeType; 8] = [
        NodeType::Goal,
        NodeType::Project,
        NodeType::Task,
        NodeType::Idea,
        NodeType::Thought,
        NodeType::Note,
        NodeType::Question,
        NodeType::Habit,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Goal => "goal",
            NodeType::Project => "project",
            NodeType::Task => "task",
            NodeType::Idea => "idea",
            NodeType::Thought => "thought",
            NodeType::Note => "note",
            NodeType::Question => "question",
            NodeType::Habit => "habit",
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NodeType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ValidationError::InvalidNodeType(s.to_string()))
    }
}

/// Kind of an activity-log entry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateKind {
    #[default]
    Note,
    Status,
    Progress,
}

/// One entry in a node's append-only activity log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeUpdate {
    pub id: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub user_id: String,
    #[serde(default)]
    pub author: String,
    #[serde(rename = "type", default)]
    pub kind: UpdateKind,
    #[serde(default)]
    pub is_pinned: bool,
}

/// Caller-supplied part of a new [`NodeUpdate`]
#[derive(Debug, Clone, Default)]
pub struct NodeUpdateDraft {
    pub content: String,
    pub author: String,
    pub kind: UpdateKind,
    pub is_pinned: bool,
}

impl NodeUpdateDraft {
    pub fn note(content: impl Into<String>, author: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            author: author.into(),
            ..Default::default()
        }
    }

    pub fn with_kind(mut self, kind: UpdateKind) -> Self {
        self.kind = kind;
        self
    }
}

/// Hierarchical task/idea entity.
///
/// # Fields
///
/// - `parent`: id of at most one other node (see invariant in [`NodeArena`](super::NodeArena))
/// - `children`: ordered ids, treated as a set
/// - `is_optimistic`: only set while a create is in flight, never serialized
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: String,

    pub user_id: String,

    #[serde(default = "default_title")]
    pub title: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(rename = "type", default)]
    pub node_type: NodeType,

    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub urgency: Option<u8>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub importance: Option<u8>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,

    #[serde(default)]
    pub children: Vec<String>,

    #[serde(default)]
    pub completed: bool,

    #[serde(default)]
    pub is_pinned: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snoozed_until: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recurrence: Option<Recurrence>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recurring_completions: Vec<RecurringCompletion>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_recurring_completion_date: Option<NaiveDate>,

    #[serde(default)]
    pub updates: Vec<NodeUpdate>,

    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,

    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,

    #[serde(skip)]
    pub is_optimistic: bool,
}

impl Node {
    /// Validate node structure and value ranges
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if:
    /// - `id` or `user_id` is empty
    /// - the node references itself as parent or child
    /// - `urgency` / `importance` exceed [`MAX_SCORE`]
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.id.is_empty() {
            return Err(ValidationError::MissingField("id".to_string()));
        }

        if self.user_id.is_empty() {
            return Err(ValidationError::MissingField("userId".to_string()));
        }

        if self.parent.as_deref() == Some(self.id.as_str()) {
            return Err(ValidationError::InvalidParent(
                "Node cannot be its own parent".to_string(),
            ));
        }

        if self.children.iter().any(|child| child == &self.id) {
            return Err(ValidationError::InvalidChildren(
                "Node cannot be its own child".to_string(),
            ));
        }

        check_score("urgency", self.urgency)?;
        check_score("importance", self.importance)?;

        Ok(())
    }

    /// Derived ordering score in `0..=100`; unset scores count as zero
    pub fn priority_score(&self) -> u16 {
        u16::from(self.urgency.unwrap_or(0)) * u16::from(self.importance.unwrap_or(0))
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    /// True while `snoozed_until` lies strictly after `now`
    pub fn is_snoozed_at(&self, now: DateTime<Utc>) -> bool {
        self.snoozed_until.is_some_and(|until| until > now)
    }

    pub fn find_update(&self, update_id: &str) -> Option<&NodeUpdate> {
        self.updates.iter().find(|u| u.id == update_id)
    }
}

pub(crate) fn check_score(field: &str, value: Option<u8>) -> Result<(), ValidationError> {
    match value {
        Some(v) if v > MAX_SCORE => Err(ValidationError::ScoreOutOfRange {
            field: field.to_string(),
            value: v,
        }),
        _ => Ok(()),
    }
}

/// Partial node supplied by callers of `create_node`
///
/// Unset fields receive store defaults (title, type, tags) when the draft is
/// turned into a [`Node`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeDraft {
    pub user_id: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub node_type: Option<NodeType>,
    pub tags: Option<Vec<String>>,
    pub urgency: Option<u8>,
    pub importance: Option<u8>,
    pub parent: Option<String>,
    pub children: Vec<String>,
    pub completed: Option<bool>,
    pub is_pinned: bool,
    pub recurrence: Option<Recurrence>,
}

impl NodeDraft {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            ..Default::default()
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_node_type(mut self, node_type: NodeType) -> Self {
        self.node_type = Some(node_type);
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = Some(tags.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_scores(mut self, urgency: u8, importance: u8) -> Self {
        self.urgency = Some(urgency);
        self.importance = Some(importance);
        self
    }

    pub fn with_recurrence(mut self, recurrence: Recurrence) -> Self {
        self.recurrence = Some(recurrence);
        self
    }

    /// Materialize the draft with a fresh UUID and the given defaults
    pub fn into_node(
        self,
        default_title: &str,
        default_type: NodeType,
        default_tags: &[String],
        now: DateTime<Utc>,
    ) -> Node {
        let mut tags = self.tags.unwrap_or_else(|| default_tags.to_vec());
        dedup_preserving_order(&mut tags);

        Node {
            id: Uuid::new_v4().to_string(),
            user_id: self.user_id,
            title: self
                .title
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| default_title.to_string()),
            description: self.description,
            node_type: self.node_type.unwrap_or(default_type),
            tags,
            urgency: self.urgency,
            importance: self.importance,
            parent: self.parent,
            children: self.children,
            completed: self.completed.unwrap_or(false),
            is_pinned: self.is_pinned,
            snoozed_until: None,
            recurrence: self.recurrence,
            recurring_completions: Vec::new(),
            last_recurring_completion_date: None,
            updates: Vec::new(),
            created_at: now,
            updated_at: now,
            is_optimistic: false,
        }
    }
}

fn default_title() -> String {
    "Untitled".to_string()
}

fn dedup_preserving_order(values: &mut Vec<String>) {
    let mut seen = std::collections::HashSet::new();
    values.retain(|v| seen.insert(v.clone()));
}
