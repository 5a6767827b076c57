//! Partial node updates
//!
//! [`NodePatch`] is the PATCH payload for a single node. It is applied to the
//! in-memory copy optimistically and serialized as the document patch sent to
//! the persistence collaborator.

use super::node::{check_score, Node, NodeType, NodeUpdate, ValidationError};
use super::recurrence::{Recurrence, RecurringCompletion};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Accept both a plain value and an explicit null for double-Option fields.
///
/// - Missing field → None (don't update)
/// - null → Some(None) (clear)
/// - "value" → Some(Some("value")) (set)
fn deserialize_optional_field<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Some(Option::<T>::deserialize(deserializer)?))
}

/// Partial node update structure for PATCH operations
///
/// # Double-Option Pattern for Nullable Fields
///
/// - `None`: Don't change this field (omitted from the document patch)
/// - `Some(None)`: Clear the field (written as null)
/// - `Some(Some(value))`: Set the field
///
/// # Examples
///
/// ```rust
/// # use nodegraph_core::models::NodePatch;
/// // Detach from the current parent
/// let patch = NodePatch::new().with_parent(None);
/// assert_eq!(patch.parent, Some(None));
///
/// let json = serde_json::to_value(&patch).unwrap();
/// assert!(json["parent"].is_null());
/// assert!(json.get("title").is_none());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_optional_field"
    )]
    pub description: Option<Option<String>>,

    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub node_type: Option<NodeType>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_optional_field"
    )]
    pub urgency: Option<Option<u8>>,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_optional_field"
    )]
    pub importance: Option<Option<u8>>,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_optional_field"
    )]
    pub parent: Option<Option<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_pinned: Option<bool>,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_optional_field"
    )]
    pub snoozed_until: Option<Option<DateTime<Utc>>>,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_optional_field"
    )]
    pub recurrence: Option<Option<Recurrence>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub recurring_completions: Option<Vec<RecurringCompletion>>,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_optional_field"
    )]
    pub last_recurring_completion_date: Option<Option<NaiveDate>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub updates: Option<Vec<NodeUpdate>>,
}

impl NodePatch {
    /// Create a new empty NodePatch
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = Some(description);
        self
    }

    pub fn with_node_type(mut self, node_type: NodeType) -> Self {
        self.node_type = Some(node_type);
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = Some(tags);
        self
    }

    pub fn with_scores(mut self, urgency: Option<u8>, importance: Option<u8>) -> Self {
        self.urgency = Some(urgency);
        self.importance = Some(importance);
        self
    }

    pub fn with_parent(mut self, parent: Option<String>) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn with_children(mut self, children: Vec<String>) -> Self {
        self.children = Some(children);
        self
    }

    pub fn with_completed(mut self, completed: bool) -> Self {
        self.completed = Some(completed);
        self
    }

    pub fn with_pinned(mut self, is_pinned: bool) -> Self {
        self.is_pinned = Some(is_pinned);
        self
    }

    pub fn with_snoozed_until(mut self, until: Option<DateTime<Utc>>) -> Self {
        self.snoozed_until = Some(until);
        self
    }

    pub fn with_recurrence(mut self, recurrence: Option<Recurrence>) -> Self {
        self.recurrence = Some(recurrence);
        self
    }

    pub fn with_recurring_completions(
        mut self,
        completions: Vec<RecurringCompletion>,
        last_completed: Option<NaiveDate>,
    ) -> Self {
        self.recurring_completions = Some(completions);
        self.last_recurring_completion_date = Some(last_completed);
        self
    }

    pub fn with_updates(mut self, updates: Vec<NodeUpdate>) -> Self {
        self.updates = Some(updates);
        self
    }

    /// Check if patch contains any changes
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.node_type.is_none()
            && self.tags.is_none()
            && self.urgency.is_none()
            && self.importance.is_none()
            && self.parent.is_none()
            && self.children.is_none()
            && self.completed.is_none()
            && self.is_pinned.is_none()
            && self.snoozed_until.is_none()
            && self.recurrence.is_none()
            && self.recurring_completions.is_none()
            && self.last_recurring_completion_date.is_none()
            && self.updates.is_none()
    }

    /// True if the patch rewrites `parent` or `children`
    pub fn touches_hierarchy(&self) -> bool {
        self.parent.is_some() || self.children.is_some()
    }

    /// Range checks that do not need the target node
    pub fn validate(&self) -> Result<(), ValidationError> {
        check_score("urgency", self.urgency.flatten())?;
        check_score("importance", self.importance.flatten())?;
        Ok(())
    }

    /// Merge the patch into `node` and stamp `updated_at`
    pub fn apply_to(&self, node: &mut Node, now: DateTime<Utc>) {
        if let Some(title) = &self.title {
            node.title = title.clone();
        }
        if let Some(description) = &self.description {
            node.description = description.clone();
        }
        if let Some(node_type) = self.node_type {
            node.node_type = node_type;
        }
        if let Some(tags) = &self.tags {
            node.tags = tags.clone();
        }
        if let Some(urgency) = self.urgency {
            node.urgency = urgency;
        }
        if let Some(importance) = self.importance {
            node.importance = importance;
        }
        if let Some(parent) = &self.parent {
            node.parent = parent.clone();
        }
        if let Some(children) = &self.children {
            node.children = children.clone();
        }
        if let Some(completed) = self.completed {
            node.completed = completed;
        }
        if let Some(is_pinned) = self.is_pinned {
            node.is_pinned = is_pinned;
        }
        if let Some(until) = self.snoozed_until {
            node.snoozed_until = until;
        }
        if let Some(recurrence) = &self.recurrence {
            node.recurrence = recurrence.clone();
        }
        if let Some(completions) = &self.recurring_completions {
            node.recurring_completions = completions.clone();
        }
        if let Some(last) = self.last_recurring_completion_date {
            node.last_recurring_completion_date = last;
        }
        if let Some(updates) = &self.updates {
            node.updates = updates.clone();
        }
        node.updated_at = now;
    }
}
