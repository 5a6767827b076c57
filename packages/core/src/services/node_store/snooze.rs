//! Time-gated deferral
//!
//! A node is snoozed while `snoozed_until` lies strictly after the store
//! clock's `now()`.

use super::NodeStore;
use crate::models::{Node, NodePatch};
use crate::services::error::NodeStoreError;
use chrono::{DateTime, Utc};

impl NodeStore {
    pub async fn snooze_node(
        &self,
        id: &str,
        until: DateTime<Utc>,
    ) -> Result<Node, NodeStoreError> {
        self.modify_node(id, |_| Ok(NodePatch::new().with_snoozed_until(Some(until))))
            .await
    }

    pub async fn unsnooze_node(&self, id: &str) -> Result<Node, NodeStoreError> {
        self.modify_node(id, |node| {
            if node.snoozed_until.is_none() {
                return Ok(NodePatch::new());
            }
            Ok(NodePatch::new().with_snoozed_until(None))
        })
        .await
    }

    /// Nodes currently snoozed
    pub fn get_snoozed_nodes(&self) -> Vec<Node> {
        let now = self.now();
        self.state()
            .nodes
            .iter()
            .filter(|n| n.is_snoozed_at(now))
            .cloned()
            .collect()
    }

    pub fn get_active_snoozed_count(&self) -> usize {
        let now = self.now();
        self.state()
            .nodes
            .iter()
            .filter(|n| n.is_snoozed_at(now))
            .count()
    }

    /// Clear `snoozed_until` on every node whose snooze has lapsed.
    ///
    /// Updates run one after another. A failure does not stop the sweep;
    /// the first error is returned once every node has been tried.
    pub async fn clear_expired_snoozes(&self) -> Result<usize, NodeStoreError> {
        let now = self.now();
        let expired: Vec<String> = self
            .state()
            .nodes
            .iter()
            .filter(|n| n.snoozed_until.is_some_and(|until| until <= now))
            .map(|n| n.id.clone())
            .collect();

        let mut cleared = 0;
        let mut first_error = None;
        for id in &expired {
            match self.unsnooze_node(id).await {
                Ok(_) => cleared += 1,
                Err(err) => {
                    tracing::warn!("Failed to clear expired snooze on '{}': {}", id, err);
                    first_error.get_or_insert(err);
                }
            }
        }

        if cleared > 0 {
            tracing::info!("Cleared {} expired snooze(s)", cleared);
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(cleared),
        }
    }
}
