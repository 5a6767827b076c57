//! Activity-log entries attached to a node

use super::NodeStore;
use crate::models::{NodePatch, NodeUpdate, NodeUpdateDraft};
use crate::services::error::NodeStoreError;
use uuid::Uuid;

impl NodeStore {
    /// Append an entry to the node's log and return the entry id.
    ///
    /// The entry inherits the node's `user_id` and is stamped with the
    /// store clock.
    pub async fn add_node_update(
        &self,
        node_id: &str,
        draft: NodeUpdateDraft,
    ) -> Result<String, NodeStoreError> {
        let update_id = Uuid::new_v4().to_string();
        let timestamp = self.now();

        let entry_id = update_id.clone();
        self.modify_node(node_id, move |node| {
            let mut updates = node.updates.clone();
            updates.push(NodeUpdate {
                id: entry_id,
                content: draft.content,
                timestamp,
                user_id: node.user_id.clone(),
                author: draft.author,
                kind: draft.kind,
                is_pinned: draft.is_pinned,
            });
            Ok(NodePatch::new().with_updates(updates))
        })
        .await?;

        Ok(update_id)
    }

    pub async fn remove_node_update(
        &self,
        node_id: &str,
        update_id: &str,
    ) -> Result<(), NodeStoreError> {
        self.modify_node(node_id, |node| {
            if node.find_update(update_id).is_none() {
                return Err(NodeStoreError::update_not_found(node_id, update_id));
            }
            let updates = node
                .updates
                .iter()
                .filter(|u| u.id != update_id)
                .cloned()
                .collect();
            Ok(NodePatch::new().with_updates(updates))
        })
        .await?;
        Ok(())
    }

    /// Flip `is_pinned` on one log entry; returns the new pin state
    pub async fn toggle_update_pin(
        &self,
        node_id: &str,
        update_id: &str,
    ) -> Result<bool, NodeStoreError> {
        let node = self
            .modify_node(node_id, |node| {
                if node.find_update(update_id).is_none() {
                    return Err(NodeStoreError::update_not_found(node_id, update_id));
                }
                let updates = node
                    .updates
                    .iter()
                    .cloned()
                    .map(|mut u| {
                        if u.id == update_id {
                            u.is_pinned = !u.is_pinned;
                        }
                        u
                    })
                    .collect();
                Ok(NodePatch::new().with_updates(updates))
            })
            .await?;

        Ok(node
            .find_update(update_id)
            .is_some_and(|u| u.is_pinned))
    }
}

#[cfg(test)]
mod tests {
    use crate::db::InMemoryDocumentStore;
    use crate::models::{NodeDraft, NodeUpdateDraft, UpdateKind};
    use crate::services::{NodeStore, NodeStoreError};
    use std::sync::Arc;

    async fn store_with_node() -> (NodeStore, String) {
        let store = NodeStore::new(Arc::new(InMemoryDocumentStore::new()));
        let id = store
            .create_node(NodeDraft::new("user-1").with_title("Log me"))
            .await
            .unwrap();
        (store, id)
    }

    #[tokio::test]
    async fn test_add_update_inherits_user_and_kind() {
        let (store, id) = store_with_node().await;

        let update_id = store
            .add_node_update(
                &id,
                NodeUpdateDraft::note("Halfway there", "sam").with_kind(UpdateKind::Progress),
            )
            .await
            .unwrap();

        let node = store.get_node_by_id(&id).unwrap();
        let entry = node.find_update(&update_id).unwrap();
        assert_eq!(entry.user_id, "user-1");
        assert_eq!(entry.author, "sam");
        assert_eq!(entry.kind, UpdateKind::Progress);
        assert!(!entry.is_pinned);
    }

    #[tokio::test]
    async fn test_remove_missing_update_fails() {
        let (store, id) = store_with_node().await;

        let result = store.remove_node_update(&id, "nope").await;

        assert!(matches!(result, Err(NodeStoreError::UpdateNotFound { .. })));
        assert!(store.state().error.is_some());
    }

    #[tokio::test]
    async fn test_remove_and_pin_updates() {
        let (store, id) = store_with_node().await;
        let first = store
            .add_node_update(&id, NodeUpdateDraft::note("one", "a"))
            .await
            .unwrap();
        let second = store
            .add_node_update(&id, NodeUpdateDraft::note("two", "a"))
            .await
            .unwrap();

        assert!(store.toggle_update_pin(&id, &second).await.unwrap());
        store.remove_node_update(&id, &first).await.unwrap();

        let node = store.get_node_by_id(&id).unwrap();
        assert_eq!(node.updates.len(), 1);
        assert_eq!(node.updates[0].id, second);
        assert!(node.updates[0].is_pinned);
    }
}
