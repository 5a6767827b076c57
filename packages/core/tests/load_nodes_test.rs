//! Load Tests
//!
//! Loading a user's collection from raw documents: timestamp normalization,
//! ordering, skipped documents and failure handling.

#[cfg(test)]
mod load_nodes_tests {
    use anyhow::Result;
    use chrono::{TimeZone, Utc};
    use nodegraph_core::db::InMemoryDocumentStore;
    use nodegraph_core::models::{MockTimeProvider, NodeType};
    use nodegraph_core::services::{NodeStore, NodeStoreError};
    use serde_json::{json, Map, Value};
    use std::sync::Arc;

    const USER: &str = "user-1";

    fn fields(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("fields must be an object"),
        }
    }

    fn seeded_store() -> Arc<InMemoryDocumentStore> {
        let persistence = Arc::new(InMemoryDocumentStore::new());
        persistence.seed(
            USER,
            "old",
            fields(json!({
                "userId": USER,
                "title": "Old goal",
                "type": "goal",
                "tags": ["work"],
                "createdAt": { "seconds": 1_700_000_000, "nanoseconds": 0 },
                "updatedAt": { "_seconds": 1_700_000_000, "_nanoseconds": 0 },
            })),
        );
        persistence.seed(
            USER,
            "new",
            fields(json!({
                "userId": USER,
                "title": "New idea",
                "type": "idea",
                "tags": ["work", "later"],
                "description": null,
                "createdAt": 1_710_000_000_000i64,
                "snoozedUntil": "2030-01-01T00:00:00Z",
            })),
        );
        persistence.seed(USER, "broken", fields(json!({ "title": 42 })));
        persistence
    }

    #[tokio::test]
    async fn test_load_normalizes_and_orders_documents() -> Result<()> {
        let store = NodeStore::new(seeded_store());

        let count = store.load_nodes(USER).await?;

        assert_eq!(count, 2);
        let state = store.state();
        assert!(!state.is_loading);
        assert!(state.error.is_none());
        assert_eq!(state.nodes.ids(), ["new".to_string(), "old".to_string()]);

        let old = state.nodes.get("old").unwrap();
        assert_eq!(old.node_type, NodeType::Goal);
        assert_eq!(old.created_at, Utc.timestamp_opt(1_700_000_000, 0).unwrap());

        let new = state.nodes.get("new").unwrap();
        assert!(new.description.is_none());
        assert_eq!(
            new.snoozed_until,
            Some(Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap())
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_queries_over_loaded_collection() -> Result<()> {
        let clock = Arc::new(MockTimeProvider::with_time(
            Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap(),
        ));
        let store = NodeStore::new(seeded_store()).with_clock(clock);
        store.load_nodes(USER).await?;

        assert_eq!(store.get_nodes_by_tag("work").len(), 2);
        assert_eq!(store.get_nodes_by_tag("later").len(), 1);
        assert_eq!(store.get_nodes_by_type(NodeType::Goal)[0].id, "old");
        assert!(store.get_nodes_by_type(NodeType::Habit).is_empty());
        assert_eq!(store.get_snoozed_nodes()[0].id, "new");
        assert_eq!(store.get_active_snoozed_count(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_load_keeps_selection_only_if_present() -> Result<()> {
        let store = NodeStore::new(seeded_store());

        store.select_node(Some("old"));
        store.load_nodes(USER).await?;
        assert_eq!(store.state().selected_node_id.as_deref(), Some("old"));

        store.select_node(Some("gone"));
        store.load_nodes(USER).await?;
        assert!(store.state().selected_node_id.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_load_requires_user() -> Result<()> {
        let store = NodeStore::new(seeded_store());

        let result = store.load_nodes("  ").await;

        assert!(matches!(result, Err(NodeStoreError::AuthRequired)));
        assert!(store.state().nodes.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_load_leaves_empty_collection() -> Result<()> {
        let persistence = seeded_store();
        let store = NodeStore::new(persistence.clone());
        store.load_nodes(USER).await?;

        persistence.set_fail_reads(true);
        let result = store.load_nodes(USER).await;

        assert!(matches!(result, Err(NodeStoreError::Persistence(_))));
        let state = store.state();
        assert!(state.nodes.is_empty());
        assert!(!state.is_loading);
        assert!(state.error.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn test_sparse_document_loads_with_defaults() -> Result<()> {
        let persistence = Arc::new(InMemoryDocumentStore::new());
        persistence.seed(
            USER,
            "sparse",
            fields(json!({ "createdAt": "2024-05-01T00:00:00Z" })),
        );
        let store = NodeStore::new(persistence);

        assert_eq!(store.load_nodes(USER).await?, 1);

        let node = store.get_node_by_id("sparse").unwrap();
        assert_eq!(node.title, "Untitled");
        assert_eq!(node.user_id, USER);
        assert_eq!(node.node_type, NodeType::Thought);
        Ok(())
    }

    #[tokio::test]
    async fn test_other_users_are_not_loaded() -> Result<()> {
        let store = NodeStore::new(seeded_store());

        assert_eq!(store.load_nodes("someone-else").await?, 0);
        assert!(store.state().nodes.is_empty());
        Ok(())
    }
}
