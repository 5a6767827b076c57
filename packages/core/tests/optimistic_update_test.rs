//! Optimistic Mutation Tests
//!
//! Verifies the apply / persist / confirm-or-restore protocol: local state
//! changes before the write resolves, failed writes restore the exact prior
//! state, transient errors clear themselves, and concurrent mutations of one
//! node never clobber each other's rollback.

#[cfg(test)]
mod optimistic_update_tests {
    use anyhow::Result;
    use chrono::NaiveDate;
    use nodegraph_core::db::{DomainEvent, InMemoryDocumentStore};
    use nodegraph_core::models::{NodeDraft, NodePatch};
    use nodegraph_core::services::{NodeStore, NodeStoreError, StoreConfig};
    use std::sync::Arc;
    use tokio::time::{sleep, timeout, Duration};

    const USER: &str = "user-1";

    fn setup_with_delay(clear_delay_ms: u64) -> Result<(NodeStore, Arc<InMemoryDocumentStore>)> {
        let persistence = Arc::new(InMemoryDocumentStore::new());
        let config =
            StoreConfig::default().with_error_clear_delay(Duration::from_millis(clear_delay_ms));
        let store = NodeStore::with_config(persistence.clone(), config)?;
        Ok((store, persistence))
    }

    #[tokio::test]
    async fn test_create_is_visible_before_write_resolves() -> Result<()> {
        let persistence = Arc::new(InMemoryDocumentStore::with_latency(Duration::from_millis(50)));
        let store = NodeStore::new(persistence.clone());

        let pending = tokio::spawn({
            let store = store.clone();
            async move {
                store
                    .create_node(NodeDraft::new(USER).with_title("Fast"))
                    .await
            }
        });
        sleep(Duration::from_millis(10)).await;

        let visible: Vec<_> = store.state().nodes.iter().cloned().collect();
        assert_eq!(visible.len(), 1);
        assert!(visible[0].is_optimistic);
        assert_eq!(persistence.document_count(USER), 0);

        let id = pending.await??;
        let node = store.get_node_by_id(&id).unwrap();
        assert!(!node.is_optimistic);
        assert_eq!(persistence.document_count(USER), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_create_applies_defaults() -> Result<()> {
        let (store, persistence) = setup_with_delay(5_000)?;

        let id = store.create_node(NodeDraft::new(USER).with_title("  ")).await?;

        let node = store.get_node_by_id(&id).unwrap();
        assert_eq!(node.title, "Untitled");
        assert_eq!(node.tags, vec!["misc".to_string()]);
        let stored = persistence.document(USER, &id).unwrap();
        assert!(stored.get("id").is_none());
        assert!(stored["createdAt"].get("seconds").is_some());
        Ok(())
    }

    #[tokio::test]
    async fn test_create_requires_user() -> Result<()> {
        let (store, _) = setup_with_delay(5_000)?;

        let result = store.create_node(NodeDraft::new("")).await;

        assert!(matches!(result, Err(NodeStoreError::AuthRequired)));
        assert!(store.state().error.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_create_restores_collection() -> Result<()> {
        let (store, persistence) = setup_with_delay(5_000)?;
        store.create_node(NodeDraft::new(USER).with_title("Kept")).await?;
        let before = store.state().nodes.clone();

        persistence.set_fail_writes(true);
        let result = store.create_node(NodeDraft::new(USER).with_title("Lost")).await;

        assert!(matches!(result, Err(NodeStoreError::Persistence(_))));
        assert_eq!(store.state().nodes, before);
        assert!(store.state().error.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_update_restores_exact_snapshot() -> Result<()> {
        let (store, persistence) = setup_with_delay(5_000)?;
        let id = store
            .create_node(NodeDraft::new(USER).with_title("Original").with_scores(3, 4))
            .await?;
        let before = store.get_node_by_id(&id).unwrap();

        persistence.fail_next_writes(1);
        let result = store
            .update_node(
                &id,
                NodePatch::new()
                    .with_title("Changed")
                    .with_scores(None, Some(9)),
            )
            .await;

        assert!(result.is_err());
        assert_eq!(store.get_node_by_id(&id).unwrap(), before);

        let updated = store
            .update_node(&id, NodePatch::new().with_title("Changed"))
            .await?;
        assert_eq!(updated.title, "Changed");
        assert_eq!(updated.urgency, Some(3));
        assert!(updated.updated_at >= before.updated_at);
        Ok(())
    }

    #[tokio::test]
    async fn test_update_validation() -> Result<()> {
        let (store, _) = setup_with_delay(5_000)?;
        let id = store.create_node(NodeDraft::new(USER)).await?;

        assert!(matches!(
            store.update_node(&id, NodePatch::new()).await,
            Err(NodeStoreError::InvalidUpdate(_))
        ));
        assert!(matches!(
            store.update_node("missing", NodePatch::new().with_title("x")).await,
            Err(NodeStoreError::NodeNotFound { .. })
        ));
        assert!(matches!(
            store
                .update_node(&id, NodePatch::new().with_scores(Some(11), None))
                .await,
            Err(NodeStoreError::Validation(_))
        ));
        assert!(matches!(
            store
                .update_node(&id, NodePatch::new().with_parent(Some(id.clone())))
                .await,
            Err(NodeStoreError::Validation(_))
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_transient_error_clears_after_delay() -> Result<()> {
        let (store, persistence) = setup_with_delay(30)?;
        persistence.set_fail_writes(true);

        let _ = store.create_node(NodeDraft::new(USER)).await;
        assert!(store.state().error.is_some());

        sleep(Duration::from_millis(120)).await;
        assert!(store.state().error.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_concurrent_updates_of_one_node_are_serialized() -> Result<()> {
        let persistence = Arc::new(InMemoryDocumentStore::with_latency(Duration::from_millis(20)));
        let store = NodeStore::new(persistence.clone());
        let id = store
            .create_node(NodeDraft::new(USER).with_title("Original"))
            .await?;

        persistence.fail_next_writes(1);
        let (first, second) = tokio::join!(
            store.update_node(&id, NodePatch::new().with_title("From first")),
            store.update_node(
                &id,
                NodePatch::new().with_description(Some("From second".to_string()))
            ),
        );

        assert!(first.is_err());
        assert!(second.is_ok());
        let node = store.get_node_by_id(&id).unwrap();
        assert_eq!(node.title, "Original");
        assert_eq!(node.description.as_deref(), Some("From second"));
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_update_does_not_resurrect_deleted_node() -> Result<()> {
        let persistence = Arc::new(InMemoryDocumentStore::with_latency(Duration::from_millis(20)));
        let store = NodeStore::new(persistence.clone());
        let id = store.create_node(NodeDraft::new(USER).with_title("Doomed")).await?;

        persistence.fail_next_writes(1);
        let (updated, deleted) = tokio::join!(
            store.update_node(&id, NodePatch::new().with_title("Edited")),
            store.delete_node(&id),
        );

        assert!(matches!(updated, Err(NodeStoreError::Persistence(_))));
        deleted?;
        assert!(store.get_node_by_id(&id).is_none());
        assert_eq!(persistence.document_count(USER), 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_bulk_update_waits_for_in_flight_update() -> Result<()> {
        let persistence = Arc::new(InMemoryDocumentStore::with_latency(Duration::from_millis(20)));
        let store = NodeStore::new(persistence.clone());
        let id = store.create_node(NodeDraft::new(USER).with_title("Original")).await?;

        persistence.fail_next_writes(1);
        let (updated, bulk) = tokio::join!(
            store.update_node(&id, NodePatch::new().with_title("Edited")),
            store.bulk_update_nodes(vec![(id.clone(), NodePatch::new().with_title("Bulk"))]),
        );

        assert!(updated.is_err());
        assert_eq!(bulk?, 1);
        assert_eq!(store.get_node_by_id(&id).unwrap().title, "Bulk");
        assert_eq!(persistence.document(USER, &id).unwrap()["title"], "Bulk");
        Ok(())
    }

    #[tokio::test]
    async fn test_bulk_update_applies_after_commit() -> Result<()> {
        let (store, persistence) = setup_with_delay(5_000)?;
        let a = store.create_node(NodeDraft::new(USER).with_title("A")).await?;
        let b = store.create_node(NodeDraft::new(USER).with_title("B")).await?;
        let writes = persistence.write_count();

        let count = store
            .bulk_update_nodes(vec![
                (a.clone(), NodePatch::new().with_completed(true)),
                (b.clone(), NodePatch::new().with_pinned(true)),
            ])
            .await?;

        assert_eq!(count, 2);
        assert_eq!(persistence.write_count(), writes + 1);
        assert!(store.get_node_by_id(&a).unwrap().completed);
        assert!(store.get_node_by_id(&b).unwrap().is_pinned);
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_bulk_update_reloads_collection() -> Result<()> {
        let (store, persistence) = setup_with_delay(5_000)?;
        let a = store.create_node(NodeDraft::new(USER).with_title("A")).await?;
        let b = store.create_node(NodeDraft::new(USER).with_title("B")).await?;

        persistence.fail_next_writes(1);
        let result = store
            .bulk_update_nodes(vec![
                (a.clone(), NodePatch::new().with_title("A2")),
                (b.clone(), NodePatch::new().with_title("B2")),
            ])
            .await;

        assert!(matches!(result, Err(NodeStoreError::Persistence(_))));
        let state = store.state();
        assert_eq!(state.nodes.len(), 2);
        assert_eq!(state.nodes.get(&a).unwrap().title, "A");
        assert_eq!(state.nodes.get(&b).unwrap().title, "B");
        assert!(state.error.as_deref().unwrap().contains("Persistence failure"));
        Ok(())
    }

    #[tokio::test]
    async fn test_recurring_completion_is_idempotent_per_date() -> Result<()> {
        let (store, _) = setup_with_delay(5_000)?;
        let id = store.create_node(NodeDraft::new(USER).with_title("Stretch")).await?;
        let day = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();
        let next = NaiveDate::from_ymd_opt(2024, 3, 11).unwrap();

        store.complete_recurring_task(&id, day).await?;
        store.complete_recurring_task(&id, day).await?;
        let node = store.complete_recurring_task(&id, next).await?;
        assert_eq!(node.recurring_completions.len(), 2);
        assert_eq!(node.last_recurring_completion_date, Some(next));

        let node = store.uncomplete_recurring_task(&id, next).await?;
        assert_eq!(node.recurring_completions.len(), 1);
        assert_eq!(node.last_recurring_completion_date, Some(day));
        Ok(())
    }

    #[tokio::test]
    async fn test_toggles() -> Result<()> {
        let (store, _) = setup_with_delay(5_000)?;
        let id = store.create_node(NodeDraft::new(USER)).await?;

        assert!(store.toggle_node_completed(&id).await?.completed);
        assert!(store.toggle_node_pin(&id).await?);
        assert_eq!(store.get_pinned_nodes().len(), 1);
        assert!(!store.toggle_node_pin(&id).await?);
        Ok(())
    }

    #[tokio::test]
    async fn test_events_follow_confirmed_changes() -> Result<()> {
        let (store, persistence) = setup_with_delay(5_000)?;
        let mut rx = store.subscribe_to_events();

        let id = store.create_node(NodeDraft::new(USER)).await?;
        let event = timeout(Duration::from_secs(1), rx.recv()).await??;
        match event {
            DomainEvent::NodeCreated(node) => {
                assert_eq!(node.id, id);
                assert!(!node.is_optimistic);
            }
            other => panic!("Expected NodeCreated event, got {:?}", other),
        }

        persistence.fail_next_writes(1);
        let _ = store
            .update_node(&id, NodePatch::new().with_title("Nope"))
            .await;
        let event = timeout(Duration::from_secs(1), rx.recv()).await??;
        assert!(matches!(event, DomainEvent::NodeRolledBack { id: ref rolled, .. } if *rolled == id));

        store.clear_nodes();
        let event = timeout(Duration::from_secs(1), rx.recv()).await??;
        assert!(matches!(event, DomainEvent::NodesCleared));
        assert!(store.state().nodes.is_empty());
        Ok(())
    }
}
