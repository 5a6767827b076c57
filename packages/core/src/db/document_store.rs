//! Persistence collaborator contract and an in-memory implementation
//!
//! The remote document database is external to this crate. It is consumed
//! through [`DocumentStore`]; production code supplies a network-backed
//! implementation, tests and demos use [`InMemoryDocumentStore`].

use super::document::{DocRef, DocumentFields, FieldValue, RawDocument, WriteBatch, WriteOp};
use super::error::PersistenceError;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::time::{sleep, Duration};

/// Per-user keyed document collection
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// All node documents of `user_id`, newest `createdAt` first
    async fn fetch_all(&self, user_id: &str) -> Result<Vec<RawDocument>, PersistenceError>;

    /// Create (or overwrite) one document
    async fn create(
        &self,
        user_id: &str,
        id: &str,
        fields: DocumentFields,
    ) -> Result<(), PersistenceError>;

    /// Merge `fields` into an existing document
    async fn patch(
        &self,
        user_id: &str,
        id: &str,
        fields: DocumentFields,
    ) -> Result<(), PersistenceError>;

    /// Apply every op of `batch` or none of them
    async fn commit(&self, batch: WriteBatch) -> Result<(), PersistenceError>;
}

#[derive(Debug, Clone)]
struct StoredDocument {
    fields: Map<String, Value>,
    sequence: u64,
}

#[derive(Debug, Default)]
struct Collections {
    users: HashMap<String, HashMap<String, StoredDocument>>,
    next_sequence: u64,
}

/// In-memory [`DocumentStore`] for tests and early development.
///
/// Resolves [`FieldValue::ServerTimestamp`] to a `{"seconds", "nanoseconds"}`
/// wrapper the way hosted document stores do, and supports failure injection
/// and simulated network latency.
pub struct InMemoryDocumentStore {
    collections: Mutex<Collections>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    fail_next_writes: AtomicUsize,
    /// Writes left until one fails, plus one; zero when disarmed
    fail_after: AtomicUsize,
    writes: AtomicUsize,
    latency: Option<Duration>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self {
            collections: Mutex::new(Collections::default()),
            fail_reads: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
            fail_next_writes: AtomicUsize::new(0),
            fail_after: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
            latency: None,
        }
    }

    /// Delay every call by `latency` before touching data
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency: Some(latency),
            ..Self::new()
        }
    }

    /// Make every subsequent write fail until reset
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent `fetch_all` fail until reset
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Fail exactly the next `count` writes
    pub fn fail_next_writes(&self, count: usize) {
        self.fail_next_writes.store(count, Ordering::SeqCst);
    }

    /// Let `successes` more writes through, then fail exactly one
    pub fn fail_write_after(&self, successes: usize) {
        self.fail_after.store(successes + 1, Ordering::SeqCst);
    }

    /// Number of successful write calls (create, patch, commit)
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Stored fields of one document, as the backend holds them
    pub fn document(&self, user_id: &str, id: &str) -> Option<Map<String, Value>> {
        self.lock()
            .users
            .get(user_id)
            .and_then(|docs| docs.get(id))
            .map(|doc| doc.fields.clone())
    }

    pub fn document_count(&self, user_id: &str) -> usize {
        self.lock().users.get(user_id).map_or(0, HashMap::len)
    }

    /// Insert raw fields directly, bypassing failure injection
    pub fn seed(&self, user_id: &str, id: &str, fields: Map<String, Value>) {
        let mut collections = self.lock();
        let sequence = collections.next_sequence;
        collections.next_sequence += 1;
        collections
            .users
            .entry(user_id.to_string())
            .or_default()
            .insert(id.to_string(), StoredDocument { fields, sequence });
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Collections> {
        self.collections
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn simulate_network_delay(&self) {
        if let Some(latency) = self.latency {
            sleep(latency).await;
        }
    }

    fn check_write(&self) -> Result<(), PersistenceError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(PersistenceError::unavailable("simulated write failure"));
        }
        let consumed = self
            .fail_next_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if consumed.is_ok() {
            return Err(PersistenceError::unavailable("simulated write failure"));
        }
        let countdown = self
            .fail_after
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if countdown == Ok(1) {
            return Err(PersistenceError::unavailable("simulated write failure"));
        }
        Ok(())
    }

    fn resolve(fields: DocumentFields) -> Map<String, Value> {
        let now = Utc::now();
        let server_time = json!({
            "seconds": now.timestamp(),
            "nanoseconds": now.timestamp_subsec_nanos(),
        });
        fields
            .into_iter()
            .map(|(key, value)| match value {
                FieldValue::Value(v) => (key, v),
                FieldValue::ServerTimestamp => (key, server_time.clone()),
            })
            .collect()
    }

    fn created_seconds(fields: &Map<String, Value>) -> (i64, u64) {
        fields
            .get("createdAt")
            .and_then(super::document::normalize_timestamp)
            .map(|ts| (ts.timestamp(), u64::from(ts.timestamp_subsec_nanos())))
            .unwrap_or((0, 0))
    }

    fn apply_ops(
        collections: &mut Collections,
        ops: Vec<WriteOp>,
    ) -> Result<(), PersistenceError> {
        for op in ops {
            match op {
                WriteOp::Update { doc, fields } => {
                    let stored = collections
                        .users
                        .get_mut(&doc.user_id)
                        .and_then(|docs| docs.get_mut(&doc.id))
                        .ok_or_else(|| {
                            PersistenceError::document_not_found(&doc.user_id, &doc.id)
                        })?;
                    stored.fields.extend(Self::resolve(fields));
                }
                WriteOp::Delete(DocRef { user_id, id }) => {
                    if let Some(docs) = collections.users.get_mut(&user_id) {
                        docs.remove(&id);
                    }
                }
            }
        }
        Ok(())
    }
}

impl Default for InMemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn fetch_all(&self, user_id: &str) -> Result<Vec<RawDocument>, PersistenceError> {
        self.simulate_network_delay().await;

        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(PersistenceError::unavailable("simulated read failure"));
        }

        let collections = self.lock();
        let mut docs: Vec<(&String, &StoredDocument)> = collections
            .users
            .get(user_id)
            .map(|docs| docs.iter().collect())
            .unwrap_or_default();

        docs.sort_by(|(_, a), (_, b)| {
            Self::created_seconds(&b.fields)
                .cmp(&Self::created_seconds(&a.fields))
                .then(b.sequence.cmp(&a.sequence))
        });

        Ok(docs
            .into_iter()
            .map(|(id, doc)| RawDocument {
                id: id.clone(),
                fields: doc.fields.clone(),
            })
            .collect())
    }

    async fn create(
        &self,
        user_id: &str,
        id: &str,
        fields: DocumentFields,
    ) -> Result<(), PersistenceError> {
        self.simulate_network_delay().await;
        self.check_write()?;

        let mut collections = self.lock();
        let sequence = collections.next_sequence;
        collections.next_sequence += 1;
        collections
            .users
            .entry(user_id.to_string())
            .or_default()
            .insert(
                id.to_string(),
                StoredDocument {
                    fields: Self::resolve(fields),
                    sequence,
                },
            );
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn patch(
        &self,
        user_id: &str,
        id: &str,
        fields: DocumentFields,
    ) -> Result<(), PersistenceError> {
        self.simulate_network_delay().await;
        self.check_write()?;

        let mut collections = self.lock();
        Self::apply_ops(
            &mut collections,
            vec![WriteOp::Update {
                doc: DocRef::new(user_id, id),
                fields,
            }],
        )?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn commit(&self, batch: WriteBatch) -> Result<(), PersistenceError> {
        self.simulate_network_delay().await;
        self.check_write()?;

        let mut collections = self.lock();
        // Stage on a copy so a failing op leaves nothing applied
        let mut staged = Collections {
            users: collections.users.clone(),
            next_sequence: collections.next_sequence,
        };
        Self::apply_ops(&mut staged, batch.into_ops())?;
        *collections = staged;
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(pairs: &[(&str, Value)]) -> DocumentFields {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), FieldValue::Value(v.clone())))
            .collect()
    }

    #[tokio::test]
    async fn test_create_resolves_server_timestamp() {
        let store = InMemoryDocumentStore::new();
        let mut f = fields(&[("title", json!("A"))]);
        f.insert("createdAt".to_string(), FieldValue::ServerTimestamp);

        store.create("u", "a", f).await.unwrap();

        let doc = store.document("u", "a").unwrap();
        assert!(doc["createdAt"]["seconds"].is_i64());
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn test_fetch_all_newest_first() {
        let store = InMemoryDocumentStore::new();
        store.seed(
            "u",
            "old",
            Map::from_iter([("createdAt".to_string(), json!("2024-01-01T00:00:00Z"))]),
        );
        store.seed(
            "u",
            "new",
            Map::from_iter([("createdAt".to_string(), json!("2024-02-01T00:00:00Z"))]),
        );

        let docs = store.fetch_all("u").await.unwrap();
        let ids: Vec<&str> = docs.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["new", "old"]);
        assert!(store.fetch_all("someone-else").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_patch_missing_document_fails() {
        let store = InMemoryDocumentStore::new();
        let err = store
            .patch("u", "ghost", fields(&[("title", json!("x"))]))
            .await
            .unwrap_err();
        assert!(matches!(err, PersistenceError::DocumentNotFound { .. }));
    }

    #[tokio::test]
    async fn test_batch_is_atomic() {
        let store = InMemoryDocumentStore::new();
        store.seed("u", "a", Map::from_iter([("title".to_string(), json!("A"))]));

        let mut batch = WriteBatch::new();
        batch
            .update(DocRef::new("u", "a"), fields(&[("title", json!("changed"))]))
            .update(DocRef::new("u", "missing"), fields(&[("title", json!("x"))]));

        assert!(store.commit(batch).await.is_err());
        assert_eq!(store.document("u", "a").unwrap()["title"], json!("A"));
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let store = InMemoryDocumentStore::new();
        store.fail_next_writes(1);

        assert!(store.create("u", "a", DocumentFields::new()).await.is_err());
        assert!(store.create("u", "a", DocumentFields::new()).await.is_ok());

        store.set_fail_reads(true);
        assert!(store.fetch_all("u").await.is_err());
    }

    #[tokio::test]
    async fn test_fail_write_after_skips_then_fails_once() {
        let store = InMemoryDocumentStore::new();
        store.fail_write_after(1);

        assert!(store.create("u", "a", DocumentFields::new()).await.is_ok());
        assert!(store.create("u", "b", DocumentFields::new()).await.is_err());
        assert!(store.create("u", "c", DocumentFields::new()).await.is_ok());
        assert_eq!(store.document_count("u"), 2);
    }
}
