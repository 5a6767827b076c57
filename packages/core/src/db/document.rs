//! Document encoding for the persistence collaborator
//!
//! Nodes live remotely as one document per node under `users/{uid}/nodes/{id}`.
//! This module converts between [`Node`]/[`NodePatch`] and the loosely typed
//! document fields the store exchanges.
//!
//! # Read normalization
//!
//! Providers wrap timestamps in their own shapes. On read every object of the
//! form `{"seconds", "nanoseconds"}` or `{"_seconds", "_nanoseconds"}` becomes
//! an RFC 3339 string, epoch milliseconds under the top-level timestamp keys
//! are converted the same way, and explicit nulls are dropped so that serde
//! defaults them to `None`.
//!
//! # Write encoding
//!
//! Absent optional fields are omitted. An explicit clear in a [`NodePatch`]
//! is written as null. `createdAt`/`updatedAt` are sent as
//! [`FieldValue::ServerTimestamp`] for the store to resolve.

use super::error::PersistenceError;
use crate::models::{Node, NodePatch};
use chrono::{DateTime, TimeZone, Utc};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

const TIMESTAMP_KEYS: [&str; 3] = ["createdAt", "updatedAt", "snoozedUntil"];

/// A field value in a write, or the sentinel resolved by the store on write
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Value(Value),
    ServerTimestamp,
}

impl From<Value> for FieldValue {
    fn from(value: Value) -> Self {
        FieldValue::Value(value)
    }
}

pub type DocumentFields = BTreeMap<String, FieldValue>;

/// Document as returned by `fetch_all`
#[derive(Debug, Clone, PartialEq)]
pub struct RawDocument {
    pub id: String,
    pub fields: Map<String, Value>,
}

/// Address of one node document
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocRef {
    pub user_id: String,
    pub id: String,
}

impl DocRef {
    pub fn new(user_id: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            id: id.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    Update { doc: DocRef, fields: DocumentFields },
    Delete(DocRef),
}

/// Multi-document write committed atomically by
/// [`DocumentStore::commit`](super::DocumentStore::commit)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, doc: DocRef, fields: DocumentFields) -> &mut Self {
        self.ops.push(WriteOp::Update { doc, fields });
        self
    }

    pub fn delete(&mut self, doc: DocRef) -> &mut Self {
        self.ops.push(WriteOp::Delete(doc));
        self
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    pub fn into_ops(self) -> Vec<WriteOp> {
        self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Fields for the initial `create` of a node
pub fn node_to_create_fields(node: &Node) -> Result<DocumentFields, PersistenceError> {
    let Value::Object(map) = serde_json::to_value(node)? else {
        return Err(PersistenceError::serialization("node did not encode as an object"));
    };

    let mut fields: DocumentFields = map
        .into_iter()
        .filter(|(key, _)| key != "id")
        .map(|(key, value)| (key, FieldValue::Value(value)))
        .collect();
    fields.insert("createdAt".to_string(), FieldValue::ServerTimestamp);
    fields.insert("updatedAt".to_string(), FieldValue::ServerTimestamp);
    Ok(fields)
}

/// Fields for a `patch` or batch update; always refreshes `updatedAt`
pub fn patch_to_fields(patch: &NodePatch) -> Result<DocumentFields, PersistenceError> {
    let Value::Object(map) = serde_json::to_value(patch)? else {
        return Err(PersistenceError::serialization("patch did not encode as an object"));
    };

    let mut fields: DocumentFields = map
        .into_iter()
        .map(|(key, value)| (key, FieldValue::Value(value)))
        .collect();
    fields.insert("updatedAt".to_string(), FieldValue::ServerTimestamp);
    Ok(fields)
}

/// Decode a fetched document into a [`Node`]
pub fn decode_document(doc: RawDocument) -> Result<Node, PersistenceError> {
    let mut fields = normalize_object(doc.fields);

    for key in TIMESTAMP_KEYS {
        if let Some(Value::Number(millis)) = fields.get(key) {
            let converted = millis
                .as_i64()
                .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
                .map(|ts| Value::String(ts.to_rfc3339()));
            match converted {
                Some(value) => {
                    fields.insert(key.to_string(), value);
                }
                None => {
                    fields.remove(key);
                }
            }
        }
    }

    fields.insert("id".to_string(), Value::String(doc.id));
    Ok(serde_json::from_value(Value::Object(fields))?)
}

/// Interpret a provider timestamp wrapper, RFC 3339 string or epoch millis
pub fn normalize_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|ts| ts.with_timezone(&Utc)),
        Value::Number(n) => n
            .as_i64()
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        Value::Object(map) => wrapper_timestamp(map),
        _ => None,
    }
}

fn wrapper_timestamp(map: &Map<String, Value>) -> Option<DateTime<Utc>> {
    if map.len() != 2 {
        return None;
    }
    let (seconds, nanos) = match (map.get("seconds"), map.get("nanoseconds")) {
        (Some(s), Some(n)) => (s, n),
        _ => (map.get("_seconds")?, map.get("_nanoseconds")?),
    };
    let nanos = u32::try_from(nanos.as_u64()?).ok()?;
    Utc.timestamp_opt(seconds.as_i64()?, nanos).single()
}

fn normalize_value(value: Value) -> Value {
    match value {
        Value::Object(map) => match wrapper_timestamp(&map) {
            Some(ts) => Value::String(ts.to_rfc3339()),
            None => Value::Object(normalize_object(map)),
        },
        Value::Array(items) => Value::Array(items.into_iter().map(normalize_value).collect()),
        other => other,
    }
}

fn normalize_object(map: Map<String, Value>) -> Map<String, Value> {
    map.into_iter()
        .filter(|(_, value)| !value.is_null())
        .map(|(key, value)| (key, normalize_value(value)))
        .collect()
}
