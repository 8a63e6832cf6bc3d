//! Keyed document store.
//!
//! A schemaless, per-collection key/value store with point reads,
//! equality-filtered queries, all-or-nothing batched writes and push
//! subscriptions that deliver the full matching result set on every change.
//! Collections nest under documents (`pools/{pool_id}/members`), mirroring
//! how the rest of the crate addresses records.

pub mod memory;
pub mod mongo;

use std::fmt;

use async_trait::async_trait;
use bson::{Bson, Document};
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub use memory::MemoryStore;
pub use mongo::MongoStore;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store backend error: {0}")]
    Backend(String),

    #[error("document serialization failed: {0}")]
    Serialization(String),

    #[error("subscription closed")]
    Closed,
}

impl From<bson::ser::Error> for StoreError {
    fn from(err: bson::ser::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

impl From<bson::de::Error> for StoreError {
    fn from(err: bson::de::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// Path of a collection, e.g. `pools` or `pools/abc123/members`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CollectionPath(String);

impl CollectionPath {
    pub fn root(name: &str) -> Self {
        CollectionPath(name.to_string())
    }

    pub fn doc(&self, id: impl Into<String>) -> DocPath {
        DocPath {
            collection: self.clone(),
            id: id.into(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Last path segment: `members` for `pools/abc123/members`.
    pub fn kind(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }
}

impl fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Path of a single document inside a collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocPath {
    collection: CollectionPath,
    id: String,
}

impl DocPath {
    pub fn collection(&self) -> &CollectionPath {
        &self.collection
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Sub-collection nested under this document.
    pub fn child(&self, name: &str) -> CollectionPath {
        CollectionPath(format!("{}/{}/{}", self.collection.0, self.id, name))
    }
}

impl fmt::Display for DocPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

/// Equality-filtered query over one collection.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    collection: CollectionPath,
    filters: Vec<(String, Bson)>,
}

impl Query {
    pub fn all(collection: CollectionPath) -> Self {
        Query {
            collection,
            filters: Vec::new(),
        }
    }

    pub fn where_eq(mut self, field: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.filters.push((field.into(), value.into()));
        self
    }

    pub fn collection(&self) -> &CollectionPath {
        &self.collection
    }

    pub fn filters(&self) -> &[(String, Bson)] {
        &self.filters
    }

    pub fn matches(&self, data: &Document) -> bool {
        self.filters
            .iter()
            .all(|(field, value)| data.get(field) == Some(value))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub id: String,
    pub data: Document,
}

impl StoredDocument {
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, StoreError> {
        from_document(self.data.clone())
    }
}

/// Full result set of a query, ordered by document id.
pub type Snapshot = Vec<StoredDocument>;

#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    /// Replace the whole document, creating it if absent.
    Set { path: DocPath, data: Document },
    /// Upsert the given fields, leaving the others untouched.
    Merge { path: DocPath, data: Document },
    /// Atomically add `by` to a numeric field (missing counts as zero).
    Increment { path: DocPath, field: String, by: i64 },
}

impl WriteOp {
    pub fn path(&self) -> &DocPath {
        match self {
            WriteOp::Set { path, .. } | WriteOp::Merge { path, .. } => path,
            WriteOp::Increment { path, .. } => path,
        }
    }
}

/// Writes that commit together or not at all.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, path: DocPath, data: Document) -> Self {
        self.ops.push(WriteOp::Set { path, data });
        self
    }

    pub fn merge(mut self, path: DocPath, data: Document) -> Self {
        self.ops.push(WriteOp::Merge { path, data });
        self
    }

    pub fn increment(mut self, path: DocPath, field: impl Into<String>, by: i64) -> Self {
        self.ops.push(WriteOp::Increment {
            path,
            field: field.into(),
            by,
        });
        self
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    pub fn into_ops(self) -> Vec<WriteOp> {
        self.ops
    }
}

/// Live query handle. Yields the current snapshot first, then a fresh
/// snapshot after every change that touches the query. Dropping the handle
/// stops the feed.
#[derive(Debug)]
pub struct Subscription {
    rx: mpsc::UnboundedReceiver<Result<Snapshot, StoreError>>,
    cancel: CancellationToken,
}

impl Subscription {
    pub fn new(
        rx: mpsc::UnboundedReceiver<Result<Snapshot, StoreError>>,
        cancel: CancellationToken,
    ) -> Self {
        Subscription { rx, cancel }
    }

    /// Next snapshot, or `None` once the feed has ended.
    pub async fn next(&mut self) -> Option<Result<Snapshot, StoreError>> {
        if self.cancel.is_cancelled() {
            return None;
        }
        self.rx.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, path: &DocPath) -> Result<Option<Document>, StoreError>;

    async fn query(&self, query: &Query) -> Result<Snapshot, StoreError>;

    /// Apply every op of the batch atomically.
    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError>;

    async fn subscribe(&self, query: Query) -> Result<Subscription, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}

pub fn to_document<T: Serialize>(value: &T) -> Result<Document, StoreError> {
    Ok(bson::to_document(value)?)
}

pub fn from_document<T: DeserializeOwned>(data: Document) -> Result<T, StoreError> {
    Ok(bson::from_document(data)?)
}
