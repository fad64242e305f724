use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use thiserror::Error;

use haulbook_core::ExpectedVersion;

/// Address of a document: collection name plus id within it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocKey {
    pub collection: &'static str,
    pub id: String,
}

impl DocKey {
    pub fn new(collection: &'static str, id: impl Into<String>) -> Self {
        Self {
            collection,
            id: id.into(),
        }
    }
}

impl core::fmt::Display for DocKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

/// A stored document with its version.
///
/// Versions start at 1 on first write and increase by one per write; an
/// absent document is version 0.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionedDoc {
    pub key: DocKey,
    pub version: u64,
    pub body: JsonValue,
}

/// Equality match on a body field. Nested fields use dotted paths
/// (`origin.tripWageId`).
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: &'static str,
    pub value: JsonValue,
}

impl Filter {
    pub fn eq(field: &'static str, value: impl Into<JsonValue>) -> Self {
        Self {
            field,
            value: value.into(),
        }
    }

    pub fn path(&self) -> impl Iterator<Item = &'static str> {
        self.field.split('.')
    }

    pub fn matches(&self, body: &JsonValue) -> bool {
        self.path()
            .try_fold(body, |node, segment| node.get(segment))
            .is_some_and(|found| *found == self.value)
    }
}

/// Version a document must be at for a commit to apply.
#[derive(Debug, Clone, PartialEq)]
pub struct Precondition {
    pub key: DocKey,
    pub expected: ExpectedVersion,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Write {
    Set { key: DocKey, body: JsonValue },
    Delete { key: DocKey },
}

impl Write {
    pub fn key(&self) -> &DocKey {
        match self {
            Write::Set { key, .. } | Write::Delete { key } => key,
        }
    }
}

/// Document store operation error.
///
/// Infrastructure failures, as opposed to domain errors. `Conflict` is the
/// only retryable variant.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("optimistic concurrency check failed: {0}")]
    Conflict(String),

    #[error("commit of {writes} writes exceeds the batch limit of {limit}")]
    BatchTooLarge { writes: usize, limit: usize },

    #[error("invalid transaction: {0}")]
    InvalidTransaction(String),

    #[error("document (de)serialization failed: {0}")]
    Serialization(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// Transactional document store: the single persistence substrate.
///
/// ## Commit semantics
///
/// `commit` is atomic. Every precondition is checked against the current
/// version of its document, and only if all hold are the writes applied,
/// each bumping its document's version (deletes reset it to absent). A failed
/// precondition yields `StoreError::Conflict` and applies nothing.
///
/// Optimistic read-modify-write is built on top of this by recording the
/// version of each document read and committing with those versions as
/// preconditions (see `Transaction`).
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, key: &DocKey) -> Result<Option<VersionedDoc>, StoreError>;

    /// All documents in `collection` matching every filter.
    async fn query(
        &self,
        collection: &'static str,
        filters: &[Filter],
    ) -> Result<Vec<VersionedDoc>, StoreError>;

    async fn commit(
        &self,
        preconditions: Vec<Precondition>,
        writes: Vec<Write>,
    ) -> Result<(), StoreError>;
}

#[async_trait]
impl<S> DocumentStore for Arc<S>
where
    S: DocumentStore + ?Sized,
{
    async fn get(&self, key: &DocKey) -> Result<Option<VersionedDoc>, StoreError> {
        (**self).get(key).await
    }

    async fn query(
        &self,
        collection: &'static str,
        filters: &[Filter],
    ) -> Result<Vec<VersionedDoc>, StoreError> {
        (**self).query(collection, filters).await
    }

    async fn commit(
        &self,
        preconditions: Vec<Precondition>,
        writes: Vec<Write>,
    ) -> Result<(), StoreError> {
        (**self).commit(preconditions, writes).await
    }
}
