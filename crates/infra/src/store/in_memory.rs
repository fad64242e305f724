use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use super::r#trait::{DocKey, DocumentStore, Filter, Precondition, StoreError, VersionedDoc, Write};

/// Per-commit write cap applied when none is configured.
pub const DEFAULT_WRITE_LIMIT: usize = 500;

#[derive(Debug, Clone)]
struct Slot {
    version: u64,
    body: JsonValue,
}

/// In-memory transactional document store.
///
/// Intended for tests/dev. Commits take the write lock for the whole
/// check-then-apply step, so they are serializable.
#[derive(Debug)]
pub struct InMemoryDocumentStore {
    docs: RwLock<HashMap<DocKey, Slot>>,
    write_limit: usize,
}

impl Default for InMemoryDocumentStore {
    fn default() -> Self {
        Self::with_write_limit(DEFAULT_WRITE_LIMIT)
    }
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject commits carrying more than `limit` writes.
    pub fn with_write_limit(limit: usize) -> Self {
        Self {
            docs: RwLock::new(HashMap::new()),
            write_limit: limit.max(1),
        }
    }

    /// Number of live documents in `collection`.
    pub fn count(&self, collection: &str) -> usize {
        self.docs
            .read()
            .map(|d| d.keys().filter(|k| k.collection == collection).count())
            .unwrap_or(0)
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn get(&self, key: &DocKey) -> Result<Option<VersionedDoc>, StoreError> {
        let docs = self
            .docs
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?;

        Ok(docs.get(key).map(|slot| VersionedDoc {
            key: key.clone(),
            version: slot.version,
            body: slot.body.clone(),
        }))
    }

    async fn query(
        &self,
        collection: &'static str,
        filters: &[Filter],
    ) -> Result<Vec<VersionedDoc>, StoreError> {
        let docs = self
            .docs
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?;

        let mut found: Vec<VersionedDoc> = docs
            .iter()
            .filter(|(k, slot)| {
                k.collection == collection && filters.iter().all(|f| f.matches(&slot.body))
            })
            .map(|(k, slot)| VersionedDoc {
                key: k.clone(),
                version: slot.version,
                body: slot.body.clone(),
            })
            .collect();
        found.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(found)
    }

    async fn commit(
        &self,
        preconditions: Vec<Precondition>,
        writes: Vec<Write>,
    ) -> Result<(), StoreError> {
        if writes.len() > self.write_limit {
            return Err(StoreError::BatchTooLarge {
                writes: writes.len(),
                limit: self.write_limit,
            });
        }

        let mut docs = self
            .docs
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?;

        for p in &preconditions {
            let current = docs.get(&p.key).map(|s| s.version).unwrap_or(0);
            if !p.expected.matches(current) {
                return Err(StoreError::Conflict(format!(
                    "{}: expected {:?}, found {current}",
                    p.key, p.expected
                )));
            }
        }

        for w in writes {
            match w {
                Write::Set { key, body } => {
                    let version = docs.get(&key).map(|s| s.version).unwrap_or(0) + 1;
                    docs.insert(key, Slot { version, body });
                }
                Write::Delete { key } => {
                    docs.remove(&key);
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use haulbook_core::ExpectedVersion;
    use serde_json::json;

    fn key(id: &str) -> DocKey {
        DocKey::new("things", id)
    }

    #[tokio::test]
    async fn commit_bumps_versions_and_delete_resets() {
        let store = InMemoryDocumentStore::new();
        store
            .commit(vec![], vec![Write::Set { key: key("a"), body: json!({"n": 1}) }])
            .await
            .unwrap();
        store
            .commit(vec![], vec![Write::Set { key: key("a"), body: json!({"n": 2}) }])
            .await
            .unwrap();
        assert_eq!(store.get(&key("a")).await.unwrap().unwrap().version, 2);

        store.commit(vec![], vec![Write::Delete { key: key("a") }]).await.unwrap();
        assert!(store.get(&key("a")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn failed_precondition_applies_nothing() {
        let store = InMemoryDocumentStore::new();
        store
            .commit(vec![], vec![Write::Set { key: key("a"), body: json!({}) }])
            .await
            .unwrap();

        let err = store
            .commit(
                vec![Precondition { key: key("a"), expected: ExpectedVersion::ABSENT }],
                vec![
                    Write::Set { key: key("a"), body: json!({"x": 1}) },
                    Write::Set { key: key("b"), body: json!({}) },
                ],
            )
            .await
            .unwrap_err();

        assert!(err.is_conflict());
        assert!(store.get(&key("b")).await.unwrap().is_none());
        assert_eq!(store.get(&key("a")).await.unwrap().unwrap().body, json!({}));
    }

    #[tokio::test]
    async fn query_filters_on_fields_within_collection() {
        let store = InMemoryDocumentStore::new();
        store
            .commit(
                vec![],
                vec![
                    Write::Set { key: key("a"), body: json!({"tripId": "t1", "status": "active"}) },
                    Write::Set { key: key("b"), body: json!({"tripId": "t1", "status": "cancelled"}) },
                    Write::Set { key: DocKey::new("other", "c"), body: json!({"tripId": "t1"}) },
                ],
            )
            .await
            .unwrap();

        let found = store
            .query("things", &[Filter::eq("tripId", "t1"), Filter::eq("status", "active")])
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].key, key("a"));
    }

    #[tokio::test]
    async fn oversized_batches_are_rejected() {
        let store = InMemoryDocumentStore::with_write_limit(2);
        let writes = (0..3)
            .map(|i| Write::Set { key: key(&i.to_string()), body: json!({}) })
            .collect();
        let err = store.commit(vec![], writes).await.unwrap_err();
        assert!(matches!(err, StoreError::BatchTooLarge { writes: 3, limit: 2 }));
        assert_eq!(store.count("things"), 0);
    }
}
