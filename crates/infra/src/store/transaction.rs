use std::collections::BTreeMap;

use serde_json::Value as JsonValue;

use haulbook_core::ExpectedVersion;

use super::document::{Document, decode, encode};
use super::r#trait::{DocKey, DocumentStore, Precondition, StoreError, Write};

/// Optimistic read-modify-write transaction.
///
/// Reads go straight to the store and record the version seen; writes are
/// buffered. `commit` sends the buffered writes with every recorded version as
/// a precondition, so it fails with `StoreError::Conflict` if anything read
/// has changed since. Reads must precede writes.
pub struct Transaction<'s> {
    store: &'s dyn DocumentStore,
    reads: BTreeMap<DocKey, u64>,
    creates: Vec<DocKey>,
    writes: BTreeMap<DocKey, Write>,
}

impl<'s> Transaction<'s> {
    pub fn begin(store: &'s dyn DocumentStore) -> Self {
        Self {
            store,
            reads: BTreeMap::new(),
            creates: Vec::new(),
            writes: BTreeMap::new(),
        }
    }

    /// Read a typed document, recording its version.
    pub async fn get<D: Document>(&mut self, id: &str) -> Result<Option<D>, StoreError> {
        let key = DocKey::new(D::COLLECTION, id);
        self.get_raw(key)
            .await?
            .map(decode::<D>)
            .transpose()
    }

    pub async fn get_raw(&mut self, key: DocKey) -> Result<Option<JsonValue>, StoreError> {
        if !self.writes.is_empty() {
            return Err(StoreError::InvalidTransaction(format!(
                "read of {key} after writes were buffered"
            )));
        }
        let doc = self.store.get(&key).await?;
        let version = doc.as_ref().map(|d| d.version).unwrap_or(0);
        if let Some(seen) = self.reads.insert(key.clone(), version) {
            if seen != version {
                return Err(StoreError::Conflict(format!(
                    "{key} changed during transaction ({seen} -> {version})"
                )));
            }
        }
        Ok(doc.map(|d| d.body))
    }

    pub fn set<D: Document>(&mut self, doc: &D) -> Result<(), StoreError> {
        let key = doc.key();
        let body = encode(doc)?;
        self.writes.insert(key.clone(), Write::Set { key, body });
        Ok(())
    }

    /// Write a document that must not exist yet (whether or not it was read).
    pub fn create<D: Document>(&mut self, doc: &D) -> Result<(), StoreError> {
        let key = doc.key();
        self.set(doc)?;
        if !self.reads.contains_key(&key) {
            self.creates.push(key);
        }
        Ok(())
    }

    pub fn delete<D: Document>(&mut self, id: &str) {
        self.delete_key(DocKey::new(D::COLLECTION, id));
    }

    pub fn delete_key(&mut self, key: DocKey) {
        self.writes.insert(key.clone(), Write::Delete { key });
    }

    pub fn write_count(&self) -> usize {
        self.writes.len()
    }

    pub async fn commit(self) -> Result<(), StoreError> {
        if self.writes.is_empty() {
            return Ok(());
        }
        let mut preconditions: Vec<Precondition> = self
            .reads
            .into_iter()
            .map(|(key, version)| Precondition {
                key,
                expected: ExpectedVersion::Exact(version),
            })
            .collect();
        preconditions.extend(self.creates.into_iter().map(|key| Precondition {
            key,
            expected: ExpectedVersion::ABSENT,
        }));

        self.store
            .commit(preconditions, self.writes.into_values().collect())
            .await
    }
}

/// Atomic group of blind writes (no reads, no version checks beyond
/// explicit creates).
#[derive(Default)]
pub struct WriteBatch {
    preconditions: Vec<Precondition>,
    writes: Vec<Write>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set<D: Document>(&mut self, doc: &D) -> Result<(), StoreError> {
        let key = doc.key();
        self.writes.push(Write::Set {
            key,
            body: encode(doc)?,
        });
        Ok(())
    }

    pub fn create<D: Document>(&mut self, doc: &D) -> Result<(), StoreError> {
        self.preconditions.push(Precondition {
            key: doc.key(),
            expected: ExpectedVersion::ABSENT,
        });
        self.set(doc)
    }

    pub fn delete_key(&mut self, key: DocKey) {
        self.writes.push(Write::Delete { key });
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    pub async fn commit(self, store: &dyn DocumentStore) -> Result<(), StoreError> {
        if self.writes.is_empty() {
            return Ok(());
        }
        store.commit(self.preconditions, self.writes).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryDocumentStore;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Tally {
        id: String,
        n: u64,
    }

    impl Document for Tally {
        const COLLECTION: &'static str = "tallies";
        fn doc_id(&self) -> String {
            self.id.clone()
        }
    }

    #[tokio::test]
    async fn stale_read_fails_commit() {
        let store = InMemoryDocumentStore::new();
        let mut seed = WriteBatch::new();
        seed.set(&Tally { id: "a".into(), n: 0 }).unwrap();
        seed.commit(&store).await.unwrap();

        let mut first = Transaction::begin(&store);
        let mut second = Transaction::begin(&store);
        let mut a: Tally = first.get("a").await.unwrap().unwrap();
        let mut b: Tally = second.get("a").await.unwrap().unwrap();

        a.n += 1;
        first.set(&a).unwrap();
        first.commit().await.unwrap();

        b.n += 1;
        second.set(&b).unwrap();
        assert!(second.commit().await.unwrap_err().is_conflict());
    }

    #[tokio::test]
    async fn reads_after_writes_are_rejected() {
        let store = InMemoryDocumentStore::new();
        let mut tx = Transaction::begin(&store);
        tx.set(&Tally { id: "a".into(), n: 1 }).unwrap();
        let err = tx.get::<Tally>("b").await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransaction(_)));
    }

    #[tokio::test]
    async fn create_conflicts_when_document_exists() {
        let store = InMemoryDocumentStore::new();
        let mut batch = WriteBatch::new();
        batch.create(&Tally { id: "k".into(), n: 1 }).unwrap();
        batch.commit(&store).await.unwrap();

        let mut again = WriteBatch::new();
        again.create(&Tally { id: "k".into(), n: 2 }).unwrap();
        assert!(again.commit(&store).await.unwrap_err().is_conflict());
    }
}
