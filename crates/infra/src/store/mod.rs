//! Transactional document store boundary.
//!
//! Every record (counter, trip, order, memo, ledger entry, wage record,
//! attendance) is one JSON document addressed by collection + id. Atomicity
//! comes from the store's `commit`, which applies a set of writes only if a
//! set of version preconditions hold.

pub mod document;
pub mod in_memory;
pub mod postgres;
pub mod transaction;
pub mod r#trait;

pub use document::{Document, LedgerKeyClaim, find, load, memo_doc_id};
pub use in_memory::{DEFAULT_WRITE_LIMIT, InMemoryDocumentStore};
pub use postgres::PostgresDocumentStore;
pub use transaction::{Transaction, WriteBatch};
pub use r#trait::{
    DocKey, DocumentStore, Filter, Precondition, StoreError, VersionedDoc, Write,
};

/// Store handle shared by the services.
pub type SharedStore = std::sync::Arc<dyn DocumentStore>;
