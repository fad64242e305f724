//! Postgres-backed document store.
//!
//! Every document is one row of the `documents` table: `(collection, id)`
//! primary key, a `version` counter and a JSONB `body`.
//!
//! ## Commit protocol
//!
//! A commit runs in one database transaction:
//! 1. `SELECT version ... FOR UPDATE` for each precondition key
//! 2. compare against the expected version, rolling back on mismatch
//! 3. apply writes: plain `INSERT` where the document was expected absent,
//!    `INSERT ... ON CONFLICT DO UPDATE` (version + 1) otherwise, `DELETE` for deletes
//! 4. commit
//!
//! Absent rows cannot be locked, so two commits creating the same document
//! race on the primary key instead; the loser sees a unique violation, which
//! maps to `StoreError::Conflict` like any other version mismatch.
//!
//! ## Error mapping
//!
//! | SQLx error | Code | `StoreError` |
//! |---|---|---|
//! | Database (unique violation) | `23505` | `Conflict` |
//! | Database (serialization failure) | `40001` | `Conflict` |
//! | Database (other) | any | `Backend` |
//! | PoolClosed / other | n/a | `Backend` |

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value as JsonValue};
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::instrument;

use haulbook_core::ExpectedVersion;

use super::in_memory::DEFAULT_WRITE_LIMIT;
use super::r#trait::{DocKey, DocumentStore, Filter, Precondition, StoreError, VersionedDoc, Write};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS documents (
    collection  TEXT        NOT NULL,
    id          TEXT        NOT NULL,
    version     BIGINT      NOT NULL CHECK (version > 0),
    body        JSONB       NOT NULL,
    updated_at  TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    PRIMARY KEY (collection, id)
);
CREATE INDEX IF NOT EXISTS documents_body_gin ON documents USING GIN (body jsonb_path_ops);
"#;

#[derive(Debug, Clone)]
pub struct PostgresDocumentStore {
    pool: Arc<PgPool>,
    write_limit: usize,
}

impl PostgresDocumentStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
            write_limit: DEFAULT_WRITE_LIMIT,
        }
    }

    pub fn with_write_limit(mut self, limit: usize) -> Self {
        self.write_limit = limit.max(1);
        self
    }

    /// Connect using a `postgres://` URL.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Create the `documents` table and its index if missing.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for PostgresDocumentStore {
    #[instrument(skip(self), fields(key = %key), err)]
    async fn get(&self, key: &DocKey) -> Result<Option<VersionedDoc>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT version, body
            FROM documents
            WHERE collection = $1 AND id = $2
            "#,
        )
        .bind(key.collection)
        .bind(&key.id)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get", e))?;

        row.map(|row| {
            let version: i64 = row
                .try_get("version")
                .map_err(|e| StoreError::Backend(format!("failed to read version: {e}")))?;
            let body: JsonValue = row
                .try_get("body")
                .map_err(|e| StoreError::Backend(format!("failed to read body: {e}")))?;
            Ok(VersionedDoc {
                key: key.clone(),
                version: version as u64,
                body,
            })
        })
        .transpose()
    }

    #[instrument(skip(self, filters), fields(filter_count = filters.len()), err)]
    async fn query(
        &self,
        collection: &'static str,
        filters: &[Filter],
    ) -> Result<Vec<VersionedDoc>, StoreError> {
        let mut containment = JsonValue::Object(Map::new());
        for f in filters {
            insert_path(&mut containment, f);
        }

        let rows = sqlx::query(
            r#"
            SELECT id, version, body
            FROM documents
            WHERE collection = $1 AND body @> $2
            ORDER BY id ASC
            "#,
        )
        .bind(collection)
        .bind(containment)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("query", e))?;

        let mut docs = Vec::with_capacity(rows.len());
        for row in rows {
            let id: String = row
                .try_get("id")
                .map_err(|e| StoreError::Backend(format!("failed to read id: {e}")))?;
            let version: i64 = row
                .try_get("version")
                .map_err(|e| StoreError::Backend(format!("failed to read version: {e}")))?;
            let body: JsonValue = row
                .try_get("body")
                .map_err(|e| StoreError::Backend(format!("failed to read body: {e}")))?;
            docs.push(VersionedDoc {
                key: DocKey::new(collection, id),
                version: version as u64,
                body,
            });
        }
        Ok(docs)
    }

    #[instrument(
        skip(self, preconditions, writes),
        fields(precondition_count = preconditions.len(), write_count = writes.len()),
        err
    )]
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

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let mut expected_absent = HashSet::new();
        for p in &preconditions {
            let current = locked_version(&mut tx, &p.key).await?;
            if !p.expected.matches(current) {
                tx.rollback()
                    .await
                    .map_err(|e| map_sqlx_error("rollback", e))?;
                return Err(StoreError::Conflict(format!(
                    "{}: expected {:?}, found {current}",
                    p.key, p.expected
                )));
            }
            if p.expected == ExpectedVersion::ABSENT {
                expected_absent.insert(p.key.clone());
            }
        }

        for w in writes {
            match w {
                Write::Set { key, body } if expected_absent.contains(&key) => {
                    sqlx::query(
                        r#"
                        INSERT INTO documents (collection, id, version, body)
                        VALUES ($1, $2, 1, $3)
                        "#,
                    )
                    .bind(key.collection)
                    .bind(&key.id)
                    .bind(&body)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| map_sqlx_error("insert_document", e))?;
                }
                Write::Set { key, body } => {
                    sqlx::query(
                        r#"
                        INSERT INTO documents (collection, id, version, body)
                        VALUES ($1, $2, 1, $3)
                        ON CONFLICT (collection, id)
                        DO UPDATE SET
                            version = documents.version + 1,
                            body = EXCLUDED.body,
                            updated_at = NOW()
                        "#,
                    )
                    .bind(key.collection)
                    .bind(&key.id)
                    .bind(&body)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| map_sqlx_error("upsert_document", e))?;
                }
                Write::Delete { key } => {
                    sqlx::query("DELETE FROM documents WHERE collection = $1 AND id = $2")
                        .bind(key.collection)
                        .bind(&key.id)
                        .execute(&mut *tx)
                        .await
                        .map_err(|e| map_sqlx_error("delete_document", e))?;
                }
            }
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(())
    }
}

/// Merge `filter` into a JSONB containment pattern, nesting dotted paths.
fn insert_path(pattern: &mut JsonValue, filter: &Filter) {
    let segments: Vec<&str> = filter.path().collect();
    let Some((last, parents)) = segments.split_last() else {
        return;
    };
    let mut node = pattern;
    for segment in parents {
        let JsonValue::Object(map) = node else {
            return;
        };
        node = map
            .entry(segment.to_string())
            .or_insert_with(|| JsonValue::Object(Map::new()));
    }
    if let JsonValue::Object(map) = node {
        map.insert(last.to_string(), filter.value.clone());
    }
}

/// Current version of `key`, row-locked for the rest of the transaction.
/// Absent documents report 0.
async fn locked_version(
    tx: &mut Transaction<'_, Postgres>,
    key: &DocKey,
) -> Result<u64, StoreError> {
    let row = sqlx::query(
        r#"
        SELECT version
        FROM documents
        WHERE collection = $1 AND id = $2
        FOR UPDATE
        "#,
    )
    .bind(key.collection)
    .bind(&key.id)
    .fetch_optional(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("locked_version", e))?;

    match row {
        Some(row) => {
            let version: i64 = row
                .try_get("version")
                .map_err(|e| StoreError::Backend(format!("failed to read version: {e}")))?;
            Ok(version as u64)
        }
        None => Ok(0),
    }
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") | Some("40001") => StoreError::Conflict(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Backend(format!("connection pool closed in {}", operation))
        }
        _ => StoreError::Backend(format!("sqlx error in {}: {}", operation, err)),
    }
}
