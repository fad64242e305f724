//! Typed documents on top of the JSON store.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use haulbook_core::{LedgerEntryId, OrgId};
use haulbook_ledger::{IdempotencyKey, LedgerEntry};
use haulbook_trips::{DeliveryMemo, DmId, FiscalCounter, Order, Trip};
use haulbook_wages::{AttendanceRecord, TripWage};

use super::r#trait::{DocKey, DocumentStore, Filter, StoreError};

/// A record stored as one JSON document in a fixed collection.
pub trait Document: Serialize + DeserializeOwned + Send + Sync {
    const COLLECTION: &'static str;

    fn doc_id(&self) -> String;

    fn key(&self) -> DocKey {
        DocKey::new(Self::COLLECTION, self.doc_id())
    }
}

pub(crate) fn encode<D: Document>(doc: &D) -> Result<JsonValue, StoreError> {
    Ok(serde_json::to_value(doc)?)
}

pub(crate) fn decode<D: Document>(body: JsonValue) -> Result<D, StoreError> {
    Ok(serde_json::from_value(body)?)
}

/// Read one typed document outside any transaction.
pub async fn load<D: Document>(
    store: &dyn DocumentStore,
    id: &str,
) -> Result<Option<D>, StoreError> {
    store
        .get(&DocKey::new(D::COLLECTION, id))
        .await?
        .map(|d| decode(d.body))
        .transpose()
}

/// Typed equality query.
pub async fn find<D: Document>(
    store: &dyn DocumentStore,
    filters: &[Filter],
) -> Result<Vec<D>, StoreError> {
    store
        .query(D::COLLECTION, filters)
        .await?
        .into_iter()
        .map(|d| decode(d.body))
        .collect()
}

/// Document id of a memo. Memo numbers are only unique within an
/// organization, so the id is prefixed with it.
pub fn memo_doc_id(org_id: OrgId, dm_id: &DmId) -> String {
    format!("{org_id}_{dm_id}")
}

/// Claim on a ledger idempotency key; exists while its entry is live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerKeyClaim {
    pub org_id: OrgId,
    pub key: IdempotencyKey,
    pub entry_id: LedgerEntryId,
}

impl LedgerKeyClaim {
    pub fn doc_id_for(org_id: OrgId, key: &IdempotencyKey) -> String {
        format!("{org_id}_{key}")
    }
}

impl Document for LedgerKeyClaim {
    const COLLECTION: &'static str = "ledger_idempotency";

    fn doc_id(&self) -> String {
        Self::doc_id_for(self.org_id, &self.key)
    }
}

impl Document for FiscalCounter {
    const COLLECTION: &'static str = "fiscal_counters";

    fn doc_id(&self) -> String {
        FiscalCounter::key(self.org_id, self.fiscal_year)
    }
}

impl Document for Trip {
    const COLLECTION: &'static str = "trips";

    fn doc_id(&self) -> String {
        self.id.to_string()
    }
}

impl Document for Order {
    const COLLECTION: &'static str = "orders";

    fn doc_id(&self) -> String {
        self.id.to_string()
    }
}

impl Document for DeliveryMemo {
    const COLLECTION: &'static str = "delivery_memos";

    fn doc_id(&self) -> String {
        memo_doc_id(self.org_id, &self.id)
    }
}

impl Document for LedgerEntry {
    const COLLECTION: &'static str = "ledger_entries";

    fn doc_id(&self) -> String {
        self.id.to_string()
    }
}

impl Document for TripWage {
    const COLLECTION: &'static str = "trip_wages";

    fn doc_id(&self) -> String {
        self.id.to_string()
    }
}

impl Document for AttendanceRecord {
    const COLLECTION: &'static str = "attendance";

    fn doc_id(&self) -> String {
        self.doc_key()
    }
}
