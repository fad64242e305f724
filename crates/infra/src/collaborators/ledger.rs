use async_trait::async_trait;
use chrono::Utc;
use tracing::{info, instrument, warn};

use haulbook_core::{Actor, LedgerEntryId, OrgId, TripWageId};
use haulbook_ledger::{EntryDraft, IdempotencyKey, LedgerAccount, LedgerEntry, balance};

use crate::error::{EngineError, EngineResult};
use crate::retry::retry_on_conflict;
use crate::store::{
    Document, Filter, LedgerKeyClaim, SharedStore, Transaction, WriteBatch, find, load,
};

/// Ledger entry creation and cancellation.
///
/// Each entry holds a claim on its idempotency key for as long as it is live,
/// so one originating event never has two live entries.
#[async_trait]
pub trait LedgerService: Send + Sync {
    /// Create the entry for `draft`, or return the live entry already holding
    /// its idempotency key.
    async fn create_entry(&self, draft: EntryDraft, actor: Actor) -> EngineResult<LedgerEntryId>;

    /// Create all drafts in one atomic batch. Any key already claimed fails
    /// the whole batch.
    async fn create_entries(
        &self,
        drafts: Vec<EntryDraft>,
        actor: Actor,
    ) -> EngineResult<Vec<LedgerEntryId>>;

    /// Mark cancelled and release the key. `Ok(false)` if already cancelled.
    async fn cancel_entry(&self, entry_id: LedgerEntryId, actor: Actor) -> EngineResult<bool>;

    /// Hard-delete entries (and their key claims) in one atomic batch.
    /// Missing entries are skipped. Returns how many were deleted.
    async fn delete_entries(&self, entry_ids: &[LedgerEntryId]) -> EngineResult<usize>;

    async fn entries_for_settlement(
        &self,
        org_id: OrgId,
        trip_wage_id: TripWageId,
    ) -> EngineResult<Vec<LedgerEntry>>;

    async fn get_entry(&self, entry_id: LedgerEntryId) -> EngineResult<Option<LedgerEntry>>;

    /// The live entry holding `key`, if any.
    async fn live_entry(
        &self,
        org_id: OrgId,
        key: &IdempotencyKey,
    ) -> EngineResult<Option<LedgerEntryId>>;

    /// Running balance of an account over its non-cancelled entries.
    async fn balance(&self, org_id: OrgId, account: LedgerAccount) -> EngineResult<i64>;
}

#[derive(Clone)]
pub struct StoreLedgerService {
    store: SharedStore,
    max_attempts: u32,
}

impl StoreLedgerService {
    pub fn new(store: SharedStore, max_attempts: u32) -> Self {
        Self {
            store,
            max_attempts,
        }
    }

    async fn create_once(&self, draft: &EntryDraft, actor: Actor) -> EngineResult<LedgerEntryId> {
        let key = draft.idempotency_key()?;
        let claim_id = LedgerKeyClaim::doc_id_for(draft.org_id, &key);

        let mut tx = Transaction::begin(&*self.store);
        if let Some(existing) = tx.get::<LedgerKeyClaim>(&claim_id).await? {
            return Ok(existing.entry_id);
        }

        let entry = LedgerEntry::from_draft(LedgerEntryId::new(), draft.clone(), actor, Utc::now())?;
        let claim = LedgerKeyClaim {
            org_id: entry.org_id,
            key,
            entry_id: entry.id,
        };
        tx.create(&entry)?;
        tx.set(&claim)?;
        tx.commit().await?;
        Ok(entry.id)
    }

    async fn cancel_once(&self, entry_id: LedgerEntryId, actor: Actor) -> EngineResult<bool> {
        let mut tx = Transaction::begin(&*self.store);
        let mut entry = tx
            .get::<LedgerEntry>(&entry_id.to_string())
            .await?
            .ok_or_else(|| EngineError::not_found(format!("ledger entry {entry_id}")))?;
        if !entry.cancel(actor, Utc::now()) {
            return Ok(false);
        }
        tx.set(&entry)?;
        tx.delete::<LedgerKeyClaim>(&LedgerKeyClaim::doc_id_for(
            entry.org_id,
            &entry.idempotency_key,
        ));
        tx.commit().await?;
        Ok(true)
    }
}

#[async_trait]
impl LedgerService for StoreLedgerService {
    #[instrument(skip(self, draft), fields(org_id = %draft.org_id, category = ?draft.category), err)]
    async fn create_entry(&self, draft: EntryDraft, actor: Actor) -> EngineResult<LedgerEntryId> {
        let id = retry_on_conflict("create_ledger_entry", self.max_attempts, || {
            self.create_once(&draft, actor)
        })
        .await?;
        info!(entry_id = %id, amount = draft.amount, "ledger entry recorded");
        Ok(id)
    }

    #[instrument(skip(self, drafts), fields(count = drafts.len()), err)]
    async fn create_entries(
        &self,
        drafts: Vec<EntryDraft>,
        actor: Actor,
    ) -> EngineResult<Vec<LedgerEntryId>> {
        let at = Utc::now();
        let mut batch = WriteBatch::new();
        let mut ids = Vec::with_capacity(drafts.len());
        for draft in drafts {
            let entry = LedgerEntry::from_draft(LedgerEntryId::new(), draft, actor, at)?;
            batch.create(&LedgerKeyClaim {
                org_id: entry.org_id,
                key: entry.idempotency_key.clone(),
                entry_id: entry.id,
            })?;
            batch.create(&entry)?;
            ids.push(entry.id);
        }
        batch.commit(&*self.store).await?;
        Ok(ids)
    }

    #[instrument(skip(self), fields(entry_id = %entry_id), err)]
    async fn cancel_entry(&self, entry_id: LedgerEntryId, actor: Actor) -> EngineResult<bool> {
        let cancelled = retry_on_conflict("cancel_ledger_entry", self.max_attempts, || {
            self.cancel_once(entry_id, actor)
        })
        .await?;
        if cancelled {
            info!(%entry_id, "ledger entry cancelled");
        }
        Ok(cancelled)
    }

    #[instrument(skip(self, entry_ids), fields(count = entry_ids.len()), err)]
    async fn delete_entries(&self, entry_ids: &[LedgerEntryId]) -> EngineResult<usize> {
        let mut batch = WriteBatch::new();
        let mut deleted = 0;
        for id in entry_ids {
            let Some(entry) = load::<LedgerEntry>(&*self.store, &id.to_string()).await? else {
                warn!(entry_id = %id, "ledger entry already gone");
                continue;
            };
            batch.delete_key(entry.key());
            if !entry.is_cancelled() {
                batch.delete_key(
                    LedgerKeyClaim {
                        org_id: entry.org_id,
                        key: entry.idempotency_key.clone(),
                        entry_id: entry.id,
                    }
                    .key(),
                );
            }
            deleted += 1;
        }
        batch.commit(&*self.store).await?;
        Ok(deleted)
    }

    async fn entries_for_settlement(
        &self,
        org_id: OrgId,
        trip_wage_id: TripWageId,
    ) -> EngineResult<Vec<LedgerEntry>> {
        Ok(find(
            &*self.store,
            &[
                Filter::eq("orgId", org_id.to_string()),
                Filter::eq("origin.tripWageId", trip_wage_id.to_string()),
            ],
        )
        .await?)
    }

    async fn get_entry(&self, entry_id: LedgerEntryId) -> EngineResult<Option<LedgerEntry>> {
        Ok(load::<LedgerEntry>(&*self.store, &entry_id.to_string()).await?)
    }

    async fn live_entry(
        &self,
        org_id: OrgId,
        key: &IdempotencyKey,
    ) -> EngineResult<Option<LedgerEntryId>> {
        let claim =
            load::<LedgerKeyClaim>(&*self.store, &LedgerKeyClaim::doc_id_for(org_id, key)).await?;
        Ok(claim.map(|c| c.entry_id))
    }

    async fn balance(&self, org_id: OrgId, account: LedgerAccount) -> EngineResult<i64> {
        let entries: Vec<LedgerEntry> = find(
            &*self.store,
            &[Filter::eq("orgId", org_id.to_string())],
        )
        .await?;
        Ok(balance(entries.iter().filter(|e| e.account == account)))
    }
}
