//! Sequence issuer: gap-free memo numbers per (organization, fiscal year).
//!
//! The counter lives in the store, never in process memory. Each increment
//! is an optimistic read-modify-write of the single counter document, so
//! concurrent callers on the same key serialize through commit conflicts and
//! each one that commits observed a distinct value.

use chrono::{DateTime, Utc};
use tracing::{info, instrument};

use haulbook_core::{FiscalYear, OrgId};
use haulbook_trips::FiscalCounter;

use crate::error::EngineResult;
use crate::retry::retry_on_conflict;
use crate::store::{SharedStore, Transaction};

/// Read the counter inside `tx`, advance it and buffer the write.
///
/// Returns the issued number. The number only counts as issued if `tx`
/// commits. This is a read followed by a write, so call it after every other
/// read the transaction needs.
pub async fn issue_in(
    tx: &mut Transaction<'_>,
    org_id: OrgId,
    fiscal_year: FiscalYear,
    at: DateTime<Utc>,
) -> EngineResult<u64> {
    let mut counter = tx
        .get::<FiscalCounter>(&FiscalCounter::key(org_id, fiscal_year))
        .await?
        .unwrap_or_else(|| FiscalCounter::new(org_id, fiscal_year, at));
    let next = counter.advance(at);
    tx.set(&counter)?;
    Ok(next)
}

#[derive(Clone)]
pub struct SequenceIssuer {
    store: SharedStore,
    max_attempts: u32,
}

impl SequenceIssuer {
    pub fn new(store: SharedStore, max_attempts: u32) -> Self {
        Self {
            store,
            max_attempts,
        }
    }

    /// Current counter state, creating it at zero on first use.
    #[instrument(skip(self), fields(org_id = %org_id, fiscal_year = %fiscal_year), err)]
    pub async fn get_or_create_counter(
        &self,
        org_id: OrgId,
        fiscal_year: FiscalYear,
    ) -> EngineResult<FiscalCounter> {
        retry_on_conflict("get_or_create_counter", self.max_attempts, || {
            self.get_or_create_once(org_id, fiscal_year)
        })
        .await
    }

    async fn get_or_create_once(
        &self,
        org_id: OrgId,
        fiscal_year: FiscalYear,
    ) -> EngineResult<FiscalCounter> {
        let mut tx = Transaction::begin(&*self.store);
        if let Some(existing) = tx
            .get::<FiscalCounter>(&FiscalCounter::key(org_id, fiscal_year))
            .await?
        {
            return Ok(existing);
        }
        let counter = FiscalCounter::new(org_id, fiscal_year, Utc::now());
        tx.create(&counter)?;
        tx.commit().await?;
        Ok(counter)
    }

    /// Advance the counter and return the new number.
    #[instrument(skip(self), fields(org_id = %org_id, fiscal_year = %fiscal_year), err)]
    pub async fn increment_and_get_next(
        &self,
        org_id: OrgId,
        fiscal_year: FiscalYear,
    ) -> EngineResult<u64> {
        let number = retry_on_conflict("increment_and_get_next", self.max_attempts, || {
            self.increment_once(org_id, fiscal_year)
        })
        .await?;
        info!(%org_id, %fiscal_year, number, "memo number issued");
        Ok(number)
    }

    async fn increment_once(&self, org_id: OrgId, fiscal_year: FiscalYear) -> EngineResult<u64> {
        let mut tx = Transaction::begin(&*self.store);
        let number = issue_in(&mut tx, org_id, fiscal_year, Utc::now()).await?;
        tx.commit().await?;
        Ok(number)
    }
}
