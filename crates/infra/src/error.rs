use thiserror::Error;

use haulbook_core::{DomainError, LedgerEntryId, TripWageId};

use crate::collaborators::NotifyError;
use crate::store::StoreError;

/// Result of an engine operation.
pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// Optimistic transaction kept conflicting.
    #[error("{operation} gave up after {attempts} conflicting attempts")]
    RetriesExhausted {
        operation: &'static str,
        attempts: u32,
    },

    #[error(transparent)]
    Notify(#[from] NotifyError),

    /// Settlement wrote some ledger entries and then failed. The wage record
    /// is still pending; revert cleans up.
    #[error("settlement of {trip_wage_id} failed after creating {} entries: {source}", created.len())]
    PartialSettlement {
        trip_wage_id: TripWageId,
        created: Vec<LedgerEntryId>,
        #[source]
        source: Box<EngineError>,
    },
}

impl EngineError {
    pub fn not_found(what: impl Into<String>) -> Self {
        EngineError::Domain(DomainError::not_found(what))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, EngineError::Store(e) if e.is_conflict())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, EngineError::Domain(DomainError::NotFound(_)))
    }
}
