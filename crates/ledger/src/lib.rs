//! Ledger entries (running-sum balances, not double-entry).
//!
//! Pure domain logic only: no IO, no HTTP, no persistence concerns.

pub mod entry;

pub use entry::{
    AccountKind, EntryCategory, EntryDraft, EntryOrigin, EntryStatus, EntryType,
    IdempotencyKey, LedgerAccount, LedgerEntry, TaskType, balance,
};
