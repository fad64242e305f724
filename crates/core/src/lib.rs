//! `haulbook-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! identifiers, the domain error model, fiscal-year labels and actor metadata.

pub mod actor;
pub mod error;
pub mod fiscal;
pub mod id;
pub mod version;

pub use actor::{Actor, ActorRole};
pub use error::{DomainError, DomainResult};
pub use fiscal::FiscalYear;
pub use id::{
    ActorId, ClientId, EmployeeId, LedgerEntryId, OrderId, OrgId, TripId, TripWageId,
};
pub use version::ExpectedVersion;
