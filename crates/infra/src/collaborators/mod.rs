//! Services the trip engine calls out to: orders, the ledger and
//! notifications. Store-backed implementations live alongside each trait.

pub mod ledger;
pub mod notify;
pub mod orders;

pub use ledger::{LedgerService, StoreLedgerService};
pub use notify::{BusNotifier, Notifier, NotifyError};
pub use orders::{OrderService, StoreOrderService};
