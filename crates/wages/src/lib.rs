//! Trip-wage settlement domain: per-worker pay, attendance arithmetic and
//! batch planning. No IO.

pub mod attendance;
pub mod batch;
pub mod wage;

pub use attendance::{AttendanceDay, AttendanceRecord, YearMonth};
pub use batch::chunk_size;
pub use wage::{SettlementStamp, TripWage, WageStatus, WorkerCredit, per_worker};
