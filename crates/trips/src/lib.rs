//! Trip lifecycle domain: trips, orders, delivery memos, fiscal counters and the
//! status transition table.
//!
//! Pure domain logic only: no IO, no HTTP, no persistence concerns.

pub mod counter;
pub mod memo;
pub mod model;
pub mod notification;
pub mod order;
pub mod transition;

pub use counter::FiscalCounter;
pub use memo::{DeliveryMemo, DmId, MemoSource, MemoStatus, project};
pub use model::{PaymentType, Pricing, StatusChange, Trip, TripItem, TripPlan, TripStatus};
pub use notification::{TripEventKind, TripNotification};
pub use order::{Order, OrderTripSummary, TripMirror};
pub use transition::{CascadeEffect, StatusTransition, TransitionKind, effects_for};
