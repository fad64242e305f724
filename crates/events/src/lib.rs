//! Trip notifications as events: envelope, bus abstraction and a broadcast bus.
//!
//! Notifications are best-effort side channels; nothing in the core waits on a
//! subscriber for correctness.

pub mod broadcast_bus;
pub mod bus;
pub mod envelope;
pub mod event;

pub use broadcast_bus::BroadcastBus;
pub use bus::{EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
