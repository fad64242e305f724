//! Status transitions and the table of cascade effects they trigger.

use serde::{Deserialize, Serialize};

use crate::model::TripStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TransitionKind {
    Unchanged,
    Forward,
    Revert,
}

/// A (before, after) status pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusTransition {
    pub before: TripStatus,
    pub after: TripStatus,
}

impl StatusTransition {
    pub fn new(before: TripStatus, after: TripStatus) -> Self {
        Self { before, after }
    }

    pub fn kind(&self) -> TransitionKind {
        match self.after.rank().cmp(&self.before.rank()) {
            core::cmp::Ordering::Equal => TransitionKind::Unchanged,
            core::cmp::Ordering::Greater => TransitionKind::Forward,
            core::cmp::Ordering::Less => TransitionKind::Revert,
        }
    }

    pub fn is_noop(&self) -> bool {
        self.kind() == TransitionKind::Unchanged
    }

    pub fn is_forward(&self) -> bool {
        self.kind() == TransitionKind::Forward
    }

    pub fn is_revert(&self) -> bool {
        self.kind() == TransitionKind::Revert
    }

    /// The trip was at or above `status` and is now below it.
    pub fn crossed_below(&self, status: TripStatus) -> bool {
        self.before.rank() >= status.rank() && self.after.rank() < status.rank()
    }

    /// The trip was below `status` and is now at or above it.
    pub fn crossed_above(&self, status: TripStatus) -> bool {
        self.before.rank() < status.rank() && self.after.rank() >= status.rank()
    }

    /// Forward move landing exactly on `status`.
    pub fn entered(&self, status: TripStatus) -> bool {
        self.is_forward() && self.after == status
    }
}

/// Secondary updates a committed transition requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CascadeEffect {
    /// Copy status and timestamps into the order's trip summary.
    MirrorOrder { clear_stale: bool },
    /// Advance-payment credit recorded at dispatch.
    CreateDispatchEntry,
    /// Delivery fields on the active dispatch memo.
    StampDelivery,
    /// Null the delivery fields on the delivered dispatch memo.
    RevertDelivery,
    /// Make sure the return-trigger memo exists.
    EnsureReturnMemo,
    /// Return fields on the dispatch memo.
    StampReturn,
    /// Pay-on-delivery wage-pending credit recorded at return.
    CreateReturnEntry,
    /// Put the returned dispatch memo back to delivered.
    RevertReturn,
    CancelReturnEntry,
    CancelDispatchEntry,
    Notify,
}

/// Effects for a transition, in execution order. Empty for a no-op.
pub fn effects_for(transition: StatusTransition) -> Vec<CascadeEffect> {
    use CascadeEffect::*;

    if transition.is_noop() {
        return Vec::new();
    }
    let after = transition.after;
    let mut effects = vec![MirrorOrder {
        clear_stale: after == TripStatus::Dispatched,
    }];

    if transition.crossed_above(TripStatus::Dispatched) {
        effects.push(CreateDispatchEntry);
    }
    if transition.entered(TripStatus::Delivered) {
        effects.push(StampDelivery);
    }
    if transition.crossed_below(TripStatus::Returned) {
        effects.push(RevertReturn);
        effects.push(CancelReturnEntry);
    }
    if transition.crossed_below(TripStatus::Delivered) {
        effects.push(RevertDelivery);
    }
    if transition.crossed_below(TripStatus::Dispatched) {
        effects.push(CancelDispatchEntry);
    }
    if after == TripStatus::Returned {
        effects.push(EnsureReturnMemo);
        effects.push(StampReturn);
        effects.push(CreateReturnEntry);
    }
    if transition.entered(TripStatus::Dispatched) || transition.entered(TripStatus::Delivered) {
        effects.push(Notify);
    }
    effects
}
