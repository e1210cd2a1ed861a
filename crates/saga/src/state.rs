//! Saga state machine.
//!
//! State transitions:
//! ```text
//! STARTED ──┬── inventory.reserved ──► INVENTORY_RESERVED ──┬── order.created ─────────► COMPLETED
//!           │                                               └── order.creation.failed ──► COMPENSATING
//!           └── inventory.reservation.failed ──► FAILED                                     │
//!                                                             inventory.released ───────────┘──► COMPENSATED
//! ```
//!
//! Any other (status, event) pair leaves the saga untouched.

use common::SagaStatus;
use event_channel::{LineItem, SagaMessage};

/// What the coordinator must emit after persisting a transition.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Nothing further to send.
    None,

    /// Ask the materializer to persist an order with the reserved lines.
    CreateOrder(Vec<LineItem>),

    /// Ask the ledger to give back what the saga holds.
    ReleaseInventory,
}

/// One edge of the state machine.
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub from: SagaStatus,
    pub to: SagaStatus,
    pub effect: Effect,
}

impl Step {
    fn new(from: SagaStatus, to: SagaStatus, effect: Effect) -> Self {
        Self { from, to, effect }
    }
}

/// Returns the edge taken when `message` arrives in `current`, if any.
///
/// A `FAILED` saga never held stock, so nothing can lead to a release from it.
pub fn next_step(current: SagaStatus, message: &SagaMessage) -> Option<Step> {
    use SagaStatus::*;

    let step = match (current, message) {
        (Started, SagaMessage::InventoryReserved(lines)) => Step::new(
            Started,
            InventoryReserved,
            Effect::CreateOrder(lines.clone()),
        ),
        (Started, SagaMessage::InventoryReservationFailed) => {
            Step::new(Started, Failed, Effect::None)
        }
        (InventoryReserved, SagaMessage::OrderCreated(_)) => {
            Step::new(InventoryReserved, Completed, Effect::None)
        }
        (InventoryReserved, SagaMessage::OrderCreationFailed) => {
            Step::new(InventoryReserved, Compensating, Effect::ReleaseInventory)
        }
        (Compensating, SagaMessage::InventoryReleased) => {
            Step::new(Compensating, Compensated, Effect::None)
        }
        _ => return None,
    };
    Some(step)
}

/// Returns true for the outcome events the coordinator consumes.
///
/// Commands addressed to the other services travel on the same channel and
/// are not of interest here.
pub fn is_outcome(message: &SagaMessage) -> bool {
    matches!(
        message,
        SagaMessage::InventoryReserved(_)
            | SagaMessage::InventoryReservationFailed
            | SagaMessage::OrderCreated(_)
            | SagaMessage::OrderCreationFailed
            | SagaMessage::InventoryReleased
    )
}
