//! Inventory side of the order saga.
//!
//! Owns per-product stock counters and per-saga reservation records. The
//! [`ReservationLedger`] consumes `inventory.reserve`, `inventory.release`
//! and `order.created` from the event channel; the [`AvailabilityChecker`]
//! answers synchronous availability queries.

pub mod availability;
pub mod error;
pub mod ledger;
pub mod memory;
pub mod model;
pub mod postgres;
pub mod store;

pub use availability::{
    AvailabilityChecker, AvailabilityReport, AvailableProduct, UnavailableProduct,
    UnavailableReason,
};
pub use error::{LedgerError, Result};
pub use ledger::ReservationLedger;
pub use memory::InMemoryLedgerStore;
pub use model::{
    ProductStock, ReservationFailure, ReservationRecord, ReservationStatus, ReserveOutcome,
};
pub use postgres::PostgresLedgerStore;
pub use store::LedgerStore;
