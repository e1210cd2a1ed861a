//! Ordering side of the order saga.
//!
//! A saga is opened per order attempt once the availability pre-check
//! passes, and is driven by outcome events from the inventory and
//! notification services:
//!
//! 1. Reserve inventory
//! 2. Materialize the order
//!
//! If materialization fails after stock was reserved, the reservation is
//! released and the saga ends COMPENSATED.

pub mod coordinator;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod record;
pub mod state;
pub mod store;

pub use coordinator::{OrderSubmission, SagaCoordinator};
pub use error::{Result, SagaError};
pub use memory::InMemorySagaStore;
pub use postgres::PostgresSagaStore;
pub use record::SagaRecord;
pub use state::{Effect, Step, is_outcome, next_step};
pub use store::SagaStore;
