//! Shared vocabulary for the ordering, inventory and notification services.
//!
//! Everything that crosses a service boundary lives here: correlation ids,
//! money, saga and order statuses, and the order total formula that every
//! party must agree on.

pub mod money;
pub mod status;
pub mod types;

pub use money::{Discount, InvalidDiscount, Money, order_total};
pub use status::{OrderStatus, SagaStatus, UnknownStatus};
pub use types::{OrderId, ProductId, SagaId, UserId};
