//! Notification side of the order saga.
//!
//! The [`OrderMaterializer`] consumes `order.create`, persists the final
//! order through an [`OrderRepository`] and answers with `order.created` or
//! `order.creation.failed`. It also serves the order read queries.

pub mod error;
pub mod materializer;
pub mod memory;
pub mod order;
pub mod postgres;
pub mod repository;

pub use error::{MaterializerError, Result};
pub use materializer::OrderMaterializer;
pub use memory::InMemoryOrderRepository;
pub use order::MaterializedOrder;
pub use postgres::PostgresOrderRepository;
pub use repository::OrderRepository;
