//! Materializer error types.

use common::OrderId;
use thiserror::Error;

/// Errors that can occur while persisting or reading orders.
#[derive(Debug, Error)]
pub enum MaterializerError {
    /// The order's total does not match its line items.
    #[error("Total price mismatch for order {order_id}: expected {expected}, computed {computed}")]
    TotalMismatch {
        order_id: OrderId,
        expected: common::Money,
        computed: common::Money,
    },

    /// The repository refused the operation.
    #[error("Order repository unavailable: {0}")]
    StoreUnavailable(String),

    /// A stored row could not be mapped back to an order.
    #[error("Corrupt row: {0}")]
    CorruptRow(String),

    /// An event could not be built or decoded.
    #[error("Channel error: {0}")]
    Channel(#[from] event_channel::ChannelError),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Result type for materializer operations.
pub type Result<T> = std::result::Result<T, MaterializerError>;
