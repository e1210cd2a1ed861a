use common::ProductId;
use thiserror::Error;

/// Errors that can occur in the reservation ledger.
///
/// Refused reservations are not errors; see [`crate::ReservationFailure`].
#[derive(Debug, Error)]
pub enum LedgerError {
    /// A product definition broke the stock invariants.
    #[error("Invalid stock for product {product_id}: {reason}")]
    InvalidStock {
        product_id: ProductId,
        reason: String,
    },

    /// A stored row could not be mapped back to a domain value.
    #[error("Corrupt row: {0}")]
    CorruptRow(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// An outcome event could not be built or published.
    #[error("Channel error: {0}")]
    Channel(#[from] event_channel::ChannelError),
}

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;
