//! Saga error types.

use common::SagaId;
use event_channel::ChannelError;
use inventory::LedgerError;
use thiserror::Error;

/// Errors that can occur during saga operations.
#[derive(Debug, Error)]
pub enum SagaError {
    /// The order request was rejected before any saga was opened.
    #[error("Invalid order: {0}")]
    InvalidOrder(String),

    /// A saga with this id already exists.
    #[error("Saga already exists: {0}")]
    DuplicateSaga(SagaId),

    /// A persisted status no longer parses.
    #[error("Saga {saga_id} has unrecognized status '{status}'")]
    UnrecognizedStatus { saga_id: SagaId, status: String },

    /// The availability check could not be answered.
    #[error("Availability check failed: {0}")]
    Availability(#[from] LedgerError),

    /// An event could not be built or decoded.
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    /// The saga store refused the operation.
    #[error("Saga store unavailable: {0}")]
    StoreUnavailable(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;
