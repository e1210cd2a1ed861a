//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use inventory::LedgerError;
use notification::MaterializerError;
use saga::SagaError;
use thiserror::Error;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Saga coordinator error.
    Saga(SagaError),
    /// Availability or ledger error.
    Ledger(LedgerError),
    /// Order read error.
    Orders(MaterializerError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Saga(err) => saga_error_to_response(err),
            ApiError::Ledger(err) => internal(err.to_string()),
            ApiError::Orders(err) => internal(err.to_string()),
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn internal(message: String) -> (StatusCode, String) {
    tracing::error!(error = %message, "internal server error");
    (StatusCode::INTERNAL_SERVER_ERROR, message)
}

fn saga_error_to_response(err: SagaError) -> (StatusCode, String) {
    match &err {
        SagaError::InvalidOrder(_) => (StatusCode::BAD_REQUEST, err.to_string()),
        SagaError::DuplicateSaga(_) => (StatusCode::CONFLICT, err.to_string()),
        SagaError::StoreUnavailable(_) => {
            tracing::error!(error = %err, "saga store unavailable");
            (StatusCode::SERVICE_UNAVAILABLE, err.to_string())
        }
        _ => internal(err.to_string()),
    }
}

impl From<SagaError> for ApiError {
    fn from(err: SagaError) -> Self {
        ApiError::Saga(err)
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        ApiError::Ledger(err)
    }
}

impl From<MaterializerError> for ApiError {
    fn from(err: MaterializerError) -> Self {
        ApiError::Orders(err)
    }
}

/// Errors that stop the process from starting.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Failed to read catalogue {path}: {source}")]
    CatalogRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid catalogue: {0}")]
    CatalogFormat(#[from] serde_json::Error),

    #[error("Invalid catalogue entry {product_id}: {reason}")]
    CatalogEntry { product_id: String, reason: String },

    #[error("Database connection failed: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Saga(#[from] SagaError),
}
