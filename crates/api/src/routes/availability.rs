//! Availability check endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use event_channel::ReservationLine;
use inventory::{AvailabilityChecker, AvailabilityReport};
use serde::Deserialize;

use crate::AppState;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct AvailabilityRequest {
    pub items: Vec<ReservationLine>,
}

/// POST /availability: partitions the requested lines into available and
/// unavailable products. Read-only.
#[tracing::instrument(skip(state, req))]
pub async fn check(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AvailabilityRequest>,
) -> Result<Json<AvailabilityReport>, ApiError> {
    if req.items.is_empty() {
        return Err(ApiError::BadRequest("items must not be empty".to_string()));
    }
    Ok(Json(state.ledger.check_availability(&req.items).await?))
}
