//! Saga inspection endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use common::SagaId;
use saga::SagaRecord;

use crate::AppState;
use crate::error::ApiError;

/// GET /sagas/{saga_id}: the persisted saga record.
#[tracing::instrument(skip(state))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(saga_id): Path<String>,
) -> Result<Json<SagaRecord>, ApiError> {
    let saga_id = SagaId::new(saga_id);
    state
        .coordinator
        .get_saga(&saga_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Saga {saga_id} not found")))
}
