//! Order submission, status and read endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use common::{OrderId, OrderStatus, UserId};
use event_channel::ReservationLine;
use notification::MaterializedOrder;
use saga::OrderSubmission;
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::error::ApiError;

// -- Request types --

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitOrderRequest {
    pub user_id: String,
    pub items: Vec<ReservationLine>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusQuery {
    pub user_id: String,
}

// -- Response types --

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderStatusResponse {
    pub order_id: OrderId,
    pub order_status: OrderStatus,
}

fn user_id(raw: String) -> Result<UserId, ApiError> {
    if raw.trim().is_empty() {
        return Err(ApiError::BadRequest("userId is required".to_string()));
    }
    Ok(UserId::new(raw))
}

// -- Handlers --

/// POST /orders: check availability and start a saga.
///
/// 201 when a saga was opened, 400 with the availability partitions when
/// something is unavailable.
#[tracing::instrument(skip(state, req))]
pub async fn submit(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SubmitOrderRequest>,
) -> Result<(StatusCode, Json<OrderSubmission>), ApiError> {
    let user_id = user_id(req.user_id)?;
    let submission = state.coordinator.submit_order(user_id, req.items).await?;

    let status = if submission.accepted() {
        StatusCode::CREATED
    } else {
        StatusCode::BAD_REQUEST
    };
    Ok((status, Json(submission)))
}

/// GET /orders/{order_id}/status?userId=: caller-facing order status.
#[tracing::instrument(skip(state, query))]
pub async fn status(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<String>,
    Query(query): Query<StatusQuery>,
) -> Result<Json<OrderStatusResponse>, ApiError> {
    let user_id = user_id(query.user_id)?;
    let order_id = OrderId::new(order_id);
    let order_status = state
        .coordinator
        .order_status(&user_id, &order_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Order {order_id} not found")))?;

    Ok(Json(OrderStatusResponse {
        order_id,
        order_status,
    }))
}

/// GET /orders/{order_id}: a materialized order.
#[tracing::instrument(skip(state))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<String>,
) -> Result<Json<MaterializedOrder>, ApiError> {
    let order_id = OrderId::new(order_id);
    state
        .materializer
        .get_order(&order_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Order {order_id} not found")))
}

/// GET /orders: every materialized order.
#[tracing::instrument(skip(state))]
pub async fn list(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<MaterializedOrder>>, ApiError> {
    Ok(Json(state.materializer.all_orders().await?))
}

/// GET /users/{user_id}/orders: a user's materialized orders.
#[tracing::instrument(skip(state))]
pub async fn list_for_user(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<MaterializedOrder>>, ApiError> {
    let user_id = UserId::new(user_id);
    Ok(Json(state.materializer.orders_for_user(&user_id).await?))
}
