//! Typed saga messages and their payload contracts.

use chrono::{DateTime, Utc};
use common::{Discount, Money, OrderId, ProductId, SagaId, UserId, order_total};
use serde::{Deserialize, Serialize};

use crate::event::event_types;

/// One requested line of a reservation command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationLine {
    pub product_id: ProductId,
    pub quantity: u32,
}

impl ReservationLine {
    pub fn new(product_id: impl Into<ProductId>, quantity: u32) -> Self {
        Self {
            product_id: product_id.into(),
            quantity,
        }
    }
}

/// Payload of `inventory.reserve`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReserveInventory {
    pub saga_id: SagaId,
    pub order_id: OrderId,
    pub products: Vec<ReservationLine>,
}

/// A priced line, as reserved by the ledger and as persisted on the order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub product_id: ProductId,
    pub name: String,
    pub quantity: u32,
    pub price: Money,
    pub discount: Discount,
}

/// Payload of `order.create` and `order.created`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderDto {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub items: Vec<LineItem>,
    pub total_price: Money,
    pub order_date: DateTime<Utc>,
}

impl OrderDto {
    /// Builds the final order from reserved lines, pricing it with [`order_total`].
    pub fn priced(order_id: OrderId, user_id: UserId, items: Vec<LineItem>) -> Self {
        let total_price = order_total(items.iter().map(|i| (i.price, i.discount)));
        Self {
            order_id,
            user_id,
            items,
            total_price,
            order_date: Utc::now(),
        }
    }
}

/// The closed set of messages this build understands, plus a catch-all.
#[derive(Debug, Clone, PartialEq)]
pub enum SagaMessage {
    /// `inventory.reserve`: coordinator asks the ledger to hold stock.
    ReserveInventory(ReserveInventory),

    /// `inventory.reserved`: echo of the lines the ledger holds.
    InventoryReserved(Vec<LineItem>),

    /// `inventory.reservation.failed`: nothing was reserved.
    InventoryReservationFailed,

    /// `order.create`: coordinator asks the materializer to persist the order.
    CreateOrder(OrderDto),

    /// `order.created`: the order is persisted.
    OrderCreated(OrderDto),

    /// `order.creation.failed`: the order could not be persisted.
    OrderCreationFailed,

    /// `inventory.release`: compensation, carries the order id.
    ReleaseInventory(OrderId),

    /// `inventory.released`: compensation done.
    InventoryReleased,

    /// Any tag this build does not know.
    Unknown(String),
}

impl SagaMessage {
    /// Returns the wire tag of the message.
    pub fn event_type(&self) -> &str {
        match self {
            SagaMessage::ReserveInventory(_) => event_types::INVENTORY_RESERVE,
            SagaMessage::InventoryReserved(_) => event_types::INVENTORY_RESERVED,
            SagaMessage::InventoryReservationFailed => event_types::INVENTORY_RESERVATION_FAILED,
            SagaMessage::CreateOrder(_) => event_types::ORDER_CREATE,
            SagaMessage::OrderCreated(_) => event_types::ORDER_CREATED,
            SagaMessage::OrderCreationFailed => event_types::ORDER_CREATION_FAILED,
            SagaMessage::ReleaseInventory(_) => event_types::INVENTORY_RELEASE,
            SagaMessage::InventoryReleased => event_types::INVENTORY_RELEASED,
            SagaMessage::Unknown(tag) => tag,
        }
    }

    /// Serializes the payload; outcome-only messages carry `null`.
    pub fn payload(&self) -> serde_json::Result<serde_json::Value> {
        match self {
            SagaMessage::ReserveInventory(p) => serde_json::to_value(p),
            SagaMessage::InventoryReserved(lines) => serde_json::to_value(lines),
            SagaMessage::CreateOrder(order) | SagaMessage::OrderCreated(order) => {
                serde_json::to_value(order)
            }
            SagaMessage::ReleaseInventory(order_id) => serde_json::to_value(order_id),
            SagaMessage::InventoryReservationFailed
            | SagaMessage::OrderCreationFailed
            | SagaMessage::InventoryReleased
            | SagaMessage::Unknown(_) => Ok(serde_json::Value::Null),
        }
    }
}
