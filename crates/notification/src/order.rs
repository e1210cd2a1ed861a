use chrono::{DateTime, Utc};
use common::{Money, OrderId, UserId, order_total};
use event_channel::{LineItem, OrderDto};
use serde::{Deserialize, Serialize};

use crate::Result;
use crate::error::MaterializerError;

/// An order as persisted by the notification service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaterializedOrder {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub items: Vec<LineItem>,
    pub total_price: Money,
    pub order_date: DateTime<Utc>,
}

impl MaterializedOrder {
    /// Accepts an order-create payload, checking its total against the items.
    pub fn from_dto(dto: OrderDto) -> Result<Self> {
        let computed = order_total(dto.items.iter().map(|i| (i.price, i.discount)));
        if computed != dto.total_price {
            return Err(MaterializerError::TotalMismatch {
                order_id: dto.order_id,
                expected: dto.total_price,
                computed,
            });
        }

        Ok(Self {
            order_id: dto.order_id,
            user_id: dto.user_id,
            items: dto.items,
            total_price: dto.total_price,
            order_date: dto.order_date,
        })
    }

    /// Returns the payload for `order.created`.
    pub fn to_dto(&self) -> OrderDto {
        OrderDto {
            order_id: self.order_id.clone(),
            user_id: self.user_id.clone(),
            items: self.items.clone(),
            total_price: self.total_price,
            order_date: self.order_date,
        }
    }
}
