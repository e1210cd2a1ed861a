use chrono::{DateTime, Utc};
use common::{OrderId, SagaId, SagaStatus};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{ChannelError, Result};
use crate::message::{LineItem, OrderDto, ReserveInventory, SagaMessage};

/// Wire tags of the event types this build understands.
pub mod event_types {
    pub const INVENTORY_RESERVE: &str = "inventory.reserve";
    pub const INVENTORY_RESERVED: &str = "inventory.reserved";
    pub const INVENTORY_RESERVATION_FAILED: &str = "inventory.reservation.failed";
    pub const ORDER_CREATE: &str = "order.create";
    pub const ORDER_CREATED: &str = "order.created";
    pub const ORDER_CREATION_FAILED: &str = "order.creation.failed";
    pub const INVENTORY_RELEASE: &str = "inventory.release";
    pub const INVENTORY_RELEASED: &str = "inventory.released";
}

/// The envelope every saga message travels in.
///
/// `status` is the sender's view of the saga and is advisory only: receivers
/// always consult their own state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SagaEvent {
    /// Correlation key; also the partition key of the channel.
    pub saga_id: SagaId,

    /// Open-ended string tag, see [`event_types`].
    pub event_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    /// Type depends on `event_type`; `null` for outcome-only events.
    #[serde(default)]
    pub payload: serde_json::Value,

    /// Set on failure events and carried forward into compensation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    /// When the sender created the envelope.
    #[serde(default = "Utc::now")]
    pub occurred_at: DateTime<Utc>,
}

impl SagaEvent {
    /// Wraps a typed message in an envelope.
    pub fn new(saga_id: SagaId, message: &SagaMessage) -> Result<Self> {
        Ok(Self {
            saga_id,
            event_type: message.event_type().to_string(),
            status: None,
            payload: message.payload()?,
            error_message: None,
            occurred_at: Utc::now(),
        })
    }

    /// Creates an envelope with a raw tag and payload, bypassing the typed layer.
    pub fn raw(
        saga_id: impl Into<SagaId>,
        event_type: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            saga_id: saga_id.into(),
            event_type: event_type.into(),
            status: None,
            payload,
            error_message: None,
            occurred_at: Utc::now(),
        }
    }

    /// Sets the advisory status.
    pub fn with_status(mut self, status: SagaStatus) -> Self {
        self.status = Some(status.as_str().to_string());
        self
    }

    /// Sets the error message.
    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    /// Parses the advisory status, if present and recognized.
    pub fn advisory_status(&self) -> Option<SagaStatus> {
        self.status.as_deref().and_then(|s| s.parse().ok())
    }

    /// Decodes the envelope into a typed message.
    ///
    /// Unrecognized tags decode to [`SagaMessage::Unknown`]. A recognized tag
    /// whose payload does not match its contract is an error.
    pub fn decode(&self) -> Result<SagaMessage> {
        use event_types::*;

        let message = match self.event_type.as_str() {
            INVENTORY_RESERVE => SagaMessage::ReserveInventory(self.payload_as::<ReserveInventory>()?),
            INVENTORY_RESERVED => SagaMessage::InventoryReserved(self.payload_as::<Vec<LineItem>>()?),
            INVENTORY_RESERVATION_FAILED => SagaMessage::InventoryReservationFailed,
            ORDER_CREATE => SagaMessage::CreateOrder(self.payload_as::<OrderDto>()?),
            ORDER_CREATED => SagaMessage::OrderCreated(self.payload_as::<OrderDto>()?),
            ORDER_CREATION_FAILED => SagaMessage::OrderCreationFailed,
            INVENTORY_RELEASE => SagaMessage::ReleaseInventory(self.payload_as::<OrderId>()?),
            INVENTORY_RELEASED => SagaMessage::InventoryReleased,
            other => SagaMessage::Unknown(other.to_string()),
        };
        Ok(message)
    }

    fn payload_as<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.payload.clone()).map_err(|source| {
            ChannelError::MalformedPayload {
                event_type: self.event_type.clone(),
                source,
            }
        })
    }
}
