//! Saga and order statuses.

use serde::{Deserialize, Serialize};

/// The state of a saga in its lifecycle.
///
/// State transitions:
/// ```text
/// Started ──┬──► InventoryReserved ──┬──► Completed
///           │                        └──► Compensating ──► Compensated
///           └──► Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SagaStatus {
    /// Saga opened, reservation command sent.
    Started,

    /// Stock is held for the order, order creation requested.
    InventoryReserved,

    /// Order materialized (terminal state).
    Completed,

    /// Reservation was refused; nothing to compensate.
    Failed,

    /// Order creation failed, release of the reservation requested.
    Compensating,

    /// Reservation released after a failure (terminal state).
    Compensated,
}

impl SagaStatus {
    /// Returns true for the terminal states of the state machine.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SagaStatus::Completed | SagaStatus::Compensated)
    }

    /// Returns true when no further event can move the saga.
    ///
    /// `Failed` is not terminal in the state graph but nothing was reserved,
    /// so it never leads anywhere.
    pub fn is_settled(&self) -> bool {
        self.is_terminal() || matches!(self, SagaStatus::Failed)
    }

    /// Returns the wire name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            SagaStatus::Started => "STARTED",
            SagaStatus::InventoryReserved => "INVENTORY_RESERVED",
            SagaStatus::Completed => "COMPLETED",
            SagaStatus::Failed => "FAILED",
            SagaStatus::Compensating => "COMPENSATING",
            SagaStatus::Compensated => "COMPENSATED",
        }
    }
}

impl std::fmt::Display for SagaStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing a status name that is not recognized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStatus(pub String);

impl std::fmt::Display for UnknownStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown saga status '{}'", self.0)
    }
}

impl std::error::Error for UnknownStatus {}

impl std::str::FromStr for SagaStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "STARTED" => Ok(SagaStatus::Started),
            "INVENTORY_RESERVED" => Ok(SagaStatus::InventoryReserved),
            "COMPLETED" => Ok(SagaStatus::Completed),
            "FAILED" => Ok(SagaStatus::Failed),
            "COMPENSATING" => Ok(SagaStatus::Compensating),
            "COMPENSATED" => Ok(SagaStatus::Compensated),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// Order status exposed to the caller, derived from the saga status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Saga still running; poll again.
    Pending,
    /// Order created successfully.
    Created,
    /// Order will not be created.
    Failed,
}

impl OrderStatus {
    /// Derives the order status from a persisted status name.
    ///
    /// Unrecognized names fail open to `Pending`.
    pub fn from_status_name(name: &str) -> Self {
        name.parse::<SagaStatus>()
            .map(OrderStatus::from)
            .unwrap_or(OrderStatus::Pending)
    }

    /// Returns the wire name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Created => "CREATED",
            OrderStatus::Failed => "FAILED",
        }
    }
}

impl From<SagaStatus> for OrderStatus {
    fn from(status: SagaStatus) -> Self {
        match status {
            SagaStatus::Started | SagaStatus::InventoryReserved => OrderStatus::Pending,
            SagaStatus::Completed => OrderStatus::Created,
            SagaStatus::Failed | SagaStatus::Compensating | SagaStatus::Compensated => {
                OrderStatus::Failed
            }
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
