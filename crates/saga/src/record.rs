use chrono::{DateTime, Utc};
use common::{OrderId, SagaId, SagaStatus, UserId};
use serde::{Deserialize, Serialize};

/// Durable record of one order attempt.
///
/// Exactly one exists per saga id. Only the coordinator mutates it, and only
/// along the edges of the saga state machine; records are never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SagaRecord {
    pub saga_id: SagaId,
    pub order_id: OrderId,
    pub user_id: UserId,
    pub status: SagaStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SagaRecord {
    /// Opens a new saga in `STARTED` with fresh ids.
    pub fn start(user_id: UserId) -> Self {
        Self::with_ids(SagaId::generate(), OrderId::generate(), user_id)
    }

    /// Opens a new saga in `STARTED` with the given ids.
    pub fn with_ids(saga_id: SagaId, order_id: OrderId, user_id: UserId) -> Self {
        let now = Utc::now();
        Self {
            saga_id,
            order_id,
            user_id,
            status: SagaStatus::Started,
            created_at: now,
            updated_at: now,
        }
    }
}
