use async_trait::async_trait;
use common::{OrderId, SagaId, SagaStatus, UserId};

use crate::Result;
use crate::record::SagaRecord;

/// Durable storage of saga records.
#[async_trait]
pub trait SagaStore: Send + Sync {
    /// Persists a new record. Fails with `DuplicateSaga` if the id exists.
    async fn insert(&self, record: SagaRecord) -> Result<()>;

    /// Loads a record by saga id.
    async fn get(&self, saga_id: &SagaId) -> Result<Option<SagaRecord>>;

    /// Loads the record for a user's order.
    async fn find_by_order(&self, user_id: &UserId, order_id: &OrderId)
    -> Result<Option<SagaRecord>>;

    /// Returns the persisted status name of a user's order, without parsing it.
    async fn status_name(&self, user_id: &UserId, order_id: &OrderId) -> Result<Option<String>>;

    /// Moves a saga from `from` to `to` if it is still in `from`.
    ///
    /// Returns the updated record, or `None` when the saga is missing or has
    /// already moved on.
    async fn transition(
        &self,
        saga_id: &SagaId,
        from: SagaStatus,
        to: SagaStatus,
    ) -> Result<Option<SagaRecord>>;

    /// Lists records currently in `status`, oldest first.
    async fn list_by_status(&self, status: SagaStatus) -> Result<Vec<SagaRecord>>;
}

#[async_trait]
impl<S: SagaStore + ?Sized> SagaStore for std::sync::Arc<S> {
    async fn insert(&self, record: SagaRecord) -> Result<()> {
        (**self).insert(record).await
    }

    async fn get(&self, saga_id: &SagaId) -> Result<Option<SagaRecord>> {
        (**self).get(saga_id).await
    }

    async fn find_by_order(
        &self,
        user_id: &UserId,
        order_id: &OrderId,
    ) -> Result<Option<SagaRecord>> {
        (**self).find_by_order(user_id, order_id).await
    }

    async fn status_name(&self, user_id: &UserId, order_id: &OrderId) -> Result<Option<String>> {
        (**self).status_name(user_id, order_id).await
    }

    async fn transition(
        &self,
        saga_id: &SagaId,
        from: SagaStatus,
        to: SagaStatus,
    ) -> Result<Option<SagaRecord>> {
        (**self).transition(saga_id, from, to).await
    }

    async fn list_by_status(&self, status: SagaStatus) -> Result<Vec<SagaRecord>> {
        (**self).list_by_status(status).await
    }
}
