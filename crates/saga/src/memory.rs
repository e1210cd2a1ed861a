use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use common::{OrderId, SagaId, SagaStatus, UserId};
use tokio::sync::RwLock;

use crate::error::SagaError;
use crate::record::SagaRecord;
use crate::store::SagaStore;
use crate::Result;

#[derive(Debug, Default)]
struct SagaTable {
    records: HashMap<SagaId, SagaRecord>,
    history: HashMap<SagaId, Vec<SagaStatus>>,
}

/// In-memory saga store for testing.
///
/// Besides the records, it keeps every status each saga has been in, so
/// tests can assert on the exact path a saga took.
#[derive(Debug, Clone, Default)]
pub struct InMemorySagaStore {
    table: Arc<RwLock<SagaTable>>,
    fail_on_insert: Arc<AtomicBool>,
}

impl InMemorySagaStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the statuses a saga went through, in order.
    pub async fn history(&self, saga_id: &SagaId) -> Vec<SagaStatus> {
        self.table
            .read()
            .await
            .history
            .get(saga_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Returns the number of sagas stored.
    pub async fn saga_count(&self) -> usize {
        self.table.read().await.records.len()
    }

    /// Makes subsequent inserts fail (for testing).
    pub fn set_fail_on_insert(&self, fail: bool) {
        self.fail_on_insert.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl SagaStore for InMemorySagaStore {
    async fn insert(&self, record: SagaRecord) -> Result<()> {
        if self.fail_on_insert.load(Ordering::SeqCst) {
            return Err(SagaError::StoreUnavailable(
                "store configured to fail".to_string(),
            ));
        }

        let mut table = self.table.write().await;
        if table.records.contains_key(&record.saga_id) {
            return Err(SagaError::DuplicateSaga(record.saga_id));
        }
        table
            .history
            .insert(record.saga_id.clone(), vec![record.status]);
        table.records.insert(record.saga_id.clone(), record);
        Ok(())
    }

    async fn get(&self, saga_id: &SagaId) -> Result<Option<SagaRecord>> {
        Ok(self.table.read().await.records.get(saga_id).cloned())
    }

    async fn find_by_order(
        &self,
        user_id: &UserId,
        order_id: &OrderId,
    ) -> Result<Option<SagaRecord>> {
        Ok(self
            .table
            .read()
            .await
            .records
            .values()
            .find(|r| &r.user_id == user_id && &r.order_id == order_id)
            .cloned())
    }

    async fn status_name(&self, user_id: &UserId, order_id: &OrderId) -> Result<Option<String>> {
        Ok(self
            .find_by_order(user_id, order_id)
            .await?
            .map(|r| r.status.as_str().to_string()))
    }

    async fn transition(
        &self,
        saga_id: &SagaId,
        from: SagaStatus,
        to: SagaStatus,
    ) -> Result<Option<SagaRecord>> {
        let mut guard = self.table.write().await;
        let table = &mut *guard;

        let Some(record) = table.records.get_mut(saga_id) else {
            return Ok(None);
        };
        if record.status != from {
            return Ok(None);
        }

        record.status = to;
        record.updated_at = Utc::now().max(record.updated_at);
        table.history.entry(saga_id.clone()).or_default().push(to);
        Ok(Some(record.clone()))
    }

    async fn list_by_status(&self, status: SagaStatus) -> Result<Vec<SagaRecord>> {
        let mut records: Vec<_> = self
            .table
            .read()
            .await
            .records
            .values()
            .filter(|r| r.status == status)
            .cloned()
            .collect();
        records.sort_by_key(|r| r.created_at);
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(saga: &str) -> SagaRecord {
        SagaRecord::with_ids(
            SagaId::new(saga),
            OrderId::new(format!("order-{saga}")),
            UserId::new("user-1"),
        )
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let store = InMemorySagaStore::new();
        store.insert(record("s1")).await.unwrap();

        let loaded = store.get(&SagaId::new("s1")).await.unwrap().unwrap();
        assert_eq!(loaded.status, SagaStatus::Started);
        assert_eq!(loaded.order_id, OrderId::new("order-s1"));
        assert!(store.get(&SagaId::new("nope")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_insert_rejected() {
        let store = InMemorySagaStore::new();
        store.insert(record("s1")).await.unwrap();
        let err = store.insert(record("s1")).await.unwrap_err();
        assert!(matches!(err, SagaError::DuplicateSaga(_)));
        assert_eq!(store.saga_count().await, 1);
    }

    #[tokio::test]
    async fn test_transition_is_compare_and_set() {
        let store = InMemorySagaStore::new();
        store.insert(record("s1")).await.unwrap();
        let id = SagaId::new("s1");

        let moved = store
            .transition(&id, SagaStatus::Started, SagaStatus::InventoryReserved)
            .await
            .unwrap();
        assert_eq!(moved.unwrap().status, SagaStatus::InventoryReserved);

        let stale = store
            .transition(&id, SagaStatus::Started, SagaStatus::Failed)
            .await
            .unwrap();
        assert!(stale.is_none());

        assert_eq!(
            store.history(&id).await,
            vec![SagaStatus::Started, SagaStatus::InventoryReserved]
        );
    }

    #[tokio::test]
    async fn test_updated_at_is_monotonic() {
        let store = InMemorySagaStore::new();
        store.insert(record("s1")).await.unwrap();
        let id = SagaId::new("s1");
        let before = store.get(&id).await.unwrap().unwrap().updated_at;

        let after = store
            .transition(&id, SagaStatus::Started, SagaStatus::Failed)
            .await
            .unwrap()
            .unwrap()
            .updated_at;
        assert!(after >= before);
    }

    #[tokio::test]
    async fn test_find_by_order_requires_matching_user() {
        let store = InMemorySagaStore::new();
        store.insert(record("s1")).await.unwrap();
        let order = OrderId::new("order-s1");

        assert!(
            store
                .find_by_order(&UserId::new("user-1"), &order)
                .await
                .unwrap()
                .is_some()
        );
        assert!(
            store
                .find_by_order(&UserId::new("someone-else"), &order)
                .await
                .unwrap()
                .is_none()
        );
        assert_eq!(
            store
                .status_name(&UserId::new("user-1"), &order)
                .await
                .unwrap()
                .as_deref(),
            Some("STARTED")
        );
    }

    #[tokio::test]
    async fn test_list_by_status() {
        let store = InMemorySagaStore::new();
        store.insert(record("s1")).await.unwrap();
        store.insert(record("s2")).await.unwrap();
        store
            .transition(
                &SagaId::new("s2"),
                SagaStatus::Started,
                SagaStatus::InventoryReserved,
            )
            .await
            .unwrap();

        let started = store.list_by_status(SagaStatus::Started).await.unwrap();
        assert_eq!(started.len(), 1);
        assert_eq!(started[0].saga_id, SagaId::new("s1"));
    }
}
