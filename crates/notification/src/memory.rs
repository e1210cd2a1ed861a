use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use common::{OrderId, UserId};
use tokio::sync::RwLock;

use crate::Result;
use crate::error::MaterializerError;
use crate::order::MaterializedOrder;
use crate::repository::OrderRepository;

/// In-memory order repository for testing and the single-process setup.
///
/// Orders are kept in insertion order.
#[derive(Debug, Clone, Default)]
pub struct InMemoryOrderRepository {
    orders: Arc<RwLock<Vec<MaterializedOrder>>>,
    fail_on_save: Arc<AtomicBool>,
}

impl InMemoryOrderRepository {
    /// Creates a new empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes subsequent saves fail (for testing).
    pub fn set_fail_on_save(&self, fail: bool) {
        self.fail_on_save.store(fail, Ordering::SeqCst);
    }

    /// Returns the number of stored orders.
    pub async fn order_count(&self) -> usize {
        self.orders.read().await.len()
    }
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn save(&self, order: &MaterializedOrder) -> Result<bool> {
        if self.fail_on_save.load(Ordering::SeqCst) {
            return Err(MaterializerError::StoreUnavailable(
                "repository configured to fail".to_string(),
            ));
        }

        let mut orders = self.orders.write().await;
        if orders.iter().any(|o| o.order_id == order.order_id) {
            return Ok(false);
        }
        orders.push(order.clone());
        Ok(true)
    }

    async fn get(&self, order_id: &OrderId) -> Result<Option<MaterializedOrder>> {
        Ok(self
            .orders
            .read()
            .await
            .iter()
            .find(|o| &o.order_id == order_id)
            .cloned())
    }

    async fn list_for_user(&self, user_id: &UserId) -> Result<Vec<MaterializedOrder>> {
        Ok(self
            .orders
            .read()
            .await
            .iter()
            .filter(|o| &o.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn list_all(&self) -> Result<Vec<MaterializedOrder>> {
        Ok(self.orders.read().await.clone())
    }
}
