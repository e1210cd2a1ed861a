use async_trait::async_trait;
use common::{OrderId, UserId};

use crate::Result;
use crate::order::MaterializedOrder;

/// Storage of materialized orders.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Persists an order unless one with the same id exists.
    ///
    /// Returns `false` when the order was already stored; the stored copy
    /// is left untouched.
    async fn save(&self, order: &MaterializedOrder) -> Result<bool>;

    /// Loads an order by id.
    async fn get(&self, order_id: &OrderId) -> Result<Option<MaterializedOrder>>;

    /// Lists a user's orders, oldest first.
    async fn list_for_user(&self, user_id: &UserId) -> Result<Vec<MaterializedOrder>>;

    /// Lists every order, oldest first.
    async fn list_all(&self) -> Result<Vec<MaterializedOrder>>;
}

#[async_trait]
impl<R: OrderRepository + ?Sized> OrderRepository for std::sync::Arc<R> {
    async fn save(&self, order: &MaterializedOrder) -> Result<bool> {
        (**self).save(order).await
    }

    async fn get(&self, order_id: &OrderId) -> Result<Option<MaterializedOrder>> {
        (**self).get(order_id).await
    }

    async fn list_for_user(&self, user_id: &UserId) -> Result<Vec<MaterializedOrder>> {
        (**self).list_for_user(user_id).await
    }

    async fn list_all(&self) -> Result<Vec<MaterializedOrder>> {
        (**self).list_all().await
    }
}
