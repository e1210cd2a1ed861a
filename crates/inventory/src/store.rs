use async_trait::async_trait;
use common::{OrderId, ProductId, SagaId};
use event_channel::ReservationLine;

use crate::Result;
use crate::model::{ProductStock, ReservationRecord, ReserveOutcome};

/// Persistence of product stock and reservation records.
///
/// `reserve`, `release` and `confirm` are each atomic: concurrent calls that
/// touch the same product are serialized, so two sagas can never both see
/// enough stock for only one reservation.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Inserts or replaces a product, including its stock levels.
    ///
    /// Units held by RESERVED records stay out of `available_quantity`, and
    /// a `total_quantity` below them is refused with `InvalidStock`.
    async fn upsert_product(&self, product: ProductStock) -> Result<()>;

    /// Looks up one product.
    async fn get_product(&self, product_id: &ProductId) -> Result<Option<ProductStock>>;

    /// Lists all products ordered by id.
    async fn list_products(&self) -> Result<Vec<ProductStock>>;

    /// Reads the stock of the given products; unknown ids are omitted.
    async fn stock_levels(&self, product_ids: &[ProductId]) -> Result<Vec<ProductStock>>;

    /// Holds stock for every line or for none.
    ///
    /// If the saga already holds reservations, nothing changes and the prior
    /// lines are returned with `replayed` set.
    async fn reserve(
        &self,
        saga_id: &SagaId,
        order_id: &OrderId,
        lines: &[ReservationLine],
    ) -> Result<ReserveOutcome>;

    /// Gives back every RESERVED record of the saga.
    ///
    /// Returns the records released by this call.
    async fn release(&self, saga_id: &SagaId) -> Result<Vec<ReservationRecord>>;

    /// Turns every RESERVED record of the saga into a sale.
    ///
    /// Returns the records confirmed by this call.
    async fn confirm(&self, saga_id: &SagaId) -> Result<Vec<ReservationRecord>>;

    /// Returns the saga's reservation records in creation order.
    async fn reservations_for(&self, saga_id: &SagaId) -> Result<Vec<ReservationRecord>>;
}

#[async_trait]
impl<L: LedgerStore + ?Sized> LedgerStore for std::sync::Arc<L> {
    async fn upsert_product(&self, product: ProductStock) -> Result<()> {
        (**self).upsert_product(product).await
    }

    async fn get_product(&self, product_id: &ProductId) -> Result<Option<ProductStock>> {
        (**self).get_product(product_id).await
    }

    async fn list_products(&self) -> Result<Vec<ProductStock>> {
        (**self).list_products().await
    }

    async fn stock_levels(&self, product_ids: &[ProductId]) -> Result<Vec<ProductStock>> {
        (**self).stock_levels(product_ids).await
    }

    async fn reserve(
        &self,
        saga_id: &SagaId,
        order_id: &OrderId,
        lines: &[ReservationLine],
    ) -> Result<ReserveOutcome> {
        (**self).reserve(saga_id, order_id, lines).await
    }

    async fn release(&self, saga_id: &SagaId) -> Result<Vec<ReservationRecord>> {
        (**self).release(saga_id).await
    }

    async fn confirm(&self, saga_id: &SagaId) -> Result<Vec<ReservationRecord>> {
        (**self).confirm(saga_id).await
    }

    async fn reservations_for(&self, saga_id: &SagaId) -> Result<Vec<ReservationRecord>> {
        (**self).reservations_for(saga_id).await
    }
}
