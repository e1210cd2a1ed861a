use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use common::{OrderId, ProductId, SagaId};
use event_channel::ReservationLine;
use tokio::sync::Mutex;

use crate::Result;
use crate::model::{
    ProductStock, ReservationRecord, ReservationStatus, ReserveOutcome, first_shortfall,
    merge_lines,
};
use crate::store::LedgerStore;

#[derive(Debug, Default)]
struct LedgerState {
    products: BTreeMap<ProductId, ProductStock>,
    reservations: Vec<ReservationRecord>,
}

impl LedgerState {
    fn replay(&self, saga_id: &SagaId) -> Option<ReserveOutcome> {
        let lines: Vec<_> = self
            .reservations
            .iter()
            .filter(|r| &r.saga_id == saga_id)
            .map(ReservationRecord::line_item)
            .collect();
        (!lines.is_empty()).then_some(ReserveOutcome::Reserved {
            lines,
            replayed: true,
        })
    }

    /// Units of a product currently held by RESERVED records.
    fn held(&self, product_id: &ProductId) -> u32 {
        self.reservations
            .iter()
            .filter(|r| &r.product_id == product_id && r.status == ReservationStatus::Reserved)
            .fold(0u32, |sum, r| sum.saturating_add(r.quantity))
    }

    /// Moves every RESERVED record of the saga to `to`, applying `adjust` to
    /// the product stock of each.
    ///
    /// Stock changes are staged first; if any is refused nothing changes.
    fn settle(
        &mut self,
        saga_id: &SagaId,
        to: ReservationStatus,
        adjust: impl Fn(&mut ProductStock, u32) -> Result<()>,
    ) -> Result<Vec<ReservationRecord>> {
        let held: Vec<usize> = self
            .reservations
            .iter()
            .enumerate()
            .filter(|(_, r)| &r.saga_id == saga_id && r.status == ReservationStatus::Reserved)
            .map(|(i, _)| i)
            .collect();

        let mut staged = Vec::with_capacity(held.len());
        for &i in &held {
            let record = &self.reservations[i];
            if let Some(product) = self.products.get(&record.product_id) {
                let mut product = product.clone();
                adjust(&mut product, record.quantity)?;
                staged.push(product);
            }
        }
        for product in staged {
            self.products.insert(product.product_id.clone(), product);
        }

        Ok(held
            .into_iter()
            .map(|i| {
                let record = &mut self.reservations[i];
                record.status = to;
                record.clone()
            })
            .collect())
    }
}

/// In-memory ledger for tests and single-process deployments.
///
/// All mutations run under one lock, which is the single writer that
/// serializes concurrent reservations.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLedgerStore {
    state: Arc<Mutex<LedgerState>>,
}

impl InMemoryLedgerStore {
    /// Creates an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a ledger seeded with products.
    pub async fn with_products(products: impl IntoIterator<Item = ProductStock>) -> Result<Self> {
        let store = Self::new();
        for product in products {
            store.upsert_product(product).await?;
        }
        Ok(store)
    }

    /// Returns the number of reservation records across all sagas.
    pub async fn reservation_count(&self) -> usize {
        self.state.lock().await.reservations.len()
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn upsert_product(&self, product: ProductStock) -> Result<()> {
        product.validate()?;
        let mut state = self.state.lock().await;
        let held = state.held(&product.product_id);
        let product = product.net_of_holds(held)?;
        state.products.insert(product.product_id.clone(), product);
        Ok(())
    }

    async fn get_product(&self, product_id: &ProductId) -> Result<Option<ProductStock>> {
        Ok(self.state.lock().await.products.get(product_id).cloned())
    }

    async fn list_products(&self) -> Result<Vec<ProductStock>> {
        Ok(self.state.lock().await.products.values().cloned().collect())
    }

    async fn stock_levels(&self, product_ids: &[ProductId]) -> Result<Vec<ProductStock>> {
        let state = self.state.lock().await;
        Ok(product_ids
            .iter()
            .filter_map(|id| state.products.get(id).cloned())
            .collect())
    }

    async fn reserve(
        &self,
        saga_id: &SagaId,
        order_id: &OrderId,
        lines: &[ReservationLine],
    ) -> Result<ReserveOutcome> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        if let Some(prior) = state.replay(saga_id) {
            return Ok(prior);
        }

        let lines = match merge_lines(lines) {
            Ok(lines) => lines,
            Err(failure) => return Ok(ReserveOutcome::Rejected(failure)),
        };
        if let Some(failure) = first_shortfall(&lines, |id| state.products.get(id)) {
            return Ok(ReserveOutcome::Rejected(failure));
        }

        let now = Utc::now();
        let mut reserved = Vec::with_capacity(lines.len());
        for line in &lines {
            let Some(product) = state.products.get_mut(&line.product_id) else {
                continue;
            };
            product.available_quantity -= line.quantity;
            let record = ReservationRecord::hold(saga_id, order_id, product, line.quantity, now);
            reserved.push(record.line_item());
            state.reservations.push(record);
        }

        Ok(ReserveOutcome::Reserved {
            lines: reserved,
            replayed: false,
        })
    }

    async fn release(&self, saga_id: &SagaId) -> Result<Vec<ReservationRecord>> {
        let mut state = self.state.lock().await;
        state.settle(saga_id, ReservationStatus::Released, ProductStock::release_units)
    }

    async fn confirm(&self, saga_id: &SagaId) -> Result<Vec<ReservationRecord>> {
        let mut state = self.state.lock().await;
        state.settle(saga_id, ReservationStatus::Confirmed, ProductStock::confirm_units)
    }

    async fn reservations_for(&self, saga_id: &SagaId) -> Result<Vec<ReservationRecord>> {
        Ok(self
            .state
            .lock()
            .await
            .reservations
            .iter()
            .filter(|r| &r.saga_id == saga_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LedgerError;
    use crate::model::ReservationFailure;
    use common::{Discount, Money};

    async fn store() -> InMemoryLedgerStore {
        InMemoryLedgerStore::with_products([
            ProductStock::new(
                "apple",
                "Apple",
                Money::from_cents(200),
                Discount::new(0.5).unwrap(),
                10,
            ),
            ProductStock::new("pear", "Pear", Money::from_cents(300), Discount::none(), 2),
        ])
        .await
        .unwrap()
    }

    fn saga(id: &str) -> SagaId {
        SagaId::new(id)
    }

    async fn available(store: &InMemoryLedgerStore, id: &str) -> u32 {
        store
            .get_product(&ProductId::new(id))
            .await
            .unwrap()
            .unwrap()
            .available_quantity
    }

    #[tokio::test]
    async fn test_reserve_decrements_available_only() {
        let store = store().await;
        let outcome = store
            .reserve(
                &saga("s1"),
                &OrderId::new("o1"),
                &[ReservationLine::new("apple", 3)],
            )
            .await
            .unwrap();

        let ReserveOutcome::Reserved { lines, replayed } = outcome else {
            panic!("expected reservation");
        };
        assert!(!replayed);
        assert_eq!(lines[0].name, "Apple");
        assert_eq!(lines[0].quantity, 3);

        let apple = store.get_product(&ProductId::new("apple")).await.unwrap().unwrap();
        assert_eq!(apple.available_quantity, 7);
        assert_eq!(apple.total_quantity, 10);
    }

    #[tokio::test]
    async fn test_reserve_is_all_or_nothing() {
        let store = store().await;
        let outcome = store
            .reserve(
                &saga("s1"),
                &OrderId::new("o1"),
                &[
                    ReservationLine::new("apple", 3),
                    ReservationLine::new("pear", 5),
                ],
            )
            .await
            .unwrap();

        assert_eq!(
            outcome,
            ReserveOutcome::Rejected(ReservationFailure::InsufficientQuantity {
                product_id: ProductId::new("pear"),
                requested: 5,
                available: 2,
            })
        );
        assert_eq!(available(&store, "apple").await, 10);
        assert_eq!(store.reservation_count().await, 0);
    }

    #[tokio::test]
    async fn test_duplicate_lines_are_checked_as_one_demand() {
        let store = store().await;
        let outcome = store
            .reserve(
                &saga("s1"),
                &OrderId::new("o1"),
                &[
                    ReservationLine::new("pear", 1),
                    ReservationLine::new("pear", 2),
                ],
            )
            .await
            .unwrap();
        assert!(!outcome.is_reserved());
        assert_eq!(available(&store, "pear").await, 2);
    }

    #[tokio::test]
    async fn test_replayed_reserve_does_not_decrement_twice() {
        let store = store().await;
        let lines = [ReservationLine::new("apple", 4)];
        store
            .reserve(&saga("s1"), &OrderId::new("o1"), &lines)
            .await
            .unwrap();
        let again = store
            .reserve(&saga("s1"), &OrderId::new("o1"), &lines)
            .await
            .unwrap();

        assert!(matches!(
            again,
            ReserveOutcome::Reserved { replayed: true, ref lines } if lines[0].quantity == 4
        ));
        assert_eq!(available(&store, "apple").await, 6);
        assert_eq!(store.reservation_count().await, 1);
    }

    #[tokio::test]
    async fn test_release_restores_and_is_idempotent() {
        let store = store().await;
        store
            .reserve(
                &saga("s1"),
                &OrderId::new("o1"),
                &[ReservationLine::new("apple", 6)],
            )
            .await
            .unwrap();
        assert_eq!(available(&store, "apple").await, 4);

        assert_eq!(store.release(&saga("s1")).await.unwrap().len(), 1);
        assert_eq!(available(&store, "apple").await, 10);

        assert!(store.release(&saga("s1")).await.unwrap().is_empty());
        assert_eq!(available(&store, "apple").await, 10);

        let records = store.reservations_for(&saga("s1")).await.unwrap();
        assert_eq!(records[0].status, ReservationStatus::Released);
    }

    #[tokio::test]
    async fn test_confirm_decrements_total_once() {
        let store = store().await;
        store
            .reserve(
                &saga("s1"),
                &OrderId::new("o1"),
                &[ReservationLine::new("apple", 3)],
            )
            .await
            .unwrap();

        assert_eq!(store.confirm(&saga("s1")).await.unwrap().len(), 1);
        assert!(store.confirm(&saga("s1")).await.unwrap().is_empty());

        let apple = store.get_product(&ProductId::new("apple")).await.unwrap().unwrap();
        assert_eq!(apple.total_quantity, 7);
        assert_eq!(apple.available_quantity, 7);
    }

    #[tokio::test]
    async fn test_released_record_is_never_confirmed() {
        let store = store().await;
        store
            .reserve(
                &saga("s1"),
                &OrderId::new("o1"),
                &[ReservationLine::new("apple", 3)],
            )
            .await
            .unwrap();
        store.release(&saga("s1")).await.unwrap();

        assert!(store.confirm(&saga("s1")).await.unwrap().is_empty());
        let apple = store.get_product(&ProductId::new("apple")).await.unwrap().unwrap();
        assert_eq!(apple.total_quantity, 10);
    }

    #[tokio::test]
    async fn test_unknown_product_rejected() {
        let store = store().await;
        let outcome = store
            .reserve(
                &saga("s1"),
                &OrderId::new("o1"),
                &[ReservationLine::new("kiwi", 1)],
            )
            .await
            .unwrap();
        assert_eq!(
            outcome,
            ReserveOutcome::Rejected(ReservationFailure::ProductNotFound {
                product_id: ProductId::new("kiwi")
            })
        );
    }

    #[tokio::test]
    async fn test_reseeding_keeps_held_stock_out_of_available() {
        let store = store().await;
        store
            .reserve(
                &saga("s1"),
                &OrderId::new("o1"),
                &[ReservationLine::new("apple", 3)],
            )
            .await
            .unwrap();

        store
            .upsert_product(ProductStock::new(
                "apple",
                "Apple",
                Money::from_cents(200),
                Discount::new(0.5).unwrap(),
                10,
            ))
            .await
            .unwrap();
        assert_eq!(available(&store, "apple").await, 7);

        let outcome = store
            .reserve(
                &saga("s2"),
                &OrderId::new("o2"),
                &[ReservationLine::new("apple", 10)],
            )
            .await
            .unwrap();
        assert!(!outcome.is_reserved());

        store.release(&saga("s1")).await.unwrap();
        let apple = store.get_product(&ProductId::new("apple")).await.unwrap().unwrap();
        assert_eq!(apple.available_quantity, 10);
        assert_eq!(apple.total_quantity, 10);
    }

    #[tokio::test]
    async fn test_reseeding_below_held_is_refused() {
        let store = store().await;
        store
            .reserve(
                &saga("s1"),
                &OrderId::new("o1"),
                &[ReservationLine::new("apple", 3)],
            )
            .await
            .unwrap();

        let shrunk = ProductStock::new("apple", "Apple", Money::from_cents(200), Discount::none(), 2);
        assert!(matches!(
            store.upsert_product(shrunk).await,
            Err(LedgerError::InvalidStock { .. })
        ));

        store
            .upsert_product(ProductStock::new(
                "apple",
                "Apple",
                Money::from_cents(200),
                Discount::none(),
                3,
            ))
            .await
            .unwrap();
        assert_eq!(available(&store, "apple").await, 0);

        assert_eq!(store.confirm(&saga("s1")).await.unwrap().len(), 1);
        let apple = store.get_product(&ProductId::new("apple")).await.unwrap().unwrap();
        assert_eq!(apple.total_quantity, 0);
        assert_eq!(apple.available_quantity, 0);
    }

    #[tokio::test]
    async fn test_replay_reports_prices_from_reservation_time() {
        let store = store().await;
        let lines = [ReservationLine::new("apple", 2)];
        store
            .reserve(&saga("s1"), &OrderId::new("o1"), &lines)
            .await
            .unwrap();

        store
            .upsert_product(ProductStock::new(
                "apple",
                "Green Apple",
                Money::from_cents(900),
                Discount::none(),
                10,
            ))
            .await
            .unwrap();

        let ReserveOutcome::Reserved { lines, replayed } = store
            .reserve(&saga("s1"), &OrderId::new("o1"), &lines)
            .await
            .unwrap()
        else {
            panic!("expected replayed reservation");
        };
        assert!(replayed);
        assert_eq!(lines[0].name, "Apple");
        assert_eq!(lines[0].price, Money::from_cents(200));
        assert_eq!(lines[0].discount, Discount::new(0.5).unwrap());
    }

    #[tokio::test]
    async fn test_upsert_rejects_invalid_stock() {
        let store = InMemoryLedgerStore::new();
        let mut product =
            ProductStock::new("x", "X", Money::from_cents(1), Discount::none(), 1);
        product.available_quantity = 2;
        assert!(store.upsert_product(product).await.is_err());
        assert!(store.list_products().await.unwrap().is_empty());
    }
}
