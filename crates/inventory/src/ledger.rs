//! The inventory service: reacts to reservation, release and confirmation
//! traffic on the event channel and answers availability checks.

use async_trait::async_trait;
use common::{OrderId, SagaId, SagaStatus};
use event_channel::{
    ChannelError, EventHandler, EventPublisher, PublishExt, ReservationLine, ReserveInventory,
    SagaEvent, SagaMessage,
};

use crate::Result;
use crate::availability::{AvailabilityChecker, AvailabilityReport};
use crate::model::{ReservationRecord, ReserveOutcome, merge_lines};
use crate::store::LedgerStore;

/// Reservation ledger bound to a store and a publisher for its outcomes.
pub struct ReservationLedger<L: LedgerStore, P: EventPublisher> {
    store: L,
    publisher: P,
}

impl<L: LedgerStore, P: EventPublisher> ReservationLedger<L, P> {
    /// Creates a new ledger.
    pub fn new(store: L, publisher: P) -> Self {
        Self { store, publisher }
    }

    /// Returns the underlying store.
    pub fn store(&self) -> &L {
        &self.store
    }

    /// Reserves stock for a saga and publishes the outcome.
    ///
    /// A storage failure is reported as a reservation failure: the store
    /// commits nothing on error, so there is nothing to compensate.
    #[tracing::instrument(skip_all, fields(saga_id = %saga_id, order_id = %order_id))]
    pub async fn reserve(
        &self,
        saga_id: &SagaId,
        order_id: &OrderId,
        lines: &[ReservationLine],
    ) -> Result<ReserveOutcome> {
        let outcome = match self.store.reserve(saga_id, order_id, lines).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(error = %e, "reservation could not be stored");
                metrics::counter!("inventory_reservation_failures_total", "reason" => "storage")
                    .increment(1);
                let event = SagaEvent::new(saga_id.clone(), &SagaMessage::InventoryReservationFailed)?
                    .with_status(SagaStatus::Failed)
                    .with_error(e.to_string());
                self.publisher.publish_or_log(event).await;
                return Err(e);
            }
        };

        let event = match &outcome {
            ReserveOutcome::Reserved { lines, replayed } => {
                if *replayed {
                    tracing::info!("duplicate reserve command, re-emitting prior outcome");
                } else {
                    metrics::counter!("inventory_reservations_total").increment(1);
                    tracing::info!(lines = lines.len(), "stock reserved");
                }
                SagaEvent::new(
                    saga_id.clone(),
                    &SagaMessage::InventoryReserved(lines.clone()),
                )?
                .with_status(SagaStatus::InventoryReserved)
            }
            ReserveOutcome::Rejected(failure) => {
                metrics::counter!("inventory_reservation_failures_total", "reason" => "rejected")
                    .increment(1);
                tracing::info!(reason = %failure, "reservation refused");
                SagaEvent::new(saga_id.clone(), &SagaMessage::InventoryReservationFailed)?
                    .with_status(SagaStatus::Failed)
                    .with_error(failure.to_string())
            }
        };

        self.publisher.publish_or_log(event).await;
        Ok(outcome)
    }

    /// Releases the saga's reservations and acknowledges with `inventory.released`.
    ///
    /// The acknowledgement is sent even when nothing was left to release, so
    /// a replayed command still lets the saga settle.
    #[tracing::instrument(skip_all, fields(saga_id = %saga_id))]
    pub async fn release(
        &self,
        saga_id: &SagaId,
        error_message: Option<&str>,
    ) -> Result<Vec<ReservationRecord>> {
        let released = self.store.release(saga_id).await?;
        metrics::counter!("inventory_releases_total").increment(released.len() as u64);
        tracing::info!(records = released.len(), reason = ?error_message, "reservations released");

        let mut event = SagaEvent::new(saga_id.clone(), &SagaMessage::InventoryReleased)?
            .with_status(SagaStatus::Compensated);
        if let Some(message) = error_message {
            event = event.with_error(message);
        }
        self.publisher.publish_or_log(event).await;
        Ok(released)
    }

    /// Makes the saga's reservations permanent.
    #[tracing::instrument(skip_all, fields(saga_id = %saga_id))]
    pub async fn confirm(&self, saga_id: &SagaId) -> Result<Vec<ReservationRecord>> {
        let confirmed = self.store.confirm(saga_id).await?;
        metrics::counter!("inventory_confirmations_total").increment(confirmed.len() as u64);
        tracing::info!(records = confirmed.len(), "reservations confirmed");
        Ok(confirmed)
    }

    async fn on_reserve(&self, event: &SagaEvent, command: ReserveInventory) -> Result<()> {
        if command.saga_id != event.saga_id {
            tracing::warn!(
                envelope = %event.saga_id,
                payload = %command.saga_id,
                "reserve command saga id mismatch, using envelope"
            );
        }
        // Refusals and storage failures were already published as outcomes.
        let _ = self
            .reserve(&event.saga_id, &command.order_id, &command.products)
            .await;
        Ok(())
    }
}

#[async_trait]
impl<L: LedgerStore, P: EventPublisher> EventHandler for ReservationLedger<L, P> {
    fn name(&self) -> &'static str {
        "inventory"
    }

    async fn handle(&self, event: &SagaEvent) -> event_channel::Result<()> {
        let result = match event.decode()? {
            SagaMessage::ReserveInventory(command) => self.on_reserve(event, command).await,
            SagaMessage::ReleaseInventory(order_id) => {
                tracing::debug!(order_id = %order_id, "release requested");
                self.release(&event.saga_id, event.error_message.as_deref())
                    .await
                    .map(|_| ())
            }
            SagaMessage::OrderCreated(_) => self.confirm(&event.saga_id).await.map(|_| ()),
            _ => Ok(()),
        };
        result.map_err(|e| ChannelError::handler(self.name(), e))
    }
}

#[async_trait]
impl<L: LedgerStore, P: EventPublisher> AvailabilityChecker for ReservationLedger<L, P> {
    #[tracing::instrument(skip_all, fields(lines = lines.len()))]
    async fn check_availability(&self, lines: &[ReservationLine]) -> Result<AvailabilityReport> {
        let lines = merge_lines(lines).unwrap_or_else(|_| lines.to_vec());
        let ids: Vec<_> = lines.iter().map(|l| l.product_id.clone()).collect();
        let stock = self.store.stock_levels(&ids).await?;
        Ok(AvailabilityReport::evaluate(&lines, &stock))
    }
}
