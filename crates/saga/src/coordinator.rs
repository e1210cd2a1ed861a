//! Saga coordinator: opens sagas on order submission and drives them to a
//! settled state by reacting to outcome events.

use async_trait::async_trait;
use common::{Money, OrderId, OrderStatus, SagaId, SagaStatus, UserId, order_total};
use event_channel::{
    ChannelError, EventHandler, EventPublisher, OrderDto, PublishExt, ReservationLine,
    ReserveInventory, SagaEvent, SagaMessage,
};
use inventory::{AvailabilityChecker, AvailableProduct, UnavailableProduct};
use serde::{Deserialize, Serialize};

use crate::Result;
use crate::error::SagaError;
use crate::record::SagaRecord;
use crate::state::{Effect, Step, is_outcome, next_step};
use crate::store::SagaStore;

/// Response to an order submission.
///
/// `order_id` and `saga_id` are present only when a saga was opened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderSubmission {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<OrderId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub saga_id: Option<SagaId>,
    pub order_status: OrderStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_total: Option<Money>,
    pub available: Vec<AvailableProduct>,
    pub unavailable: Vec<UnavailableProduct>,
}

impl OrderSubmission {
    /// Returns true when a saga was opened for the order.
    pub fn accepted(&self) -> bool {
        self.saga_id.is_some()
    }
}

/// Orchestrates order sagas.
///
/// The coordinator never waits for an outcome: [`submit_order`] returns once
/// the reserve command is on the channel, and progress happens in
/// [`EventHandler::handle`] as outcomes arrive.
///
/// [`submit_order`]: SagaCoordinator::submit_order
pub struct SagaCoordinator<S, A, P>
where
    S: SagaStore,
    A: AvailabilityChecker,
    P: EventPublisher,
{
    store: S,
    availability: A,
    publisher: P,
}

impl<S, A, P> SagaCoordinator<S, A, P>
where
    S: SagaStore,
    A: AvailabilityChecker,
    P: EventPublisher,
{
    /// Creates a new saga coordinator.
    pub fn new(store: S, availability: A, publisher: P) -> Self {
        Self {
            store,
            availability,
            publisher,
        }
    }

    /// Returns the saga store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Checks availability and, when everything can be had, opens a saga and
    /// asks the ledger to reserve.
    ///
    /// An unavailable line is a normal outcome: the submission comes back
    /// FAILED with the partitions and no saga is created.
    #[tracing::instrument(skip_all, fields(user_id = %user_id, lines = lines.len()))]
    pub async fn submit_order(
        &self,
        user_id: UserId,
        lines: Vec<ReservationLine>,
    ) -> Result<OrderSubmission> {
        if lines.is_empty() {
            return Err(SagaError::InvalidOrder("order has no items".to_string()));
        }
        if let Some(line) = lines.iter().find(|l| l.quantity == 0) {
            return Err(SagaError::InvalidOrder(format!(
                "quantity for product {} must be positive",
                line.product_id
            )));
        }

        let report = self.availability.check_availability(&lines).await?;
        if !report.all_available() {
            tracing::info!(
                unavailable = report.unavailable.len(),
                "order refused, products unavailable"
            );
            return Ok(OrderSubmission {
                order_id: None,
                saga_id: None,
                order_status: OrderStatus::Failed,
                estimated_total: None,
                available: report.available,
                unavailable: report.unavailable,
            });
        }

        let estimated_total = order_total(report.available.iter().map(|p| (p.price, p.discount)));
        let record = SagaRecord::start(user_id);
        let saga_id = record.saga_id.clone();
        let order_id = record.order_id.clone();
        self.store.insert(record).await?;
        metrics::counter!("saga_started_total").increment(1);
        tracing::info!(saga_id = %saga_id, order_id = %order_id, "saga started");

        let command = SagaMessage::ReserveInventory(ReserveInventory {
            saga_id: saga_id.clone(),
            order_id: order_id.clone(),
            products: lines,
        });
        let event = SagaEvent::new(saga_id.clone(), &command)?.with_status(SagaStatus::Started);
        self.publisher.publish_or_log(event).await;

        Ok(OrderSubmission {
            order_id: Some(order_id),
            saga_id: Some(saga_id),
            order_status: OrderStatus::Pending,
            estimated_total: Some(estimated_total),
            available: report.available,
            unavailable: report.unavailable,
        })
    }

    /// Returns the caller-facing status of a user's order, if the pair exists.
    ///
    /// A persisted status this build cannot parse reads as PENDING.
    pub async fn order_status(
        &self,
        user_id: &UserId,
        order_id: &OrderId,
    ) -> Result<Option<OrderStatus>> {
        let status = self.store.status_name(user_id, order_id).await?;
        Ok(status.map(|name| OrderStatus::from_status_name(&name)))
    }

    /// Loads a saga record.
    pub async fn get_saga(&self, saga_id: &SagaId) -> Result<Option<SagaRecord>> {
        self.store.get(saga_id).await
    }

    /// Applies one inbound event to its saga.
    #[tracing::instrument(
        skip_all,
        fields(saga_id = %event.saga_id, event_type = %event.event_type)
    )]
    pub async fn on_event(&self, event: &SagaEvent) -> Result<()> {
        let message = event.decode()?;
        if let SagaMessage::Unknown(tag) = &message {
            tracing::warn!(event_type = %tag, "ignoring unknown event type");
            metrics::counter!("saga_events_ignored_total", "reason" => "unknown_type")
                .increment(1);
            return Ok(());
        }
        if !is_outcome(&message) {
            return Ok(());
        }

        let Some(record) = self.store.get(&event.saga_id).await? else {
            tracing::warn!("no saga for event, dropping");
            metrics::counter!("saga_events_ignored_total", "reason" => "unknown_saga")
                .increment(1);
            return Ok(());
        };

        let Some(step) = next_step(record.status, &message) else {
            tracing::info!(status = %record.status, "event does not apply in current state");
            metrics::counter!("saga_events_ignored_total", "reason" => "no_transition")
                .increment(1);
            return Ok(());
        };

        let Some(updated) = self
            .store
            .transition(&record.saga_id, step.from, step.to)
            .await?
        else {
            tracing::info!(from = %step.from, "saga moved concurrently, treating as duplicate");
            metrics::counter!("saga_events_ignored_total", "reason" => "duplicate").increment(1);
            return Ok(());
        };

        record_transition(&step);
        tracing::info!(from = %step.from, to = %step.to, "saga transitioned");

        self.apply_effect(&updated, step.effect, event.error_message.as_deref())
            .await
    }

    async fn apply_effect(
        &self,
        record: &SagaRecord,
        effect: Effect,
        error_message: Option<&str>,
    ) -> Result<()> {
        let event = match effect {
            Effect::None => return Ok(()),
            Effect::CreateOrder(lines) => {
                let order =
                    OrderDto::priced(record.order_id.clone(), record.user_id.clone(), lines);
                SagaEvent::new(record.saga_id.clone(), &SagaMessage::CreateOrder(order))?
                    .with_status(SagaStatus::InventoryReserved)
            }
            Effect::ReleaseInventory => {
                let mut event = SagaEvent::new(
                    record.saga_id.clone(),
                    &SagaMessage::ReleaseInventory(record.order_id.clone()),
                )?
                .with_status(SagaStatus::Compensating);
                if let Some(message) = error_message {
                    event = event.with_error(message);
                }
                event
            }
        };

        // The transition is already committed; a lost command leaves the
        // saga waiting in its new state.
        self.publisher.publish_or_log(event).await;
        Ok(())
    }
}

fn record_transition(step: &Step) {
    match step.to {
        SagaStatus::Completed => metrics::counter!("saga_completed_total").increment(1),
        SagaStatus::Failed => metrics::counter!("saga_failed_total").increment(1),
        SagaStatus::Compensated => metrics::counter!("saga_compensated_total").increment(1),
        _ => {}
    }
}

#[async_trait]
impl<S, A, P> EventHandler for SagaCoordinator<S, A, P>
where
    S: SagaStore,
    A: AvailabilityChecker,
    P: EventPublisher,
{
    fn name(&self) -> &'static str {
        "ordering"
    }

    async fn handle(&self, event: &SagaEvent) -> event_channel::Result<()> {
        self.on_event(event)
            .await
            .map_err(|e| ChannelError::handler(self.name(), e))
    }
}
