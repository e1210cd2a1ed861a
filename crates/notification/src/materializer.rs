//! The notification service: turns `order.create` commands into persisted
//! orders and answers order read queries.

use async_trait::async_trait;
use common::{OrderId, SagaId, SagaStatus, UserId};
use event_channel::{EventHandler, EventPublisher, OrderDto, PublishExt, SagaEvent, SagaMessage};

use crate::Result;
use crate::order::MaterializedOrder;
use crate::repository::OrderRepository;

/// Order materializer bound to a repository and a publisher for its outcomes.
pub struct OrderMaterializer<R: OrderRepository, P: EventPublisher> {
    repository: R,
    publisher: P,
}

impl<R: OrderRepository, P: EventPublisher> OrderMaterializer<R, P> {
    /// Creates a new materializer.
    pub fn new(repository: R, publisher: P) -> Self {
        Self {
            repository,
            publisher,
        }
    }

    /// Returns the underlying repository.
    pub fn repository(&self) -> &R {
        &self.repository
    }

    /// Persists an order and publishes the outcome for the saga.
    ///
    /// Every failure is reported as `order.creation.failed` with the error
    /// text, so the saga compensates. A re-delivered command for a stored
    /// order re-emits `order.created` from the stored copy.
    #[tracing::instrument(skip_all, fields(saga_id = %saga_id, order_id = %dto.order_id))]
    pub async fn create_order(&self, saga_id: &SagaId, dto: OrderDto) -> Result<MaterializedOrder> {
        let outcome = self.persist(dto).await;

        let event = match &outcome {
            Ok(order) => SagaEvent::new(
                saga_id.clone(),
                &SagaMessage::OrderCreated(order.to_dto()),
            )?
            .with_status(SagaStatus::Completed),
            Err(e) => {
                tracing::error!(error = %e, "order could not be created");
                SagaEvent::new(saga_id.clone(), &SagaMessage::OrderCreationFailed)?
                    .with_status(SagaStatus::Failed)
                    .with_error(e.to_string())
            }
        };

        self.publisher.publish_or_log(event).await;
        outcome
    }

    async fn persist(&self, dto: OrderDto) -> Result<MaterializedOrder> {
        if let Some(existing) = self.repository.get(&dto.order_id).await? {
            tracing::info!("order already stored, re-emitting outcome");
            return Ok(existing);
        }

        let order = MaterializedOrder::from_dto(dto)?;
        if self.repository.save(&order).await? {
            metrics::counter!("orders_materialized_total").increment(1);
            tracing::info!(items = order.items.len(), total = %order.total_price, "order created");
            Ok(order)
        } else {
            // Lost a race with a concurrent delivery; report what was stored.
            Ok(self.repository.get(&order.order_id).await?.unwrap_or(order))
        }
    }

    /// Loads an order by id.
    pub async fn get_order(&self, order_id: &OrderId) -> Result<Option<MaterializedOrder>> {
        self.repository.get(order_id).await
    }

    /// Lists a user's orders.
    pub async fn orders_for_user(&self, user_id: &UserId) -> Result<Vec<MaterializedOrder>> {
        self.repository.list_for_user(user_id).await
    }

    /// Lists every order.
    pub async fn all_orders(&self) -> Result<Vec<MaterializedOrder>> {
        self.repository.list_all().await
    }
}

#[async_trait]
impl<R: OrderRepository, P: EventPublisher> EventHandler for OrderMaterializer<R, P> {
    fn name(&self) -> &'static str {
        "notification"
    }

    async fn handle(&self, event: &SagaEvent) -> event_channel::Result<()> {
        match event.decode()? {
            SagaMessage::CreateOrder(dto) => {
                // Failures were already published as outcomes.
                let _ = self.create_order(&event.saga_id, dto).await;
                Ok(())
            }
            SagaMessage::Unknown(tag) => {
                tracing::debug!(event_type = %tag, "ignoring unknown event type");
                Ok(())
            }
            _ => Ok(()),
        }
    }
}
