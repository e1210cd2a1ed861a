//! Publisher and consumer seams of the event channel.

use std::sync::Arc;

use async_trait::async_trait;

use crate::{Result, SagaEvent};

/// Anything that can put an event on the channel.
///
/// Implementations must be thread-safe; publishing does not wait for any
/// consumer to handle the event.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publishes one event.
    async fn publish(&self, event: SagaEvent) -> Result<()>;
}

#[async_trait]
impl<P: EventPublisher + ?Sized> EventPublisher for Arc<P> {
    async fn publish(&self, event: SagaEvent) -> Result<()> {
        (**self).publish(event).await
    }
}

/// A consumer group on the channel.
///
/// Each handler sees every published event. Events sharing a saga id reach
/// the handler one at a time, in publish order.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Returns the consumer group name, used in logs.
    fn name(&self) -> &'static str;

    /// Handles one event.
    ///
    /// An error is logged by the channel and the event is dropped; handlers
    /// that must react to failures emit outcome events instead.
    async fn handle(&self, event: &SagaEvent) -> Result<()>;
}

/// Convenience methods for publishers.
#[async_trait]
pub trait PublishExt: EventPublisher {
    /// Publishes and swallows the error after logging and counting it.
    ///
    /// Returns whether the event was handed to the channel. Callers use this
    /// after committing local state, which is kept regardless of the outcome.
    async fn publish_or_log(&self, event: SagaEvent) -> bool {
        let saga_id = event.saga_id.clone();
        let event_type = event.event_type.clone();
        match self.publish(event).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(
                    saga_id = %saga_id,
                    event_type = %event_type,
                    error = %e,
                    "failed to publish event"
                );
                metrics::counter!("saga_publish_failures_total", "event_type" => event_type)
                    .increment(1);
                false
            }
        }
    }
}

impl<P: EventPublisher + ?Sized> PublishExt for P {}
