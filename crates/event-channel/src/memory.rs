use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use common::SagaId;
use tokio::sync::{Notify, RwLock, mpsc};
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::channel::{EventHandler, EventPublisher};
use crate::{ChannelError, Result, SagaEvent};

/// Default number of partitions per consumer group.
pub const DEFAULT_PARTITIONS: usize = 8;

/// In-process, keyed publish/subscribe channel.
///
/// Every subscribed handler forms its own consumer group and receives every
/// event. Inside a group, events are routed to one of `partitions` queues by
/// hashing the saga id, and each queue is drained by a single task. Events of
/// one saga are therefore handled sequentially and in publish order, while
/// different sagas proceed concurrently.
///
/// A channel built with [`with_log`](Self::with_log) also appends everything
/// published to a log that tests can inspect. Without it nothing is retained
/// once delivered.
#[derive(Clone)]
pub struct InMemoryEventChannel {
    partitions: usize,
    log: Option<Arc<RwLock<Vec<SagaEvent>>>>,
    groups: Arc<RwLock<Vec<ConsumerGroup>>>,
    tracker: Arc<InFlight>,
    fail_on_publish: Arc<AtomicBool>,
}

struct ConsumerGroup {
    name: &'static str,
    partitions: Vec<mpsc::UnboundedSender<Delivery>>,
    closed: Arc<AtomicBool>,
}

impl ConsumerGroup {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst) || self.partitions.iter().all(|tx| tx.is_closed())
    }
}

#[derive(Default)]
struct InFlight {
    count: AtomicUsize,
    idle: Notify,
}

impl InFlight {
    fn begin(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }

    fn finish(&self) {
        if self.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }
}

/// A queued event. Counts as in flight until dropped, whether it was
/// handled, discarded by a stopped consumer or refused by a closed queue.
struct Delivery {
    event: SagaEvent,
    tracker: Arc<InFlight>,
}

impl Delivery {
    fn new(event: SagaEvent, tracker: &Arc<InFlight>) -> Self {
        tracker.begin();
        Self {
            event,
            tracker: Arc::clone(tracker),
        }
    }
}

impl Drop for Delivery {
    fn drop(&mut self) {
        self.tracker.finish();
    }
}

/// Handle to a running consumer group. Dropping it stops the consumers.
pub struct Subscription {
    name: &'static str,
    tasks: Vec<JoinHandle<()>>,
    closed: Arc<AtomicBool>,
}

impl Subscription {
    /// Returns the consumer group name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Stops all partition consumers of this group.
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
        for task in &self.tasks {
            task.abort();
        }
    }
}

impl Default for InMemoryEventChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryEventChannel {
    /// Creates a channel with [`DEFAULT_PARTITIONS`] partitions per group.
    pub fn new() -> Self {
        Self::with_partitions(DEFAULT_PARTITIONS)
    }

    /// Creates a channel with the given number of partitions per group.
    ///
    /// Zero is treated as one.
    pub fn with_partitions(partitions: usize) -> Self {
        Self {
            partitions: partitions.max(1),
            log: None,
            groups: Arc::new(RwLock::new(Vec::new())),
            tracker: Arc::new(InFlight::default()),
            fail_on_publish: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Keeps a copy of every published event, for inspection in tests.
    pub fn with_log(mut self) -> Self {
        self.log = Some(Arc::new(RwLock::new(Vec::new())));
        self
    }

    /// Returns true when published events are being logged.
    pub fn is_logging(&self) -> bool {
        self.log.is_some()
    }

    /// Returns the number of partitions per consumer group.
    pub fn partitions(&self) -> usize {
        self.partitions
    }

    /// Returns the partition a saga id is routed to.
    pub fn partition_for(&self, saga_id: &SagaId) -> usize {
        let mut hasher = DefaultHasher::new();
        saga_id.hash(&mut hasher);
        (hasher.finish() % self.partitions as u64) as usize
    }

    /// Registers a handler as a new consumer group and starts its consumers.
    ///
    /// Only events published after this call are delivered.
    pub async fn subscribe(&self, handler: Arc<dyn EventHandler>) -> Subscription {
        let name = handler.name();
        let mut senders = Vec::with_capacity(self.partitions);
        let mut tasks = Vec::with_capacity(self.partitions);
        let closed = Arc::new(AtomicBool::new(false));

        for partition in 0..self.partitions {
            let (tx, mut rx) = mpsc::unbounded_channel::<Delivery>();
            let handler = Arc::clone(&handler);

            tasks.push(tokio::spawn(async move {
                while let Some(delivery) = rx.recv().await {
                    let event = &delivery.event;
                    let span = tracing::debug_span!(
                        "consume",
                        group = name,
                        partition,
                        saga_id = %event.saga_id,
                        event_type = %event.event_type,
                    );
                    if let Err(e) = handler.handle(event).instrument(span).await {
                        tracing::warn!(
                            group = name,
                            saga_id = %event.saga_id,
                            event_type = %event.event_type,
                            error = %e,
                            "handler failed, event dropped"
                        );
                    }
                }
            }));
            senders.push(tx);
        }

        self.groups.write().await.push(ConsumerGroup {
            name,
            partitions: senders,
            closed: Arc::clone(&closed),
        });
        tracing::info!(group = name, partitions = self.partitions, "consumer group subscribed");

        Subscription {
            name,
            tasks,
            closed,
        }
    }

    /// Waits until every delivered event has been handled, including events
    /// published by handlers along the way.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.tracker.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.tracker.count.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Returns a copy of everything published so far. Empty without a log.
    pub async fn published(&self) -> Vec<SagaEvent> {
        match &self.log {
            Some(log) => log.read().await.clone(),
            None => Vec::new(),
        }
    }

    /// Returns the event types published so far, in order.
    pub async fn event_types(&self) -> Vec<String> {
        self.published()
            .await
            .into_iter()
            .map(|e| e.event_type)
            .collect()
    }

    /// Returns the events published for one saga, in order.
    pub async fn published_for(&self, saga_id: &SagaId) -> Vec<SagaEvent> {
        self.published()
            .await
            .into_iter()
            .filter(|e| &e.saga_id == saga_id)
            .collect()
    }

    /// Makes subsequent publishes fail (for testing).
    pub fn set_fail_on_publish(&self, fail: bool) {
        self.fail_on_publish.store(fail, Ordering::SeqCst);
    }

    /// Clears the publish log.
    pub async fn clear(&self) {
        if let Some(log) = &self.log {
            log.write().await.clear();
        }
    }
}

#[async_trait]
impl EventPublisher for InMemoryEventChannel {
    async fn publish(&self, event: SagaEvent) -> Result<()> {
        if self.fail_on_publish.load(Ordering::SeqCst) {
            return Err(ChannelError::PublishFailed(
                "channel configured to fail".to_string(),
            ));
        }

        let partition = self.partition_for(&event.saga_id);

        // Holding the log lock across fan-out keeps log order equal to delivery order.
        let mut log = match &self.log {
            Some(log) => Some(log.write().await),
            None => None,
        };
        let mut groups = self.groups.write().await;
        groups.retain(|group| {
            let closed = group.is_closed();
            if closed {
                tracing::debug!(group = group.name, "dropping closed consumer group");
            }
            !closed
        });

        for group in groups.iter() {
            let delivery = Delivery::new(event.clone(), &self.tracker);
            if group.partitions[partition].send(delivery).is_err() {
                tracing::warn!(
                    error = %ChannelError::Closed(group.name),
                    saga_id = %event.saga_id,
                    "partition consumer gone"
                );
            }
        }

        tracing::debug!(
            saga_id = %event.saga_id,
            event_type = %event.event_type,
            partition,
            groups = groups.len(),
            "event published"
        );
        if let Some(log) = log.as_mut() {
            log.push(event);
        }
        Ok(())
    }
}
