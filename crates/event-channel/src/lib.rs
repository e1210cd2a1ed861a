//! Asynchronous publish/subscribe transport between the saga participants.
//!
//! Every message travels as a [`SagaEvent`] envelope tagged with a string
//! event type. Consumers decode the envelope into a [`SagaMessage`]; tags
//! this build does not know decode to [`SagaMessage::Unknown`] so newer
//! producers never break older consumers.

pub mod channel;
pub mod error;
pub mod event;
pub mod memory;
pub mod message;

pub use channel::{EventHandler, EventPublisher, PublishExt};
pub use error::{ChannelError, Result};
pub use event::{SagaEvent, event_types};
pub use memory::{InMemoryEventChannel, Subscription};
pub use message::{LineItem, OrderDto, ReservationLine, ReserveInventory, SagaMessage};
