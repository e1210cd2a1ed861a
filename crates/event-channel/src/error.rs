use thiserror::Error;

/// Errors that can occur when encoding, decoding or moving saga events.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// A known event type carried a payload of the wrong shape.
    #[error("Malformed payload for event type '{event_type}': {source}")]
    MalformedPayload {
        event_type: String,
        #[source]
        source: serde_json::Error,
    },

    /// A payload could not be serialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The transport refused the event.
    #[error("Publish failed: {0}")]
    PublishFailed(String),

    /// The channel has no live consumers left for a group.
    #[error("Channel closed for consumer group '{0}'")]
    Closed(&'static str),

    /// A subscribed handler failed while processing an event.
    #[error("Handler '{handler}' failed: {message}")]
    Handler {
        handler: &'static str,
        message: String,
    },
}

impl ChannelError {
    /// Wraps a handler-specific error.
    pub fn handler(handler: &'static str, err: impl std::fmt::Display) -> Self {
        ChannelError::Handler {
            handler,
            message: err.to_string(),
        }
    }
}

/// Result type for channel operations.
pub type Result<T> = std::result::Result<T, ChannelError>;
