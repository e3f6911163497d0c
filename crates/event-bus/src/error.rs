use std::time::Duration;

use thiserror::Error;

/// Errors that can occur when talking to the event bus.
#[derive(Debug, Error)]
pub enum BusError {
    /// The broker connection or a channel could not be established.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// The broker did not accept a published message.
    #[error("Publish failed: {0}")]
    Publish(String),

    /// The publish did not complete within the bounded send timeout.
    #[error("Publish of '{event_type}' timed out after {timeout:?}")]
    PublishTimeout {
        event_type: String,
        timeout: Duration,
    },

    /// Declaring, binding or consuming a queue failed.
    #[error("Subscribe failed: {0}")]
    Subscribe(String),

    /// An envelope or payload could not be (de)serialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for event bus operations.
pub type Result<T> = std::result::Result<T, BusError>;
