use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HubError {
    /// The hub task has stopped.
    #[error("Hub is closed")]
    Closed,

    /// The hub task is behind; the message was not queued.
    #[error("Hub inbox is full")]
    Full,
}

pub type Result<T> = std::result::Result<T, HubError>;
