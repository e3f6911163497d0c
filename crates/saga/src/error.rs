//! Saga error types.

use domain::{DomainError, ValidationError};
use event_bus::BusError;
use store::StoreError;
use thiserror::Error;

/// Errors returned by service operations and event handlers.
#[derive(Debug, Error)]
pub enum SagaError {
    /// A referenced entity does not exist.
    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    /// A domain rule rejected the operation.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// The store failed.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// The bus failed.
    #[error("Bus error: {0}")]
    Bus(#[from] BusError),

    /// Another writer changed the entity between our read and our write.
    #[error("{entity} {key} was modified concurrently")]
    Concurrent { entity: &'static str, key: String },

    /// Putting reserved stock back failed; the product is now under-counted.
    #[error("Compensation '{step}' failed: {reason}")]
    CompensationFailed { step: &'static str, reason: String },
}

impl SagaError {
    pub(crate) fn not_found(entity: &'static str, key: impl ToString) -> Self {
        SagaError::NotFound {
            entity,
            key: key.to_string(),
        }
    }

    /// Returns true if running the same operation again may succeed.
    ///
    /// Event handlers return these to the bus so the message is requeued;
    /// everything else is logged and acknowledged.
    pub fn is_retryable(&self) -> bool {
        match self {
            SagaError::Store(e) => e.is_transient(),
            SagaError::Bus(_) | SagaError::Concurrent { .. } => true,
            _ => false,
        }
    }

    /// Returns true for bad input.
    pub fn is_validation(&self) -> bool {
        matches!(self, SagaError::Domain(DomainError::Validation(_)))
    }

    /// Returns true for requests that contradict the current state.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            SagaError::Domain(DomainError::InvalidTransition { .. })
                | SagaError::Domain(DomainError::InsufficientStock { .. })
                | SagaError::Store(StoreError::Conflict(_))
                | SagaError::Concurrent { .. }
        )
    }

    /// Returns true when the referenced entity does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            SagaError::NotFound { .. } | SagaError::Store(StoreError::NotFound { .. })
        )
    }
}

impl From<ValidationError> for SagaError {
    fn from(e: ValidationError) -> Self {
        SagaError::Domain(DomainError::Validation(e))
    }
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;
