//! Domain error types.

use thiserror::Error;

/// Bad input, rejected before any state is touched.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("{field} must not be empty")]
    Empty { field: &'static str },

    #[error("{field} must be positive, got {value}")]
    NotPositive { field: &'static str, value: f64 },

    #[error("{field} must be non-negative, got {value}")]
    Negative { field: &'static str, value: f64 },

    #[error("{field} must be between {min} and {max}, got {value}")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Unknown {entity} status: {value}")]
    UnknownStatus { entity: &'static str, value: String },
}

/// Errors raised by domain rules.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DomainError {
    /// The input failed validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The requested status change is not allowed from the current status.
    #[error("Invalid {entity} transition: {from} -> {to}")]
    InvalidTransition {
        entity: &'static str,
        from: &'static str,
        to: &'static str,
    },

    /// A product does not have enough stock for a reservation.
    #[error("Insufficient stock for {product}: requested {requested}, available {available}")]
    InsufficientStock {
        product: String,
        requested: u32,
        available: u32,
    },
}

impl DomainError {
    /// Returns true for invalid transitions, which callers usually map to a
    /// conflict rather than bad input.
    pub fn is_invalid_transition(&self) -> bool {
        matches!(self, DomainError::InvalidTransition { .. })
    }
}

/// Result type for domain operations.
pub type Result<T> = std::result::Result<T, DomainError>;
