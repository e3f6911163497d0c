//! Order state machine.

use chrono::{DateTime, Utc};
use common::OrderId;
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, Result};
use crate::money::Money;
use crate::status::{Status, status_strings};
use crate::validation;

/// The status of an order.
///
/// State transitions:
/// ```text
/// Pending ──► Paid ──► Shipped
///    │         │
///    └─────────┴──► Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Created, waiting for payment and stock.
    #[default]
    Pending,

    /// Payment confirmed.
    Paid,

    /// Handed to delivery (terminal state).
    Shipped,

    /// Payment or stock failed (terminal state).
    Cancelled,
}

status_strings!(OrderStatus, "order", {
    Pending => "PENDING",
    Paid => "PAID",
    Shipped => "SHIPPED",
    Cancelled => "CANCELLED",
});

impl Status for OrderStatus {
    const ENTITY: &'static str = "order";

    fn can_transition_to(&self, next: Self) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Pending, Paid) | (Pending, Cancelled) | (Paid, Shipped) | (Paid, Cancelled)
        )
    }

    fn as_str(&self) -> &'static str {
        self.name()
    }

    fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Shipped | OrderStatus::Cancelled)
    }
}

/// Input for creating an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewOrder {
    pub customer_id: String,
    pub item_name: String,
    pub quantity: i64,
    pub total_price: f64,
}

impl NewOrder {
    pub fn new(
        customer_id: impl Into<String>,
        item_name: impl Into<String>,
        quantity: i64,
        total_price: f64,
    ) -> Self {
        Self {
            customer_id: customer_id.into(),
            item_name: item_name.into(),
            quantity,
            total_price,
        }
    }
}

/// An order as owned by the order service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub customer_id: String,
    pub item_name: String,
    pub quantity: u32,
    pub total_price: Money,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Validates the input and builds a PENDING order with a fresh id.
    pub fn create(input: NewOrder) -> Result<Self> {
        validation::non_empty("customer_id", &input.customer_id)?;
        validation::non_empty("item_name", &input.item_name)?;
        validation::positive("quantity", input.quantity as f64)?;
        validation::positive("total_price", input.total_price)?;

        let quantity = u32::try_from(input.quantity).map_err(|_| {
            DomainError::from(crate::ValidationError::OutOfRange {
                field: "quantity",
                value: input.quantity as f64,
                min: 1.0,
                max: u32::MAX as f64,
            })
        })?;
        let total_price = Money::from_decimal(input.total_price)
            .filter(Money::is_positive)
            .ok_or(crate::ValidationError::NotPositive {
                field: "total_price",
                value: input.total_price,
            })?;

        let now = Utc::now();
        Ok(Self {
            id: OrderId::new(),
            customer_id: input.customer_id.trim().to_string(),
            item_name: input.item_name.trim().to_string(),
            quantity,
            total_price,
            status: OrderStatus::Pending,
            created_at: now,
            updated_at: now,
        })
    }

    /// Applies a status transition, leaving the order untouched if it is rejected.
    pub fn transition(&mut self, next: OrderStatus) -> Result<()> {
        self.status = self.status.transition(next)?;
        self.updated_at = Utc::now();
        Ok(())
    }
}
