//! Payment state machine.

use chrono::{DateTime, Utc};
use common::{OrderId, PaymentId};
use serde::{Deserialize, Serialize};

use crate::error::{Result, ValidationError};
use crate::money::Money;
use crate::status::{Status, status_strings};

/// The status of a payment.
///
/// ```text
/// Pending ──┬──► Completed
///           └──► Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Completed,
    Failed,
}

status_strings!(PaymentStatus, "payment", {
    Pending => "PENDING",
    Completed => "COMPLETED",
    Failed => "FAILED",
});

impl Status for PaymentStatus {
    const ENTITY: &'static str = "payment";

    fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (PaymentStatus::Pending, PaymentStatus::Completed)
                | (PaymentStatus::Pending, PaymentStatus::Failed)
        )
    }

    fn as_str(&self) -> &'static str {
        self.name()
    }

    fn is_terminal(&self) -> bool {
        !matches!(self, PaymentStatus::Pending)
    }
}

/// Input for opening a payment.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPayment {
    pub order_id: OrderId,
    pub amount: Money,
}

impl NewPayment {
    /// Validates a payment request for an order. The amount must be positive.
    pub fn new(order_id: OrderId, amount: Money) -> std::result::Result<Self, ValidationError> {
        if !amount.is_positive() {
            return Err(ValidationError::NotPositive {
                field: "amount",
                value: amount.as_decimal(),
            });
        }
        Ok(Self { order_id, amount })
    }
}

/// A payment for exactly one order. The amount never changes after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub order_id: OrderId,
    pub amount: Money,
    pub status: PaymentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paid_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    /// Builds a PENDING payment from validated input and a store-assigned id.
    pub fn open(id: PaymentId, input: NewPayment) -> Self {
        let now = Utc::now();
        Self {
            id,
            order_id: input.order_id,
            amount: input.amount,
            status: PaymentStatus::Pending,
            paid_at: None,
            failure_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// PENDING -> COMPLETED, stamping `paid_at`.
    pub fn confirm(&mut self, at: DateTime<Utc>) -> Result<()> {
        self.status = self.status.transition(PaymentStatus::Completed)?;
        self.paid_at = Some(at);
        self.updated_at = at;
        Ok(())
    }

    /// PENDING -> FAILED, keeping the reason.
    pub fn fail(&mut self, reason: impl Into<String>, at: DateTime<Utc>) -> Result<()> {
        self.status = self.status.transition(PaymentStatus::Failed)?;
        self.failure_reason = Some(reason.into());
        self.updated_at = at;
        Ok(())
    }
}
