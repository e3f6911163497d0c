//! Products and stock reservations.

use chrono::{DateTime, Utc};
use common::{OrderId, ProductId, ReservationId};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, Result, ValidationError};
use crate::status::{Status, status_strings};
use crate::validation;

/// The status of a stock reservation.
///
/// ```text
/// Reserved ──┬──► Confirmed
///            └──► Released
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReservationStatus {
    #[default]
    Reserved,
    Confirmed,
    Released,
}

status_strings!(ReservationStatus, "reservation", {
    Reserved => "RESERVED",
    Confirmed => "CONFIRMED",
    Released => "RELEASED",
});

impl Status for ReservationStatus {
    const ENTITY: &'static str = "reservation";

    fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (ReservationStatus::Reserved, ReservationStatus::Confirmed)
                | (ReservationStatus::Reserved, ReservationStatus::Released)
        )
    }

    fn as_str(&self) -> &'static str {
        self.name()
    }

    fn is_terminal(&self) -> bool {
        !matches!(self, ReservationStatus::Reserved)
    }
}

/// Input for registering a product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewProduct {
    pub name: String,
    pub stock: i64,
}

impl NewProduct {
    pub fn new(name: impl Into<String>, stock: i64) -> Self {
        Self {
            name: name.into(),
            stock,
        }
    }

    /// Checks the name and stock and returns the normalized values.
    pub fn validate(&self) -> std::result::Result<(String, u32), ValidationError> {
        validation::non_empty("name", &self.name)?;
        if self.stock < 0 {
            return Err(ValidationError::Negative {
                field: "stock",
                value: self.stock as f64,
            });
        }
        let stock = u32::try_from(self.stock).map_err(|_| ValidationError::OutOfRange {
            field: "stock",
            value: self.stock as f64,
            min: 0.0,
            max: u32::MAX as f64,
        })?;
        Ok((self.name.trim().to_string(), stock))
    }
}

/// A stocked product. Names are unique; stock is never negative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub stock: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Returns the stock left after taking `quantity`, or rejects the
    /// reservation if there is not enough.
    pub fn stock_after_reserving(&self, quantity: u32) -> Result<u32> {
        validation::positive("quantity", f64::from(quantity))?;
        self.stock
            .checked_sub(quantity)
            .ok_or_else(|| DomainError::InsufficientStock {
                product: self.name.clone(),
                requested: quantity,
                available: self.stock,
            })
    }
}

/// Input for recording a reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewReservation {
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub quantity: u32,
}

/// Stock held for one order. The quantity never changes after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockReservation {
    pub id: ReservationId,
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub quantity: u32,
    pub status: ReservationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StockReservation {
    /// Applies a status transition, leaving the reservation untouched if it is rejected.
    pub fn transition(&mut self, next: ReservationStatus) -> Result<()> {
        self.status = self.status.transition(next)?;
        self.updated_at = Utc::now();
        Ok(())
    }
}
