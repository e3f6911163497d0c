//! Shipment state machine and courier location.

use chrono::{DateTime, Utc};
use common::{OrderId, ShipmentId};
use serde::{Deserialize, Serialize};

use crate::error::{Result, ValidationError};
use crate::status::{Status, status_strings};
use crate::validation;

/// The status of a shipment. Moves strictly forward, one step at a time.
///
/// ```text
/// PickingUp ──► OnTheWay ──► Delivered
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ShipmentStatus {
    #[default]
    PickingUp,
    OnTheWay,
    Delivered,
}

status_strings!(ShipmentStatus, "shipment", {
    PickingUp => "PICKING_UP",
    OnTheWay => "ON_THE_WAY",
    Delivered => "DELIVERED",
});

impl Status for ShipmentStatus {
    const ENTITY: &'static str = "shipment";

    fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (ShipmentStatus::PickingUp, ShipmentStatus::OnTheWay)
                | (ShipmentStatus::OnTheWay, ShipmentStatus::Delivered)
        )
    }

    fn as_str(&self) -> &'static str {
        self.name()
    }

    fn is_terminal(&self) -> bool {
        matches!(self, ShipmentStatus::Delivered)
    }
}

/// A validated courier position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub long: f64,
}

impl Location {
    /// Where every shipment starts before tracking begins.
    pub const ORIGIN: Location = Location { lat: 0.0, long: 0.0 };

    pub fn new(lat: f64, long: f64) -> std::result::Result<Self, ValidationError> {
        validation::in_range("lat", lat, -90.0, 90.0)?;
        validation::in_range("long", long, -180.0, 180.0)?;
        Ok(Self { lat, long })
    }
}

/// Input for creating a shipment.
#[derive(Debug, Clone, PartialEq)]
pub struct NewShipment {
    pub order_id: OrderId,
    pub courier_name: String,
}

impl NewShipment {
    pub fn new(
        order_id: OrderId,
        courier_name: impl Into<String>,
    ) -> std::result::Result<Self, ValidationError> {
        let courier_name = courier_name.into();
        validation::non_empty("courier_name", &courier_name)?;
        Ok(Self {
            order_id,
            courier_name: courier_name.trim().to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shipment {
    pub id: ShipmentId,
    pub order_id: OrderId,
    pub courier_name: String,
    pub current_lat: f64,
    pub current_long: f64,
    pub status: ShipmentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Shipment {
    /// Builds a PICKING_UP shipment at the origin.
    pub fn open(id: ShipmentId, input: NewShipment) -> Self {
        let now = Utc::now();
        Self {
            id,
            order_id: input.order_id,
            courier_name: input.courier_name,
            current_lat: Location::ORIGIN.lat,
            current_long: Location::ORIGIN.long,
            status: ShipmentStatus::PickingUp,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn location(&self) -> Location {
        Location {
            lat: self.current_lat,
            long: self.current_long,
        }
    }

    /// Advances the status, rejecting skips and reversals.
    pub fn advance(&mut self, next: ShipmentStatus) -> Result<()> {
        self.status = self.status.transition(next)?;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn move_to(&mut self, location: Location) {
        self.current_lat = location.lat;
        self.current_long = location.long;
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shipment() -> Shipment {
        let input = NewShipment::new(OrderId::new(), "Auto-Assigned").unwrap();
        Shipment::open(ShipmentId::new(1), input)
    }

    #[test]
    fn test_open_starts_picking_up_at_origin() {
        let s = shipment();
        assert_eq!(s.status, ShipmentStatus::PickingUp);
        assert_eq!(s.location(), Location::ORIGIN);
    }

    #[test]
    fn test_courier_is_required() {
        assert!(NewShipment::new(OrderId::new(), "").is_err());
    }

    #[test]
    fn test_forward_only() {
        let mut s = shipment();
        s.advance(ShipmentStatus::OnTheWay).unwrap();
        assert!(s.advance(ShipmentStatus::PickingUp).is_err());
        assert_eq!(s.status, ShipmentStatus::OnTheWay);
        s.advance(ShipmentStatus::Delivered).unwrap();
        assert!(s.status.is_terminal());
    }

    #[test]
    fn test_skipping_a_step_is_rejected() {
        let mut s = shipment();
        assert!(s.advance(ShipmentStatus::Delivered).is_err());
        assert_eq!(s.status, ShipmentStatus::PickingUp);
    }

    #[test]
    fn test_location_bounds() {
        assert!(Location::new(-6.2, 106.8).is_ok());
        assert!(Location::new(90.0, 180.0).is_ok());
        assert!(Location::new(91.0, 0.0).is_err());
        assert!(Location::new(0.0, -180.5).is_err());
    }

    #[test]
    fn test_status_wire_names() {
        assert_eq!(
            serde_json::to_string(&ShipmentStatus::OnTheWay).unwrap(),
            "\"ON_THE_WAY\""
        );
        assert_eq!(
            "PICKING_UP".parse::<ShipmentStatus>().unwrap(),
            ShipmentStatus::PickingUp
        );
    }
}
