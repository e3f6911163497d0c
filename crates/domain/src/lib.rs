//! Domain layer for the logistics saga.
//!
//! This crate provides the entities each service owns and the rules that guard
//! them:
//! - [`Status`]: pure `(current, requested) -> next | reject` transition checks
//! - Order, Payment, StockReservation and Shipment state machines
//! - Input validation that runs before anything is persisted
//! - [`Money`] kept in cents

pub mod error;
pub mod inventory;
pub mod money;
pub mod notification;
pub mod order;
pub mod payment;
pub mod shipment;
pub mod status;
pub mod validation;

pub use error::{DomainError, Result, ValidationError};
pub use inventory::{NewProduct, NewReservation, Product, ReservationStatus, StockReservation};
pub use money::Money;
pub use notification::{
    MAX_EVENT_TYPE_LEN, MAX_ORDER_ID_LEN, NewNotificationLog, NotificationLog, human_message,
};
pub use order::{NewOrder, Order, OrderStatus};
pub use payment::{NewPayment, Payment, PaymentStatus};
pub use shipment::{Location, NewShipment, Shipment, ShipmentStatus};
pub use status::Status;
