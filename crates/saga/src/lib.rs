//! Choreographed order-fulfillment saga.
//!
//! There is no coordinator. Each service binds its own durable queues and
//! moves only its own state machine, guarded by the current state so that
//! redelivered events are harmless:
//!
//! 1. Order creates a PENDING order and publishes `order.created`
//! 2. Inventory reserves stock (`stock.reserved` / `stock.failed`) while
//!    Payment opens a PENDING payment
//! 3. Confirming or failing the payment publishes `payment.success` /
//!    `payment.failed`
//! 4. Order moves to PAID or CANCELLED; Delivery opens a shipment; Inventory
//!    confirms or releases the reservation
//! 5. Notification logs every event and pushes it to live viewers
//!
//! Handlers requeue only transient store and bus failures. Anything that
//! would fail the same way again is logged and acknowledged.

pub mod error;
mod handler;
pub mod services;

pub use error::{Result, SagaError};
pub use services::{
    DeliveryService, InventoryService, NotificationService, OrderService, Outcome, PaymentService,
    ReserveOutcome,
};
