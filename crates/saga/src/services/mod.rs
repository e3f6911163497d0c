//! The five services of the fulfillment saga.
//!
//! Each owns its own repository and reacts only to events; none calls
//! another. Every operation here is also what the HTTP layer calls.

pub mod delivery;
pub mod inventory;
pub mod notification;
pub mod order;
pub mod payment;

pub use delivery::DeliveryService;
pub use inventory::{InventoryService, ReserveOutcome};
pub use notification::NotificationService;
pub use order::{OrderService, Outcome};
pub use payment::PaymentService;
