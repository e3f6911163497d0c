//! Shared types for the logistics services.
//!
//! Services never share a database or an object graph: the only value that
//! correlates their independent state machines is the [`OrderId`].

mod page;
mod types;

pub use page::Page;
pub use types::{LogId, OrderId, PaymentId, ProductId, ReservationId, ShipmentId};
