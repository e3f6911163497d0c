//! Persistence for the logistics services.
//!
//! Each service owns its own rows and reaches them only through its own
//! repository trait:
//! - [`OrderRepository`], [`ProductRepository`], [`ReservationRepository`],
//!   [`PaymentRepository`], [`ShipmentRepository`], [`NotificationRepository`]
//! - `InMemory*Repository`: one per service, with failure injection for tests
//! - [`PostgresStore`]: every trait over one `sqlx` pool

pub mod error;
pub mod memory;
pub mod postgres;
pub mod repository;

pub use error::{Result, StoreError};
pub use memory::{
    InMemoryInventoryRepository, InMemoryNotificationRepository, InMemoryOrderRepository,
    InMemoryPaymentRepository, InMemoryShipmentRepository,
};
pub use postgres::PostgresStore;
pub use repository::{
    NotificationRepository, OrderRepository, PaymentRepository, ProductRepository,
    ReservationRepository, ShipmentRepository,
};
