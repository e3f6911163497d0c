//! Event bus adapter for the order fulfillment choreography.
//!
//! Services never call each other. They publish [`Envelope`]s to a single
//! durable topic exchange, routed by event type, and consume them from their
//! own durable queues:
//!
//! - [`EventBus`]: publish / subscribe contract with at-least-once delivery
//! - [`InMemoryEventBus`]: in-process topic exchange with durable-queue semantics
//! - `AmqpEventBus`: RabbitMQ adapter (feature `amqp`)
//! - [`BackgroundPublisher`]: fire-and-forget publication off the request path

pub mod bus;
pub mod delivery;
pub mod envelope;
pub mod error;
pub mod events;
pub mod memory;
pub mod publisher;

#[cfg(feature = "amqp")]
pub mod amqp;

#[cfg(feature = "amqp")]
pub use amqp::{AmqpConfig, AmqpEventBus};
pub use bus::{
    EventBus, EventBusExt, EventHandler, HandlerError, HandlerResult, PUBLISH_TIMEOUT, handler_fn,
};
pub use delivery::Disposition;
pub use envelope::{EXCHANGE_NAME, Envelope, EventType, UnknownEventType};
pub use error::{BusError, Result};
pub use events::{
    DomainEvent, EventPayload, OrderCancelled, OrderCreated, PaymentFailed, PaymentSuccess,
    ShipmentCreated, ShipmentStatusUpdated, StockFailed, StockReserved,
};
pub use memory::InMemoryEventBus;
pub use publisher::BackgroundPublisher;
