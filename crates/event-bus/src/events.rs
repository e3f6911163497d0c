//! Event payloads and the typed view over an envelope.

use common::{OrderId, PaymentId, ProductId, ReservationId, ShipmentId};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::envelope::{Envelope, EventType};

/// A payload that is always published under one event type.
pub trait EventPayload: Serialize + DeserializeOwned + Send + Sync {
    /// The routing key this payload is published under.
    const EVENT_TYPE: EventType;
}

/// Emitted once an order has been durably created as PENDING.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCreated {
    pub order_id: OrderId,
    pub customer_id: String,
    pub item_name: String,
    pub quantity: u32,
    pub total_price: f64,
}

/// Emitted when the order service cancels an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCancelled {
    pub order_id: OrderId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentSuccess {
    pub order_id: OrderId,
    pub payment_id: PaymentId,
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentFailed {
    pub order_id: OrderId,
    pub payment_id: PaymentId,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockReserved {
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub quantity: u32,
    pub reservation_id: ReservationId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockFailed {
    pub order_id: OrderId,
    pub item_name: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShipmentCreated {
    pub order_id: OrderId,
    pub shipment_id: ShipmentId,
    pub courier_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShipmentStatusUpdated {
    pub order_id: OrderId,
    pub shipment_id: ShipmentId,
    pub status: String,
}

macro_rules! payload_type {
    ($($payload:ident => $event_type:ident),* $(,)?) => {
        $(
            impl EventPayload for $payload {
                const EVENT_TYPE: EventType = EventType::$event_type;
            }
        )*
    };
}

payload_type! {
    OrderCreated => OrderCreated,
    OrderCancelled => OrderCancelled,
    PaymentSuccess => PaymentSuccess,
    PaymentFailed => PaymentFailed,
    StockReserved => StockReserved,
    StockFailed => StockFailed,
    ShipmentCreated => ShipmentCreated,
    ShipmentStatusUpdated => ShipmentStatusUpdated,
}

/// Typed view over an envelope, keyed by event type.
///
/// Envelopes whose type is unknown, or whose payload does not match the shape
/// of their type, fall back to [`DomainEvent::Unknown`] carrying the raw
/// payload bytes so they can still be logged.
#[derive(Debug, Clone, PartialEq)]
pub enum DomainEvent {
    OrderCreated(OrderCreated),
    OrderCancelled(OrderCancelled),
    PaymentSuccess(PaymentSuccess),
    PaymentFailed(PaymentFailed),
    StockReserved(StockReserved),
    StockFailed(StockFailed),
    ShipmentCreated(ShipmentCreated),
    ShipmentStatusUpdated(ShipmentStatusUpdated),
    Unknown { event_type: String, raw: Vec<u8> },
}

impl DomainEvent {
    /// Decodes an envelope into its typed form.
    pub fn from_envelope(envelope: &Envelope) -> Self {
        let decoded = match envelope.kind() {
            Some(EventType::OrderCreated) => envelope.decode_payload().map(Self::OrderCreated),
            Some(EventType::OrderCancelled) => envelope.decode_payload().map(Self::OrderCancelled),
            Some(EventType::PaymentSuccess) => envelope.decode_payload().map(Self::PaymentSuccess),
            Some(EventType::PaymentFailed) => envelope.decode_payload().map(Self::PaymentFailed),
            Some(EventType::StockReserved) => envelope.decode_payload().map(Self::StockReserved),
            Some(EventType::StockFailed) => envelope.decode_payload().map(Self::StockFailed),
            Some(EventType::ShipmentCreated) => {
                envelope.decode_payload().map(Self::ShipmentCreated)
            }
            Some(EventType::ShipmentStatusUpdated) => {
                envelope.decode_payload().map(Self::ShipmentStatusUpdated)
            }
            None => return Self::unknown(envelope),
        };

        decoded.unwrap_or_else(|e| {
            tracing::debug!(event_type = %envelope.event_type, error = %e, "payload does not match its event type");
            Self::unknown(envelope)
        })
    }

    fn unknown(envelope: &Envelope) -> Self {
        Self::Unknown {
            event_type: envelope.event_type.clone(),
            raw: serde_json::to_vec(&envelope.payload).unwrap_or_default(),
        }
    }

    /// Returns the event type string.
    pub fn event_type(&self) -> &str {
        match self {
            DomainEvent::OrderCreated(_) => EventType::OrderCreated.as_str(),
            DomainEvent::OrderCancelled(_) => EventType::OrderCancelled.as_str(),
            DomainEvent::PaymentSuccess(_) => EventType::PaymentSuccess.as_str(),
            DomainEvent::PaymentFailed(_) => EventType::PaymentFailed.as_str(),
            DomainEvent::StockReserved(_) => EventType::StockReserved.as_str(),
            DomainEvent::StockFailed(_) => EventType::StockFailed.as_str(),
            DomainEvent::ShipmentCreated(_) => EventType::ShipmentCreated.as_str(),
            DomainEvent::ShipmentStatusUpdated(_) => EventType::ShipmentStatusUpdated.as_str(),
            DomainEvent::Unknown { event_type, .. } => event_type,
        }
    }

    /// Returns the order this event correlates to, when it can be determined.
    pub fn order_id(&self) -> Option<OrderId> {
        match self {
            DomainEvent::OrderCreated(p) => Some(p.order_id),
            DomainEvent::OrderCancelled(p) => Some(p.order_id),
            DomainEvent::PaymentSuccess(p) => Some(p.order_id),
            DomainEvent::PaymentFailed(p) => Some(p.order_id),
            DomainEvent::StockReserved(p) => Some(p.order_id),
            DomainEvent::StockFailed(p) => Some(p.order_id),
            DomainEvent::ShipmentCreated(p) => Some(p.order_id),
            DomainEvent::ShipmentStatusUpdated(p) => Some(p.order_id),
            DomainEvent::Unknown { raw, .. } => serde_json::from_slice::<serde_json::Value>(raw)
                .ok()?
                .get("order_id")?
                .as_str()?
                .parse()
                .ok(),
        }
    }
}
