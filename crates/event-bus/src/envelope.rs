//! Wire envelope and routing keys.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::Result;

/// Name of the single durable topic exchange every service publishes to.
pub const EXCHANGE_NAME: &str = "logistic.events";

/// The event types exchanged between services.
///
/// The string form doubles as the routing key on the exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "order.created")]
    OrderCreated,
    #[serde(rename = "order.cancelled")]
    OrderCancelled,
    #[serde(rename = "payment.success")]
    PaymentSuccess,
    #[serde(rename = "payment.failed")]
    PaymentFailed,
    #[serde(rename = "stock.reserved")]
    StockReserved,
    #[serde(rename = "stock.failed")]
    StockFailed,
    /// Declared for viewers; not emitted by the saga yet.
    #[serde(rename = "shipment.created")]
    ShipmentCreated,
    /// Declared for viewers; not emitted by the saga yet.
    #[serde(rename = "shipment.status_updated")]
    ShipmentStatusUpdated,
}

impl EventType {
    /// Every known event type, in saga order.
    pub const ALL: [EventType; 8] = [
        EventType::OrderCreated,
        EventType::OrderCancelled,
        EventType::PaymentSuccess,
        EventType::PaymentFailed,
        EventType::StockReserved,
        EventType::StockFailed,
        EventType::ShipmentCreated,
        EventType::ShipmentStatusUpdated,
    ];

    /// Returns the routing key for this event type.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::OrderCreated => "order.created",
            EventType::OrderCancelled => "order.cancelled",
            EventType::PaymentSuccess => "payment.success",
            EventType::PaymentFailed => "payment.failed",
            EventType::StockReserved => "stock.reserved",
            EventType::StockFailed => "stock.failed",
            EventType::ShipmentCreated => "shipment.created",
            EventType::ShipmentStatusUpdated => "shipment.status_updated",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Returned when a routing key does not name a known event type.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown event type: {0}")]
pub struct UnknownEventType(pub String);

impl std::str::FromStr for EventType {
    type Err = UnknownEventType;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        EventType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| UnknownEventType(s.to_string()))
    }
}

/// The message published on the bus: `{type, timestamp, payload}`.
///
/// The type is kept as a plain string so that envelopes carrying event types
/// this build does not know about still decode and can be logged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Event type, also used as the routing key.
    #[serde(rename = "type")]
    pub event_type: String,

    /// When the event was created (RFC 3339 on the wire).
    pub timestamp: DateTime<Utc>,

    /// Type-specific payload, opaque to the bus.
    pub payload: serde_json::Value,
}

impl Envelope {
    /// Wraps a serializable payload in an envelope stamped with the current time.
    pub fn new<P: Serialize + ?Sized>(event_type: EventType, payload: &P) -> Result<Self> {
        Ok(Self {
            event_type: event_type.as_str().to_string(),
            timestamp: Utc::now(),
            payload: serde_json::to_value(payload)?,
        })
    }

    /// Returns the known event type, or `None` for foreign types.
    pub fn kind(&self) -> Option<EventType> {
        self.event_type.parse().ok()
    }

    /// Returns the routing key this envelope is published under.
    pub fn routing_key(&self) -> &str {
        &self.event_type
    }

    /// Decodes the payload into a typed structure.
    pub fn decode_payload<P: DeserializeOwned>(&self) -> Result<P> {
        Ok(serde_json::from_value(self.payload.clone())?)
    }

    /// Reads the `order_id` field of the payload, if it has one.
    pub fn order_id_hint(&self) -> Option<&str> {
        self.payload.get("order_id").and_then(|v| v.as_str())
    }

    /// Serializes the envelope to its wire form.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parses an envelope from its wire form.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
