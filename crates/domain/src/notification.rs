//! Append-only notification log.

use chrono::{DateTime, Utc};
use common::LogId;
use serde::{Deserialize, Serialize};

/// Width of the `event_type` column.
pub const MAX_EVENT_TYPE_LEN: usize = 50;
/// Width of the `order_id` column. Ids taken from unrecognised payloads are
/// cut to fit.
pub const MAX_ORDER_ID_LEN: usize = 100;

/// A log row about to be written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewNotificationLog {
    pub event_type: String,
    /// Empty when the event carried no order id.
    pub order_id: String,
    /// The raw event payload as JSON text.
    pub payload: String,
    pub message: String,
}

impl NewNotificationLog {
    /// Builds a log row with the human-readable message for its event type.
    pub fn for_event(
        event_type: impl Into<String>,
        order_id: impl Into<String>,
        payload: impl Into<String>,
    ) -> Self {
        let event_type = event_type.into();
        Self {
            message: human_message(&event_type),
            event_type: truncate_chars(event_type, MAX_EVENT_TYPE_LEN),
            order_id: truncate_chars(order_id.into(), MAX_ORDER_ID_LEN),
            payload: payload.into(),
        }
    }
}

fn truncate_chars(mut s: String, max: usize) -> String {
    if let Some((at, _)) = s.char_indices().nth(max) {
        s.truncate(at);
    }
    s
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationLog {
    pub id: LogId,
    pub event_type: String,
    pub order_id: String,
    pub payload: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// Best-effort description of an event for viewers.
pub fn human_message(event_type: &str) -> String {
    match event_type {
        "order.created" => "New order placed".to_string(),
        "order.cancelled" => "Order cancelled".to_string(),
        "payment.success" => "Payment succeeded".to_string(),
        "payment.failed" => "Payment failed".to_string(),
        "stock.reserved" => "Stock reserved".to_string(),
        "stock.failed" => "Stock unavailable".to_string(),
        "shipment.created" => "Shipment created".to_string(),
        "shipment.status_updated" => "Shipment status updated".to_string(),
        other => format!("Event: {other}"),
    }
}
