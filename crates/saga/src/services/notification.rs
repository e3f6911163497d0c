//! Notification service: logs every event and pushes it to live viewers.

use std::sync::Arc;

use domain::{NewNotificationLog, NotificationLog};
use event_bus::{DomainEvent, Envelope, EventBus, EventType};
use hub::{Broadcaster, HubMessage};
use serde::Serialize;
use store::NotificationRepository;

use crate::error::Result;
use crate::handler::on_envelope;

/// Logs returned by [`NotificationService::recent_logs`] when no limit is given.
pub const DEFAULT_LOG_LIMIT: u32 = 50;

/// Queue the notification service binds for `event_type`.
pub fn queue_for(event_type: EventType) -> String {
    format!("notif.{}", event_type.as_str())
}

/// What live viewers receive for each event.
#[derive(Debug, Serialize)]
struct LiveEvent<'a> {
    event_type: &'a str,
    order_id: &'a str,
    message: &'a str,
    payload: &'a serde_json::Value,
}

#[derive(Clone)]
pub struct NotificationService {
    logs: Arc<dyn NotificationRepository>,
    broadcaster: Arc<dyn Broadcaster>,
}

impl NotificationService {
    pub fn new(logs: Arc<dyn NotificationRepository>, broadcaster: Arc<dyn Broadcaster>) -> Self {
        Self { logs, broadcaster }
    }

    /// Persists a log row for the event, then broadcasts it.
    ///
    /// Event types this build does not know are logged all the same.
    #[tracing::instrument(skip(self, envelope), fields(event_type = %envelope.event_type))]
    pub async fn process_event(&self, envelope: &Envelope) -> Result<NotificationLog> {
        let event = DomainEvent::from_envelope(envelope);
        if let DomainEvent::Unknown { .. } = event {
            tracing::debug!("event not recognised, logging raw payload");
        }
        let order_id = event
            .order_id()
            .map(|id| id.to_string())
            .or_else(|| envelope.order_id_hint().map(str::to_string))
            .unwrap_or_default();

        let raw = envelope.payload.to_string();
        let log = self
            .logs
            .append(NewNotificationLog::for_event(
                envelope.event_type.as_str(),
                order_id,
                raw,
            ))
            .await?;

        let live = LiveEvent {
            event_type: &log.event_type,
            order_id: &log.order_id,
            message: &log.message,
            payload: &envelope.payload,
        };
        match serde_json::to_string(&live) {
            Ok(json) => self.broadcaster.broadcast(HubMessage::from(json)),
            Err(e) => tracing::error!(error = %e, "failed to encode live event"),
        }

        tracing::info!(order_id = %log.order_id, message = %log.message, "notification recorded");
        Ok(log)
    }

    /// The latest logs, newest first.
    pub async fn recent_logs(&self, limit: Option<u32>) -> Result<Vec<NotificationLog>> {
        let limit = limit.filter(|l| *l > 0).unwrap_or(DEFAULT_LOG_LIMIT);
        Ok(self.logs.recent(limit).await?)
    }

    /// Every log of one order, newest first.
    pub async fn logs_for_order(&self, order_id: &str) -> Result<Vec<NotificationLog>> {
        Ok(self.logs.by_order(order_id).await?)
    }

    /// Binds one queue per event type.
    pub async fn start_listening(self: &Arc<Self>, bus: &dyn EventBus) -> Result<()> {
        for event_type in EventType::ALL {
            let queue = queue_for(event_type);
            let svc = Arc::clone(self);
            let handler = on_envelope(queue.clone(), move |envelope: Envelope| {
                let svc = Arc::clone(&svc);
                async move { svc.process_event(&envelope).await.map(drop) }
            });
            bus.subscribe(&queue, event_type.as_str(), handler).await?;
        }

        tracing::info!(bindings = EventType::ALL.len(), "notification service listening");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::OrderId;
    use event_bus::OrderCancelled;
    use std::sync::Mutex;
    use store::InMemoryNotificationRepository;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<HubMessage>>);

    impl Broadcaster for Recorder {
        fn broadcast(&self, message: HubMessage) {
            self.0.lock().unwrap().push(message);
        }
    }

    fn service() -> (NotificationService, Arc<Recorder>) {
        let recorder = Arc::new(Recorder::default());
        let svc = NotificationService::new(
            Arc::new(InMemoryNotificationRepository::new()),
            recorder.clone(),
        );
        (svc, recorder)
    }

    #[tokio::test]
    async fn test_event_is_logged_and_broadcast() {
        let (svc, recorder) = service();
        let order_id = OrderId::new();
        let envelope =
            Envelope::new(EventType::OrderCancelled, &OrderCancelled { order_id }).unwrap();

        let log = svc.process_event(&envelope).await.unwrap();
        assert_eq!(log.event_type, "order.cancelled");
        assert_eq!(log.order_id, order_id.to_string());
        assert_eq!(log.message, "Order cancelled");

        let sent = recorder.0.lock().unwrap().clone();
        assert_eq!(sent.len(), 1);
        let live: serde_json::Value = serde_json::from_str(&sent[0]).unwrap();
        assert_eq!(live["event_type"], "order.cancelled");
        assert_eq!(live["order_id"], order_id.to_string());
        assert_eq!(live["message"], "Order cancelled");
        assert_eq!(live["payload"]["order_id"], order_id.to_string());
    }

    #[tokio::test]
    async fn test_unknown_event_is_still_logged() {
        let (svc, _) = service();
        let envelope = Envelope {
            event_type: "order.teleported".to_string(),
            timestamp: chrono::Utc::now(),
            payload: serde_json::json!({"order_id": "abc", "to": "moon"}),
        };

        let log = svc.process_event(&envelope).await.unwrap();
        assert_eq!(log.event_type, "order.teleported");
        assert_eq!(log.order_id, "abc");
        assert_eq!(svc.logs_for_order("abc").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_oversized_order_id_is_cut_to_column_width() {
        let (svc, recorder) = service();
        let envelope = Envelope {
            event_type: "order.teleported".to_string(),
            timestamp: chrono::Utc::now(),
            payload: serde_json::json!({"order_id": "z".repeat(500)}),
        };

        let log = svc.process_event(&envelope).await.unwrap();
        assert_eq!(log.order_id, "z".repeat(domain::MAX_ORDER_ID_LEN));
        assert_eq!(recorder.0.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_recent_logs_default_limit_and_order() {
        let (svc, _) = service();
        for _ in 0..3 {
            let envelope = Envelope::new(
                EventType::OrderCancelled,
                &OrderCancelled {
                    order_id: OrderId::new(),
                },
            )
            .unwrap();
            svc.process_event(&envelope).await.unwrap();
        }

        let logs = svc.recent_logs(None).await.unwrap();
        assert_eq!(logs.len(), 3);
        assert!(logs[0].id > logs[2].id);
        assert_eq!(svc.recent_logs(Some(2)).await.unwrap().len(), 2);
    }

    #[test]
    fn test_queue_names() {
        assert_eq!(queue_for(EventType::PaymentSuccess), "notif.payment.success");
    }
}
