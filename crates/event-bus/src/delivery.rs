//! Per-delivery acknowledgement policy shared by every bus implementation.

use tracing::Instrument;

use crate::bus::EventHandler;
use crate::envelope::Envelope;

/// What the receive loop does with a message once its handler has run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Handler succeeded: the message is permanently removed.
    Ack,
    /// Handler failed: the message goes back to the queue for redelivery.
    ///
    /// There is no retry cap and no backoff, so a message that always fails
    /// is redelivered for as long as the consumer runs.
    Requeue,
    /// The body is not a valid envelope and can never succeed: dropped.
    Reject,
}

impl Disposition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Disposition::Ack => "ack",
            Disposition::Requeue => "requeue",
            Disposition::Reject => "reject",
        }
    }
}

/// Decodes one delivery and runs the handler on it.
pub async fn dispatch(
    queue: &str,
    body: &[u8],
    redelivered: bool,
    handler: &dyn EventHandler,
) -> Disposition {
    let disposition = match Envelope::from_bytes(body) {
        Ok(envelope) => {
            let span = tracing::info_span!(
                "bus.consume",
                queue = %queue,
                event_type = %envelope.event_type,
                redelivered
            );
            async {
                tracing::debug!("event received");
                match handler.handle(envelope).await {
                    Ok(()) => {
                        tracing::debug!("event processed");
                        Disposition::Ack
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "handler failed, requeueing");
                        Disposition::Requeue
                    }
                }
            }
            .instrument(span)
            .await
        }
        Err(e) => {
            tracing::error!(queue = %queue, error = %e, "failed to decode envelope, rejecting");
            Disposition::Reject
        }
    };

    metrics::counter!("bus_deliveries_total", "outcome" => disposition.as_str()).increment(1);
    disposition
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::handler_fn;
    use crate::envelope::EventType;
    use serde_json::json;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn body() -> Vec<u8> {
        Envelope::new(EventType::OrderCancelled, &json!({"order_id": "x"}))
            .unwrap()
            .to_bytes()
            .unwrap()
    }

    #[tokio::test]
    async fn test_success_acks() {
        let handler = handler_fn(|_| async { Ok(()) });
        let d = dispatch("q", &body(), false, handler.as_ref()).await;
        assert_eq!(d, Disposition::Ack);
    }

    #[tokio::test]
    async fn test_handler_error_requeues() {
        let handler = handler_fn(|_| async { Err("store unavailable".into()) });
        let d = dispatch("q", &body(), false, handler.as_ref()).await;
        assert_eq!(d, Disposition::Requeue);
    }

    #[tokio::test]
    async fn test_garbage_is_rejected_without_calling_handler() {
        let called = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&called);
        let handler = handler_fn(move |_| {
            flag.store(true, Ordering::SeqCst);
            async { Ok(()) }
        });
        let d = dispatch("q", b"{{{", false, handler.as_ref()).await;
        assert_eq!(d, Disposition::Reject);
        assert!(!called.load(Ordering::SeqCst));
    }
}
