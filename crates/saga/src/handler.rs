//! Adapts typed service callbacks to bus handlers.

use std::future::Future;
use std::sync::Arc;

use event_bus::{Envelope, EventHandler, EventPayload, HandlerResult, handler_fn};

use crate::error::Result;

/// Builds a handler that decodes `P` and runs `f` on it.
///
/// Only retryable failures are handed back to the bus (and so requeued). A
/// payload that does not decode, or a failure that would fail the same way on
/// every redelivery, is logged and acknowledged.
pub(crate) fn on_event<P, F, Fut>(queue: &'static str, f: F) -> Arc<dyn EventHandler>
where
    P: EventPayload + 'static,
    F: Fn(P) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    let f = Arc::new(f);
    handler_fn(move |envelope: Envelope| {
        let f = Arc::clone(&f);
        async move {
            let payload = match envelope.decode_payload::<P>() {
                Ok(payload) => payload,
                Err(e) => {
                    tracing::error!(queue, error = %e, "malformed payload, dropping event");
                    return Ok(());
                }
            };
            settle(queue, f(payload).await)
        }
    })
}

/// Builds a handler that gets the whole envelope, for consumers that accept
/// any event type.
pub(crate) fn on_envelope<F, Fut>(queue: String, f: F) -> Arc<dyn EventHandler>
where
    F: Fn(Envelope) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    let queue: Arc<str> = queue.into();
    let f = Arc::new(f);
    handler_fn(move |envelope: Envelope| {
        let f = Arc::clone(&f);
        let queue = Arc::clone(&queue);
        async move { settle(&queue, f(envelope).await) }
    })
}

fn settle(queue: &str, outcome: Result<()>) -> HandlerResult {
    match outcome {
        Ok(()) => Ok(()),
        Err(e) if e.is_retryable() => Err(Box::new(e)),
        Err(e) => {
            tracing::warn!(queue, error = %e, "event rejected by service, dropping");
            Ok(())
        }
    }
}
