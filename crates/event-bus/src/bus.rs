//! Publish / subscribe contract.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::Result;
use crate::envelope::{Envelope, EventType};
use crate::events::EventPayload;

/// Upper bound on how long a single publish may take before it is reported
/// as a transport error.
pub const PUBLISH_TIMEOUT: Duration = Duration::from_secs(5);

/// Error returned by an event handler. Any error causes redelivery.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Result returned by an event handler.
pub type HandlerResult = std::result::Result<(), HandlerError>;

/// Callback invoked for each envelope delivered to a queue.
///
/// Returning `Ok` acknowledges the message (it is removed from the queue);
/// returning `Err` negatively acknowledges it with requeue, so it will be
/// delivered again.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, envelope: Envelope) -> HandlerResult;
}

struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> EventHandler for FnHandler<F>
where
    F: Fn(Envelope) -> Fut + Send + Sync,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    async fn handle(&self, envelope: Envelope) -> HandlerResult {
        (self.0)(envelope).await
    }
}

/// Wraps an async closure as an [`EventHandler`].
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn EventHandler>
where
    F: Fn(Envelope) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    Arc::new(FnHandler(f))
}

/// A topic-based publish/subscribe broker.
///
/// Delivery is at-least-once: consumers must tolerate duplicates. Every
/// `(service, routing key)` pair binds its own durable queue, so services
/// each receive their own copy of an event, while instances of one service
/// sharing a queue name compete for its messages.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publishes an envelope to the exchange, routed by its event type.
    ///
    /// Fails with a transport error if the broker does not accept the message
    /// within [`PUBLISH_TIMEOUT`]. Retrying is left to the caller.
    async fn publish(&self, envelope: Envelope) -> Result<()>;

    /// Declares a durable queue bound under `routing_key` and starts a
    /// dedicated receive loop feeding it to `handler`.
    ///
    /// Messages within one queue are handled sequentially, in receive order.
    async fn subscribe(
        &self,
        queue: &str,
        routing_key: &str,
        handler: Arc<dyn EventHandler>,
    ) -> Result<()>;
}

/// Convenience methods for publishing typed payloads.
#[async_trait]
pub trait EventBusExt: EventBus {
    /// Wraps `payload` in an envelope and publishes it under `event_type`.
    async fn publish_event<P>(&self, event_type: EventType, payload: &P) -> Result<()>
    where
        P: Serialize + Sync + ?Sized,
    {
        let envelope = Envelope::new(event_type, payload)?;
        self.publish(envelope).await
    }

    /// Publishes a payload under its own event type.
    async fn publish_payload<P: EventPayload>(&self, payload: &P) -> Result<()> {
        self.publish_event(P::EVENT_TYPE, payload).await
    }
}

// Blanket implementation for all EventBus implementations
impl<T: EventBus + ?Sized> EventBusExt for T {}
