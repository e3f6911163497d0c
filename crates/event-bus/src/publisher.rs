//! Fire-and-forget publishing.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::bus::EventBus;
use crate::envelope::Envelope;
use crate::events::EventPayload;

#[derive(Default)]
struct Tracker {
    in_flight: AtomicUsize,
    done: Notify,
}

/// Publishes events on background tasks so callers never wait on the broker.
///
/// Failures are logged and counted; nothing is retried. [`flush`] waits for
/// every publish started so far, which is what shutdown and tests rely on.
///
/// [`flush`]: BackgroundPublisher::flush
#[derive(Clone)]
pub struct BackgroundPublisher {
    bus: Arc<dyn EventBus>,
    tracker: Arc<Tracker>,
}

impl BackgroundPublisher {
    pub fn new(bus: Arc<dyn EventBus>) -> Self {
        Self {
            bus,
            tracker: Arc::new(Tracker::default()),
        }
    }

    /// The bus publishes go to.
    pub fn bus(&self) -> &Arc<dyn EventBus> {
        &self.bus
    }

    /// Publishes a typed payload in the background.
    pub fn spawn<P: EventPayload + 'static>(&self, payload: P) -> JoinHandle<()> {
        match Envelope::new(P::EVENT_TYPE, &payload) {
            Ok(envelope) => self.spawn_envelope(envelope),
            Err(e) => {
                tracing::error!(event_type = %P::EVENT_TYPE, error = %e, "failed to encode event");
                metrics::counter!("bus_publish_failures_total").increment(1);
                tokio::spawn(async {})
            }
        }
    }

    /// Publishes a prepared envelope in the background.
    pub fn spawn_envelope(&self, envelope: Envelope) -> JoinHandle<()> {
        let bus = Arc::clone(&self.bus);
        let tracker = Arc::clone(&self.tracker);
        tracker.in_flight.fetch_add(1, Ordering::SeqCst);

        tokio::spawn(async move {
            let event_type = envelope.event_type.clone();
            if let Err(e) = bus.publish(envelope).await {
                tracing::error!(event_type = %event_type, error = %e, "background publish failed");
                metrics::counter!("bus_publish_failures_total").increment(1);
            }
            if tracker.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
                tracker.done.notify_waiters();
            }
        })
    }

    /// Number of publishes still running.
    pub fn pending(&self) -> usize {
        self.tracker.in_flight.load(Ordering::SeqCst)
    }

    /// Waits until every publish started before this call has finished.
    pub async fn flush(&self) {
        loop {
            let done = self.tracker.done.notified();
            tokio::pin!(done);
            done.as_mut().enable();
            if self.tracker.in_flight.load(Ordering::SeqCst) == 0 {
                return;
            }
            done.await;
        }
    }
}
