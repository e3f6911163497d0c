use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::actor::{HubActor, Inboxes, Registration};
use crate::{DEFAULT_CLIENT_BUFFER, HubError, HubMessage, Result};

/// Identifies one connected viewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(u64);

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Anything that can push a message to live viewers.
pub trait Broadcaster: Send + Sync {
    fn broadcast(&self, message: HubMessage);
}

/// Cloneable access to the hub task.
#[derive(Clone)]
pub struct HubHandle {
    register: mpsc::Sender<Registration>,
    unregister: mpsc::UnboundedSender<ClientId>,
    broadcast: mpsc::Sender<HubMessage>,
    count: mpsc::Sender<oneshot::Sender<usize>>,
    next_id: Arc<AtomicU64>,
    client_buffer: usize,
}

impl HubHandle {
    /// Starts the hub task. It stops once every handle has been dropped.
    pub fn spawn(client_buffer: usize) -> (Self, JoinHandle<()>) {
        let (register_tx, register_rx) = mpsc::channel(64);
        let (unregister_tx, unregister_rx) = mpsc::unbounded_channel();
        let (broadcast_tx, broadcast_rx) = mpsc::channel(DEFAULT_CLIENT_BUFFER);
        let (count_tx, count_rx) = mpsc::channel(16);

        let actor = HubActor::new(Inboxes {
            register: register_rx,
            unregister: unregister_rx,
            broadcast: broadcast_rx,
            count: count_rx,
        });
        let task = tokio::spawn(actor.run());

        let handle = Self {
            register: register_tx,
            unregister: unregister_tx,
            broadcast: broadcast_tx,
            count: count_tx,
            next_id: Arc::new(AtomicU64::new(1)),
            client_buffer: client_buffer.max(1),
        };
        (handle, task)
    }

    /// Adds a client and returns its subscription once the hub has it.
    pub async fn register(&self) -> Result<Subscription> {
        let id = ClientId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (outbound, receiver) = mpsc::channel(self.client_buffer);
        let (ack, acked) = oneshot::channel();

        self.register
            .send(Registration { id, outbound, ack })
            .await
            .map_err(|_| HubError::Closed)?;
        acked.await.map_err(|_| HubError::Closed)?;

        Ok(Subscription {
            id,
            receiver,
            unregister: self.unregister.clone(),
        })
    }

    /// Removes a client and closes its channel. Unknown ids are ignored.
    pub fn unregister(&self, id: ClientId) {
        let _ = self.unregister.send(id);
    }

    /// Queues a message for every registered client.
    ///
    /// Never waits: fails with [`HubError::Full`] while the hub task has
    /// [`DEFAULT_CLIENT_BUFFER`] broadcasts still to fan out.
    pub fn send(&self, message: impl Into<HubMessage>) -> Result<()> {
        self.broadcast
            .try_send(message.into())
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => HubError::Full,
                mpsc::error::TrySendError::Closed(_) => HubError::Closed,
            })
    }

    /// Number of registered clients, as seen by the hub task.
    pub async fn client_count(&self) -> Result<usize> {
        let (reply, answer) = oneshot::channel();
        self.count.send(reply).await.map_err(|_| HubError::Closed)?;
        answer.await.map_err(|_| HubError::Closed)
    }
}

impl Broadcaster for HubHandle {
    fn broadcast(&self, message: HubMessage) {
        match self.send(message) {
            Ok(()) => {}
            Err(HubError::Full) => {
                metrics::counter!("hub_broadcasts_dropped_total").increment(1);
                tracing::warn!("hub inbox full, broadcast dropped");
            }
            Err(HubError::Closed) => tracing::warn!("hub closed, broadcast dropped"),
        }
    }
}

/// One viewer's outbound stream. Dropping it unregisters the viewer.
pub struct Subscription {
    id: ClientId,
    receiver: mpsc::Receiver<HubMessage>,
    unregister: mpsc::UnboundedSender<ClientId>,
}

impl Subscription {
    pub fn id(&self) -> ClientId {
        self.id
    }

    /// Next message, or `None` once the hub has dropped this client.
    pub async fn recv(&mut self) -> Option<HubMessage> {
        self.receiver.recv().await
    }

    /// Next message if one is already buffered.
    pub fn try_recv(&mut self) -> Option<HubMessage> {
        self.receiver.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let _ = self.unregister.send(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_id_displays_as_number() {
        assert_eq!(ClientId(42).to_string(), "42");
        assert_eq!(format!("viewer {}", ClientId(7)), "viewer 7");
    }
}
