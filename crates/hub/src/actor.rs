//! The task that owns the client set.

use std::collections::HashMap;

use tokio::sync::{mpsc, oneshot};

use crate::HubMessage;
use crate::handle::ClientId;

pub(crate) struct Registration {
    pub id: ClientId,
    pub outbound: mpsc::Sender<HubMessage>,
    pub ack: oneshot::Sender<()>,
}

pub(crate) struct Inboxes {
    pub register: mpsc::Receiver<Registration>,
    pub unregister: mpsc::UnboundedReceiver<ClientId>,
    pub broadcast: mpsc::Receiver<HubMessage>,
    pub count: mpsc::Receiver<oneshot::Sender<usize>>,
}

pub(crate) struct HubActor {
    clients: HashMap<ClientId, mpsc::Sender<HubMessage>>,
    inboxes: Inboxes,
}

impl HubActor {
    pub fn new(inboxes: Inboxes) -> Self {
        Self {
            clients: HashMap::new(),
            inboxes,
        }
    }

    /// Runs until every handle has been dropped.
    pub async fn run(mut self) {
        tracing::debug!("hub started");
        loop {
            // Membership changes are handled before broadcasts so a client
            // whose registration was acknowledged sees every later message.
            tokio::select! {
                biased;

                Some(registration) = self.inboxes.register.recv() => {
                    self.register(registration);
                }
                Some(id) = self.inboxes.unregister.recv() => {
                    self.unregister(id);
                }
                Some(message) = self.inboxes.broadcast.recv() => {
                    self.broadcast(message);
                }
                Some(reply) = self.inboxes.count.recv() => {
                    let _ = reply.send(self.clients.len());
                }
                else => break,
            }
        }
        tracing::debug!(clients = self.clients.len(), "hub stopped");
    }

    fn register(&mut self, registration: Registration) {
        self.clients.insert(registration.id, registration.outbound);
        metrics::gauge!("hub_clients").set(self.clients.len() as f64);
        tracing::info!(client_id = %registration.id, clients = self.clients.len(), "viewer connected");
        let _ = registration.ack.send(());
    }

    fn unregister(&mut self, id: ClientId) {
        // Dropping the sender closes the client's outbound channel.
        if self.clients.remove(&id).is_some() {
            metrics::gauge!("hub_clients").set(self.clients.len() as f64);
            tracing::info!(client_id = %id, clients = self.clients.len(), "viewer disconnected");
        }
    }

    fn broadcast(&mut self, message: HubMessage) {
        metrics::counter!("hub_broadcasts_total").increment(1);
        self.clients.retain(|id, outbound| {
            match outbound.try_send(HubMessage::clone(&message)) {
                Ok(()) => true,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::warn!(client_id = %id, "viewer too slow, dropping");
                    metrics::counter!("hub_clients_dropped_total").increment(1);
                    false
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    tracing::debug!(client_id = %id, "viewer went away");
                    false
                }
            }
        });
        metrics::gauge!("hub_clients").set(self.clients.len() as f64);
    }
}
