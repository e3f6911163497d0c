//! In-process bus with AMQP topic-exchange semantics.
//!
//! Used by tests and by single-process deployments that run without a broker.
//! Queues are named and durable for the lifetime of the bus: messages published
//! before a consumer attaches are held until it does.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify, RwLock};

use crate::Result;
use crate::bus::{EventBus, EventHandler};
use crate::delivery::{Disposition, dispatch};
use crate::envelope::Envelope;

struct Message {
    body: Vec<u8>,
    redelivered: bool,
}

struct Queue {
    name: String,
    bindings: Mutex<Vec<String>>,
    messages: Mutex<VecDeque<Message>>,
    notify: Notify,
    // Messages popped but not yet settled. Incremented under the `messages`
    // lock so an idle check never sees an empty queue with work in between.
    in_flight: AtomicUsize,
}

impl Queue {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            bindings: Mutex::new(Vec::new()),
            messages: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            in_flight: AtomicUsize::new(0),
        }
    }

    async fn push_back(&self, message: Message) {
        self.messages.lock().await.push_back(message);
        self.notify.notify_one();
    }

    async fn push_front(&self, message: Message) {
        self.messages.lock().await.push_front(message);
        self.notify.notify_one();
    }

    async fn pop(&self) -> Option<Message> {
        let mut messages = self.messages.lock().await;
        let message = messages.pop_front()?;
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        Some(message)
    }

    async fn is_idle(&self) -> bool {
        let messages = self.messages.lock().await;
        messages.is_empty() && self.in_flight.load(Ordering::SeqCst) == 0
    }

    async fn run(self: Arc<Self>, handler: Arc<dyn EventHandler>) {
        loop {
            let Some(message) = self.pop().await else {
                self.notify.notified().await;
                continue;
            };

            let disposition =
                dispatch(&self.name, &message.body, message.redelivered, handler.as_ref()).await;

            if disposition == Disposition::Requeue {
                self.push_front(Message {
                    body: message.body,
                    redelivered: true,
                })
                .await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if disposition == Disposition::Requeue {
                // Give other tasks a chance to change the state the handler
                // is waiting on before the redelivery.
                tokio::task::yield_now().await;
            }
        }
    }
}

/// Matches a routing key against a binding pattern.
///
/// Words are separated by `.`; `*` matches exactly one word and `#` matches
/// zero or more words.
fn topic_matches(pattern: &str, routing_key: &str) -> bool {
    let pattern: Vec<&str> = pattern.split('.').collect();
    let key: Vec<&str> = routing_key.split('.').collect();
    matches_words(&pattern, &key)
}

fn matches_words(pattern: &[&str], key: &[&str]) -> bool {
    match pattern.split_first() {
        None => key.is_empty(),
        Some((&"#", rest)) => (0..=key.len()).any(|skip| matches_words(rest, &key[skip..])),
        Some((&word, rest)) => match key.split_first() {
            Some((&first, key_rest)) => {
                (word == "*" || word == first) && matches_words(rest, key_rest)
            }
            None => false,
        },
    }
}

/// An [`EventBus`] that routes messages between tasks of the current process.
#[derive(Clone, Default)]
pub struct InMemoryEventBus {
    queues: Arc<RwLock<HashMap<String, Arc<Queue>>>>,
}

impl InMemoryEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    async fn queue(&self, name: &str) -> Arc<Queue> {
        if let Some(queue) = self.queues.read().await.get(name) {
            return Arc::clone(queue);
        }
        let mut queues = self.queues.write().await;
        Arc::clone(
            queues
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(Queue::new(name))),
        )
    }

    /// Number of messages waiting in a queue, or `None` if it was never declared.
    pub async fn queue_depth(&self, name: &str) -> Option<usize> {
        let queue = self.queues.read().await.get(name).cloned()?;
        let depth = queue.messages.lock().await.len();
        Some(depth)
    }

    /// Waits until every queue is empty and no handler is running.
    ///
    /// Returns `false` if that did not happen within `timeout`.
    pub async fn wait_until_idle(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.is_idle().await {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    async fn is_idle(&self) -> bool {
        let queues: Vec<Arc<Queue>> = self.queues.read().await.values().cloned().collect();
        for queue in queues {
            if !queue.is_idle().await {
                return false;
            }
        }
        true
    }
}

#[async_trait]
impl EventBus for InMemoryEventBus {
    async fn publish(&self, envelope: Envelope) -> Result<()> {
        let body = envelope.to_bytes()?;
        let routing_key = envelope.routing_key();
        let queues: Vec<Arc<Queue>> = self.queues.read().await.values().cloned().collect();

        let mut routed = 0usize;
        for queue in queues {
            let bound = queue
                .bindings
                .lock()
                .await
                .iter()
                .any(|pattern| topic_matches(pattern, routing_key));
            if bound {
                queue
                    .push_back(Message {
                        body: body.clone(),
                        redelivered: false,
                    })
                    .await;
                routed += 1;
            }
        }

        if routed == 0 {
            tracing::debug!(routing_key = %routing_key, "no queue bound, message dropped");
        }
        metrics::counter!("bus_events_published_total").increment(1);
        Ok(())
    }

    async fn subscribe(
        &self,
        queue: &str,
        routing_key: &str,
        handler: Arc<dyn EventHandler>,
    ) -> Result<()> {
        let queue = self.queue(queue).await;
        {
            let mut bindings = queue.bindings.lock().await;
            if !bindings.iter().any(|b| b == routing_key) {
                bindings.push(routing_key.to_string());
            }
        }

        tracing::info!(queue = %queue.name, routing_key = %routing_key, "consumer started");
        tokio::spawn(queue.run(handler));
        Ok(())
    }
}
