//! In-process message bus with named topics and queue semantics.
//!
//! The transport is modeled as a minimal capability — declare, publish,
//! subscribe — so the stages never see what carries their messages. The
//! bundled [`InMemoryBus`] backs each topic with a bounded tokio mpsc
//! channel; a broker client implementing [`MessageBus`] can be swapped in
//! without touching stage logic.
//!
//! Delivery contract: `publish` returning `Ok` means the bus accepted the
//! payload, nothing more. A topic has at most one consumer, and messages
//! published before that consumer attaches are buffered and delivered once
//! it does — declaration is idempotent from both sides of a hand-off, so
//! startup order between a producer and its consumer does not matter.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::mpsc;

#[derive(Debug)]
pub enum BusError {
    /// Topic was never declared on this bus.
    UnknownTopic(String),
    /// Topic already has its single consumer attached.
    AlreadySubscribed(String),
    /// Consumer endpoint is gone; the payload was not enqueued.
    Closed(String),
}

impl std::fmt::Display for BusError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BusError::UnknownTopic(t) => write!(f, "Unknown topic: {}", t),
            BusError::AlreadySubscribed(t) => write!(f, "Topic already has a consumer: {}", t),
            BusError::Closed(t) => write!(f, "Topic closed: {}", t),
        }
    }
}

impl std::error::Error for BusError {}

/// Consumer endpoint for one topic.
///
/// Receiving removes the message from the topic queue immediately — the bus
/// never redelivers, whatever the caller then does with the payload.
#[derive(Debug)]
pub struct TopicReceiver {
    topic: String,
    rx: mpsc::Receiver<Vec<u8>>,
}

impl TopicReceiver {
    /// Wait for the next payload. Returns `None` once every publisher handle
    /// to the topic is gone and the queue has drained.
    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        self.rx.recv().await
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }
}

#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Create the topic if it does not exist. Idempotent; both the producing
    /// and consuming side of a hand-off call this on startup.
    async fn declare_topic(&self, topic: &str) -> Result<(), BusError>;

    /// Hand a payload to the bus. `Ok` is a local hand-off acknowledgment,
    /// not a delivery guarantee to any subscriber.
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), BusError>;

    /// Take the single consumer endpoint for a topic.
    async fn subscribe(&self, topic: &str) -> Result<TopicReceiver, BusError>;
}

struct Topic {
    tx: mpsc::Sender<Vec<u8>>,
    // Held until the consumer attaches; publishes buffer in the channel.
    pending_rx: Option<mpsc::Receiver<Vec<u8>>>,
}

/// Bus implementation for single-process deployments.
pub struct InMemoryBus {
    topics: Mutex<HashMap<String, Topic>>,
    capacity: usize,
}

impl InMemoryBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            topics: Mutex::new(HashMap::new()),
            capacity,
        }
    }
}

#[async_trait]
impl MessageBus for InMemoryBus {
    async fn declare_topic(&self, topic: &str) -> Result<(), BusError> {
        let mut topics = self.topics.lock().unwrap();
        if !topics.contains_key(topic) {
            let (tx, rx) = mpsc::channel(self.capacity);
            topics.insert(
                topic.to_string(),
                Topic {
                    tx,
                    pending_rx: Some(rx),
                },
            );
            log::debug!("📮 Declared topic: {}", topic);
        }
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), BusError> {
        // Clone the sender under the lock, send outside it.
        let tx = {
            let topics = self.topics.lock().unwrap();
            match topics.get(topic) {
                Some(t) => t.tx.clone(),
                None => return Err(BusError::UnknownTopic(topic.to_string())),
            }
        };

        tx.send(payload)
            .await
            .map_err(|_| BusError::Closed(topic.to_string()))
    }

    async fn subscribe(&self, topic: &str) -> Result<TopicReceiver, BusError> {
        let mut topics = self.topics.lock().unwrap();
        let entry = topics
            .get_mut(topic)
            .ok_or_else(|| BusError::UnknownTopic(topic.to_string()))?;

        match entry.pending_rx.take() {
            Some(rx) => Ok(TopicReceiver {
                topic: topic.to_string(),
                rx,
            }),
            None => Err(BusError::AlreadySubscribed(topic.to_string())),
        }
    }
}
