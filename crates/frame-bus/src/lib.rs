//! Topic-keyed message bus shared by the sidebar frame, the host page and the
//! extension's privileged process.
//!
//! The browser primitives underneath (`postMessage`, runtime messaging) are
//! untyped and fire-and-forget. This crate keeps that contract: a publish never
//! waits for a receiver, and every subscriber sees every message on its topic,
//! including traffic it does not care about.

use bytes::Bytes;
use thiserror::Error;
use tokio::sync::broadcast;

/// Messages posted by the host page to the sidebar frame.
pub const TOPIC_SIDEBAR_INBOUND: &str = "sidebar.inbound";
/// Messages posted by the sidebar frame to the host page.
pub const TOPIC_HOST_INBOUND: &str = "host.inbound";
/// Requests sent from the sidebar to the privileged process.
pub const TOPIC_EXTENSION_REQUEST: &str = "extension.request";
/// Replies sent from the privileged process back to the sidebar.
pub const TOPIC_EXTENSION_REPLY: &str = "extension.reply";

const TOPIC_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    pub topic: String,
    pub payload: Bytes,
}

#[derive(Debug, Error)]
pub enum BusError {
    #[error("bus channel closed")]
    Closed,
    #[error("no subscribers on topic {0}")]
    NoSubscribers(String),
}

pub type BusResult<T> = Result<T, BusError>;

pub trait Bus: Send + Sync {
    fn subscribe(&self, topic: &str) -> broadcast::Receiver<BusMessage>;
    fn publish(&self, topic: &str, payload: Bytes) -> BusResult<()>;
    /// Whether anything is listening on `topic` right now.
    fn has_subscribers(&self, topic: &str) -> bool;
}

/// In-memory bus for a single frame's lifetime, and for tests.
#[derive(Debug, Default)]
pub struct LocalBus {
    topics: parking_lot::RwLock<std::collections::HashMap<String, broadcast::Sender<BusMessage>>>,
    closed: parking_lot::RwLock<std::collections::HashSet<String>>,
}

impl LocalBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stops traffic on `topic`. Subscribers still receive what was already
    /// published, then see the channel close; later publishes fail with
    /// [`BusError::Closed`].
    pub fn close(&self, topic: &str) {
        self.closed.write().insert(topic.to_string());
        self.topics.write().remove(topic);
    }

    fn is_closed(&self, topic: &str) -> bool {
        self.closed.read().contains(topic)
    }

    fn sender_for(&self, topic: &str) -> broadcast::Sender<BusMessage> {
        if let Some(sender) = self.topics.read().get(topic) {
            return sender.clone();
        }
        let mut guard = self.topics.write();
        guard
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(TOPIC_CAPACITY).0)
            .clone()
    }
}

impl Bus for LocalBus {
    fn subscribe(&self, topic: &str) -> broadcast::Receiver<BusMessage> {
        if self.is_closed(topic) {
            return broadcast::channel(1).1;
        }
        self.sender_for(topic).subscribe()
    }

    fn publish(&self, topic: &str, payload: Bytes) -> BusResult<()> {
        if self.is_closed(topic) {
            return Err(BusError::Closed);
        }
        let sender = self.sender_for(topic);
        sender
            .send(BusMessage {
                topic: topic.to_string(),
                payload,
            })
            .map(|_| ())
            .map_err(|_| BusError::NoSubscribers(topic.to_string()))
    }

    fn has_subscribers(&self, topic: &str) -> bool {
        self.topics
            .read()
            .get(topic)
            .map(|sender| sender.receiver_count() > 0)
            .unwrap_or(false)
    }
}

impl<B: Bus + ?Sized> Bus for std::sync::Arc<B> {
    fn subscribe(&self, topic: &str) -> broadcast::Receiver<BusMessage> {
        (**self).subscribe(topic)
    }

    fn publish(&self, topic: &str, payload: Bytes) -> BusResult<()> {
        (**self).publish(topic, payload)
    }

    fn has_subscribers(&self, topic: &str) -> bool {
        (**self).has_subscribers(topic)
    }
}
