//! The privileged message channel and its reply handles.
//!
//! Runtime messaging allows at most one reply per send, so a pending call is
//! just the [`ReplySlot`] handed to whoever answers it. The slot is consumed by
//! the reply, and dropping it unanswered settles the call as "no response".
//!
//! [`BusChannel`] adapts the same contract to the frame bus, where any number
//! of messages can arrive on the reply topic. There each request carries a
//! correlation id and a pending map routes each reply to exactly one caller.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use bridge_proto::Envelope;
use bytes::Bytes;
use frame_bus::{Bus, TOPIC_EXTENSION_REPLY, TOPIC_EXTENSION_REQUEST};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};
use uuid::Uuid;

/// Single-use handle for answering one dispatched request.
#[derive(Debug)]
pub struct ReplySlot {
    tx: oneshot::Sender<Value>,
}

impl ReplySlot {
    pub fn pair() -> (ReplySlot, PendingReply) {
        let (tx, rx) = oneshot::channel();
        (ReplySlot { tx }, PendingReply { rx })
    }

    /// Delivers the reply. Returns `false` if the caller stopped waiting.
    pub fn reply(self, value: Value) -> bool {
        self.tx.send(value).is_ok()
    }
}

/// Caller side of a [`ReplySlot`]; resolves to `None` if the slot was dropped.
#[derive(Debug)]
pub struct PendingReply {
    rx: oneshot::Receiver<Value>,
}

impl Future for PendingReply {
    type Output = Option<Value>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx).map(Result::ok)
    }
}

pub trait PrivilegedChannel: Send + Sync {
    /// Capability probe: can a message sent now reach the privileged process?
    fn is_reachable(&self) -> bool;
    /// Sends `envelope` and hands `reply` to whatever answers it.
    fn dispatch(&self, envelope: Envelope, reply: ReplySlot);
}

type PendingMap = Arc<Mutex<HashMap<String, ReplySlot>>>;

/// Privileged channel carried over the frame bus.
pub struct BusChannel<B: Bus> {
    bus: Arc<B>,
    pending: PendingMap,
    reply_timeout: Duration,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl<B: Bus + 'static> BusChannel<B> {
    pub fn new(bus: Arc<B>, reply_timeout: Duration) -> Self {
        Self {
            bus,
            pending: Arc::new(Mutex::new(HashMap::new())),
            reply_timeout,
            pump: Mutex::new(None),
        }
    }

    pub fn pending_calls(&self) -> usize {
        self.pending.lock().len()
    }

    fn ensure_pump(&self) {
        let mut pump = self.pump.lock();
        if pump.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }
        let mut rx = self.bus.subscribe(TOPIC_EXTENSION_REPLY);
        let pending = Arc::clone(&self.pending);
        *pump = Some(tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(msg) => route_reply(&pending, &msg.payload),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(target: "bridge.proxy", skipped, "reply pump lagged; replies lost");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            // Dropping the slots settles every waiting caller.
            pending.lock().clear();
        }));
    }
}

fn route_reply(pending: &PendingMap, payload: &Bytes) {
    let value: Value = match serde_json::from_slice(payload) {
        Ok(value) => value,
        Err(err) => {
            trace!(target: "bridge.proxy", error = %err, "ignoring undecodable reply");
            return;
        }
    };
    let Some(id) = value.get("correlationId").and_then(Value::as_str) else {
        trace!(target: "bridge.proxy", "ignoring reply without correlation id");
        return;
    };
    let slot = pending.lock().remove(id);
    match slot {
        Some(slot) => {
            let id = id.to_string();
            if !slot.reply(value) {
                debug!(target: "bridge.proxy", correlation_id = %id, "caller gone before reply");
            }
        }
        None => {
            debug!(target: "bridge.proxy", correlation_id = %id, "reply for unknown or expired call");
        }
    }
}

impl<B: Bus + 'static> PrivilegedChannel for BusChannel<B> {
    fn is_reachable(&self) -> bool {
        self.bus.has_subscribers(TOPIC_EXTENSION_REQUEST)
    }

    fn dispatch(&self, mut envelope: Envelope, reply: ReplySlot) {
        self.ensure_pump();

        let id = Uuid::new_v4().to_string();
        envelope.correlation_id = Some(id.clone());
        let bytes = match envelope.encode() {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(target: "bridge.proxy", error = %err, "failed to encode request envelope");
                return;
            }
        };

        self.pending.lock().insert(id.clone(), reply);
        if let Err(err) = self.bus.publish(TOPIC_EXTENSION_REQUEST, Bytes::from(bytes)) {
            warn!(target: "bridge.proxy", error = %err, correlation_id = %id, "request not delivered");
            self.pending.lock().remove(&id);
            return;
        }

        let pending = Arc::clone(&self.pending);
        let timeout = self.reply_timeout;
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if pending.lock().remove(&id).is_some() {
                warn!(
                    target: "bridge.proxy",
                    correlation_id = %id,
                    timeout_ms = timeout.as_millis() as u64,
                    "no reply from privileged process; expiring call"
                );
            }
        });
    }
}

impl<B: Bus> Drop for BusChannel<B> {
    fn drop(&mut self) {
        if let Some(handle) = self.pump.lock().take() {
            handle.abort();
        }
    }
}
