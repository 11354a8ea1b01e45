use std::sync::Arc;

use bridge_proto::{Envelope, MessageType};
use frame_bus::{Bus, TOPIC_SIDEBAR_INBOUND};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

/// Latest autofill progress as the UI shows it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusValue {
    Progress(String),
    Succeeded,
    Failed,
}

impl StatusValue {
    /// `None` for anything that is not an autofill status post.
    pub fn from_envelope(envelope: &Envelope) -> Option<Self> {
        match envelope.kind()? {
            MessageType::AutoApplyStatusUpdate => envelope
                .status_text()
                .map(|text| StatusValue::Progress(text.to_string())),
            MessageType::FillSuccess => Some(StatusValue::Succeeded),
            MessageType::FillFailed => Some(StatusValue::Failed),
            _ => None,
        }
    }

    pub fn label(&self) -> &str {
        match self {
            StatusValue::Progress(text) => text.as_str(),
            StatusValue::Succeeded => "Form filled successfully",
            StatusValue::Failed => "Form fill failed",
        }
    }
}

/// Last-write-wins projection of autofill posts. Nothing but the latest value
/// is kept.
#[derive(Clone)]
pub struct StatusRelay {
    tx: Arc<watch::Sender<Option<StatusValue>>>,
}

impl Default for StatusRelay {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusRelay {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<StatusValue>> {
        self.tx.subscribe()
    }

    pub fn current(&self) -> Option<StatusValue> {
        self.tx.borrow().clone()
    }

    /// Returns whether the envelope replaced the current status.
    pub fn apply(&self, envelope: &Envelope) -> bool {
        match StatusValue::from_envelope(envelope) {
            Some(status) => {
                debug!(target: "bridge.status", status = status.label(), "autofill status");
                self.tx.send_replace(Some(status));
                true
            }
            None => false,
        }
    }

    pub fn spawn<B: Bus + ?Sized>(&self, bus: &B) -> JoinHandle<()> {
        let mut rx = bus.subscribe(TOPIC_SIDEBAR_INBOUND);
        let relay = self.clone();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(msg) => match Envelope::decode(&msg.payload) {
                        Ok(envelope) => {
                            relay.apply(&envelope);
                        }
                        Err(err) => {
                            trace!(target: "bridge.status", error = %err, "ignoring undecodable post");
                        }
                    },
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(target: "bridge.status", skipped, "status listener lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use frame_bus::LocalBus;
    use serde_json::json;
    use std::time::Duration;

    #[test]
    fn result_overwrites_progress() {
        let relay = StatusRelay::new();
        assert!(relay.apply(&Envelope::status_update("Scanning...")));
        assert_eq!(
            relay.current(),
            Some(StatusValue::Progress("Scanning...".into()))
        );
        assert!(relay.apply(&Envelope::fill_success()));
        assert_eq!(relay.current(), Some(StatusValue::Succeeded));
    }

    #[test]
    fn unrelated_posts_leave_status_alone() {
        let relay = StatusRelay::new();
        relay.apply(&Envelope::fill_failed());
        assert!(!relay.apply(&Envelope::scrape_response(json!({ "title": "x" }))));
        assert!(!relay.apply(&Envelope::new(MessageType::AutoApplyStatusUpdate)));
        assert_eq!(relay.current(), Some(StatusValue::Failed));
    }

    #[test]
    fn flat_status_field_is_read() {
        let envelope = Envelope::from_value(json!({
            "type": "AUTO_APPLY_STATUS_UPDATE",
            "status": "Filling name"
        }))
        .unwrap();
        assert_eq!(
            StatusValue::from_envelope(&envelope),
            Some(StatusValue::Progress("Filling name".into()))
        );
    }

    #[tokio::test]
    async fn listener_publishes_latest_status() {
        let bus = Arc::new(LocalBus::new());
        let relay = StatusRelay::new();
        let mut rx = relay.subscribe();
        let listener = relay.spawn(bus.as_ref());

        for envelope in [Envelope::status_update("Scanning..."), Envelope::fill_success()] {
            bus.publish(TOPIC_SIDEBAR_INBOUND, Bytes::from(envelope.encode().unwrap()))
                .unwrap();
        }

        tokio::time::timeout(Duration::from_secs(1), async {
            loop {
                if *rx.borrow_and_update() == Some(StatusValue::Succeeded) {
                    break;
                }
                rx.changed().await.unwrap();
            }
        })
        .await
        .expect("status should settle on success");
        listener.abort();
    }
}
