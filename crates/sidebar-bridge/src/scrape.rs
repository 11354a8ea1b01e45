//! Forwards scraped job postings from the host page to the backend, one at a
//! time.
//!
//! The host page may post the same `SCRAPE_JOB_RESPONSE` several times in a
//! burst (repeated clicks, duplicate content-script injections). Only the
//! first one that arrives while no extraction is running is forwarded; the
//! rest are dropped, not queued.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bridge_proto::{Envelope, MessageType};
use frame_bus::{Bus, TOPIC_SIDEBAR_INBOUND};
use serde_json::Value;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::api::ApiClient;
use crate::transport::{ApiReply, Transport};

/// Busy flag guarding the extraction call.
#[derive(Debug, Default)]
pub struct ScrapeLock {
    busy: AtomicBool,
}

impl ScrapeLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes the lock if it is free. The lock is held until the returned
    /// guard is dropped.
    pub fn try_acquire(self: &Arc<Self>) -> Option<ScrapeGuard> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| ScrapeGuard {
                lock: Arc::clone(self),
            })
    }

    pub fn is_locked(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

#[derive(Debug)]
pub struct ScrapeGuard {
    lock: Arc<ScrapeLock>,
}

impl Drop for ScrapeGuard {
    fn drop(&mut self) {
        self.lock.busy.store(false, Ordering::Release);
    }
}

#[derive(Debug)]
pub enum ScrapeOutcome {
    /// Not a scrape response.
    Ignored,
    /// An extraction was already running.
    Dropped,
    /// The payload went to the backend; the handle resolves with its reply.
    Forwarded(JoinHandle<ApiReply>),
}

pub struct ScrapeCoordinator<T: Transport> {
    client: Arc<ApiClient<T>>,
    lock: Arc<ScrapeLock>,
}

impl<T: Transport> Clone for ScrapeCoordinator<T> {
    fn clone(&self) -> Self {
        Self {
            client: Arc::clone(&self.client),
            lock: Arc::clone(&self.lock),
        }
    }
}

impl<T: Transport + 'static> ScrapeCoordinator<T> {
    pub fn new(client: Arc<ApiClient<T>>) -> Self {
        Self {
            client,
            lock: Arc::new(ScrapeLock::new()),
        }
    }

    pub fn lock(&self) -> &Arc<ScrapeLock> {
        &self.lock
    }

    /// Takes the lock synchronously, so a second response delivered before the
    /// first extraction settles sees it held.
    pub fn handle(&self, envelope: &Envelope) -> ScrapeOutcome {
        if !envelope.is(MessageType::ScrapeJobResponse) {
            return ScrapeOutcome::Ignored;
        }
        let Some(guard) = self.lock.try_acquire() else {
            info!(target: "bridge.scrape", "scrape already in progress; ignoring");
            return ScrapeOutcome::Dropped;
        };

        let scraped = envelope.payload.clone().unwrap_or(Value::Null);
        let client = Arc::clone(&self.client);
        ScrapeOutcome::Forwarded(tokio::spawn(async move {
            let _guard = guard;
            let reply = client.extract_job(scraped).await;
            match reply.field("job") {
                Some(job) => info!(target: "bridge.scrape", job = %job, "job saved"),
                None => warn!(
                    target: "bridge.scrape",
                    reason = reply.message().unwrap_or_default(),
                    "job extraction failed"
                ),
            }
            reply
        }))
    }

    /// Registers the single listener for host posts on `sidebar.inbound`.
    ///
    /// When the topic closes, the listener finishes once the extraction it
    /// forwarded last has settled.
    pub fn spawn<B: Bus + ?Sized>(&self, bus: &B) -> JoinHandle<()> {
        let mut rx = bus.subscribe(TOPIC_SIDEBAR_INBOUND);
        let coordinator = self.clone();
        tokio::spawn(async move {
            let mut in_flight: Vec<JoinHandle<ApiReply>> = Vec::new();
            loop {
                match rx.recv().await {
                    Ok(msg) => match Envelope::decode(&msg.payload) {
                        Ok(envelope) => {
                            if let ScrapeOutcome::Forwarded(call) = coordinator.handle(&envelope) {
                                debug!(target: "bridge.scrape", "forwarded scrape response");
                                in_flight.retain(|call| !call.is_finished());
                                in_flight.push(call);
                            }
                        }
                        Err(err) => {
                            trace!(target: "bridge.scrape", error = %err, "ignoring undecodable post");
                        }
                    },
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(target: "bridge.scrape", skipped, "scrape listener lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            for call in in_flight {
                if let Err(err) = call.await {
                    warn!(target: "bridge.scrape", error = %err, "extraction task did not finish");
                }
            }
        })
    }
}
