use std::sync::Arc;

use bridge_proto::{Envelope, FillProfile};
use bytes::Bytes;
use frame_bus::{Bus, TOPIC_HOST_INBOUND};
use serde_json::Value;
use tracing::debug;

use crate::session::UserRef;
use crate::BridgeResult;

/// Builds the autofill profile from a stored profile record, falling back to
/// the signed-in user's name and email where the record has none.
pub fn fill_profile(user: &UserRef, stored: Option<&Value>) -> FillProfile {
    let text = |key: &str| {
        stored
            .and_then(|profile| profile.get(key))
            .and_then(Value::as_str)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    };
    FillProfile {
        user_id: user.user_id.clone(),
        name: text("name").unwrap_or_else(|| user.name.clone()),
        email: text("email").unwrap_or_else(|| user.email.clone()),
        phone: text("phone"),
        resume_url: text("resumeUrl"),
    }
}

/// Posts from the sidebar to the host page.
pub struct HostPublisher<B: Bus> {
    bus: Arc<B>,
}

impl<B: Bus> HostPublisher<B> {
    pub fn new(bus: Arc<B>) -> Self {
        Self { bus }
    }

    /// Asks the host page to scrape the posting it is showing. The answer
    /// arrives later as a `SCRAPE_JOB_RESPONSE` on the sidebar's inbound topic.
    pub fn request_scrape(&self) -> BridgeResult<()> {
        self.post(&Envelope::scrape_request())
    }

    pub fn start_fill(&self, profile: &FillProfile) -> BridgeResult<()> {
        self.post(&Envelope::start_fill(profile)?)
    }

    fn post(&self, envelope: &Envelope) -> BridgeResult<()> {
        let payload = Bytes::from(envelope.encode()?);
        self.bus.publish(TOPIC_HOST_INBOUND, payload)?;
        debug!(target: "bridge.host", kind = %envelope.r#type, "posted to host page");
        Ok(())
    }
}
