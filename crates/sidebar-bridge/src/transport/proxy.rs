use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bridge_proto::{
    Envelope, ProxyReply, CONTENT_TYPE_JSON, HEADER_AUTHORIZATION, HEADER_CONTENT_TYPE,
};
use serde_json::Value;
use tracing::{debug, warn};

use super::channel::{PrivilegedChannel, ReplySlot};
use super::{ApiCall, ApiReply, Transport, TransportCapability, MALFORMED_REPLY_MESSAGE};
use crate::session::SessionStore;

/// Extension proxy client: sends each call to the privileged process as an
/// `API_REQUEST` and settles on its single reply.
pub struct ProxyTransport {
    channel: Arc<dyn PrivilegedChannel>,
    sessions: Arc<SessionStore>,
    base_url: String,
    reply_timeout: Option<Duration>,
}

impl ProxyTransport {
    pub fn new(
        channel: Arc<dyn PrivilegedChannel>,
        sessions: Arc<SessionStore>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            channel,
            sessions,
            base_url: base_url.into(),
            reply_timeout: None,
        }
    }

    /// Without a timeout a silent privileged process leaves the call pending.
    pub fn with_reply_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.reply_timeout = timeout;
        self
    }

    pub fn build_envelope(&self, call: &ApiCall) -> Envelope {
        let mut headers = BTreeMap::new();
        headers.insert(
            HEADER_CONTENT_TYPE.to_string(),
            CONTENT_TYPE_JSON.to_string(),
        );
        if !call.is_credential_exchange() {
            if let Some(token) = self.sessions.token() {
                headers.insert(HEADER_AUTHORIZATION.to_string(), format!("Bearer {token}"));
            }
        }
        Envelope::api_request(
            call.url(&self.base_url),
            call.method.as_str(),
            call.body.clone(),
            headers,
        )
    }

    fn settle(call: &ApiCall, raw: Option<Value>) -> ApiReply {
        let raw = match raw {
            Some(Value::Null) | None => return ApiReply::no_response(),
            Some(raw) => raw,
        };
        match ProxyReply::from_value(raw) {
            Ok(reply) if reply.success => ApiReply::new(reply.data.unwrap_or(Value::Null)),
            Ok(reply) => {
                debug!(target: "bridge.proxy", operation = %call.operation, error = ?reply.error, "privileged process reported failure");
                match reply.error {
                    Some(error) => ApiReply::error(error),
                    None => call.fallback_error(),
                }
            }
            Err(err) => {
                warn!(target: "bridge.proxy", error = %err, operation = %call.operation, "unreadable reply from privileged process");
                ApiReply::error(MALFORMED_REPLY_MESSAGE)
            }
        }
    }
}

#[async_trait]
impl Transport for ProxyTransport {
    async fn send(&self, call: ApiCall) -> ApiReply {
        let envelope = self.build_envelope(&call);
        let (slot, pending) = ReplySlot::pair();
        debug!(target: "bridge.proxy", method = %call.method, path = %call.path, "dispatching API_REQUEST");
        self.channel.dispatch(envelope, slot);

        let raw = match self.reply_timeout {
            Some(limit) => match tokio::time::timeout(limit, pending).await {
                Ok(raw) => raw,
                Err(_) => {
                    warn!(
                        target: "bridge.proxy",
                        operation = %call.operation,
                        timeout_ms = limit.as_millis() as u64,
                        "privileged process did not reply in time"
                    );
                    None
                }
            },
            None => pending.await,
        };
        Self::settle(&call, raw)
    }
}

impl TransportCapability for ProxyTransport {
    fn privileged_channel_reachable(&self) -> bool {
        self.channel.is_reachable()
    }
}
