use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::{ApiCall, ApiReply, Transport};
use crate::session::SessionStore;

/// Plain HTTP to the backend, for code running in an ordinary page context.
#[derive(Clone)]
pub struct DirectTransport {
    http: Client,
    base_url: String,
    sessions: Arc<SessionStore>,
}

impl DirectTransport {
    pub fn new(base_url: impl Into<String>, sessions: Arc<SessionStore>) -> Self {
        Self::with_client(Client::new(), base_url, sessions)
    }

    pub fn with_client(
        http: Client,
        base_url: impl Into<String>,
        sessions: Arc<SessionStore>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            sessions,
        }
    }

    /// Request interceptor: attaches whatever token the store holds right now.
    fn intercept(&self, request: RequestBuilder) -> RequestBuilder {
        match self.sessions.token() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn read_reply(call: &ApiCall, res: Response) -> ApiReply {
        let status = res.status();
        let text = match res.text().await {
            Ok(text) => text,
            Err(err) => {
                warn!(target: "bridge.direct", error = %err, operation = %call.operation, "failed to read response body");
                return call.fallback_error();
            }
        };

        if status.is_success() {
            if text.trim().is_empty() {
                return ApiReply::new(Value::Object(Map::new()));
            }
            return match serde_json::from_str::<Value>(&text) {
                Ok(value) => ApiReply::new(value),
                Err(_) => {
                    debug!(target: "bridge.direct", operation = %call.operation, "response body is not json; passing it through as text");
                    ApiReply::new(Value::String(text))
                }
            };
        }

        debug!(target: "bridge.direct", %status, operation = %call.operation, "backend rejected request");
        match serde_json::from_str::<Value>(&text) {
            Ok(body) if !is_blank(&body) => ApiReply::new(body),
            _ => call.fallback_error(),
        }
    }
}

fn is_blank(body: &Value) -> bool {
    match body {
        Value::Null => true,
        Value::String(text) => text.is_empty(),
        _ => false,
    }
}

#[async_trait]
impl Transport for DirectTransport {
    async fn send(&self, call: ApiCall) -> ApiReply {
        let mut request = self.http.request(call.method.clone(), call.url(&self.base_url));
        if let Some(body) = &call.body {
            request = request.json(body);
        }
        let request = self.intercept(request);

        match request.send().await {
            Ok(res) => Self::read_reply(&call, res).await,
            Err(err) => {
                warn!(target: "bridge.direct", error = %err, operation = %call.operation, "request failed");
                call.fallback_error()
            }
        }
    }
}
