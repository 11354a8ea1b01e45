//! Outbound API calls and the two ways they leave the sidebar.
//!
//! Both transports resolve every call with an [`ApiReply`]. Ordinary failures
//! (bad credentials, 404s, an unreachable backend, a silent extension) come
//! back as an error-shaped body such as `{"message": "Login Error"}`, so call
//! sites read the same object whichever route was taken.

use std::borrow::Cow;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub mod channel;
pub mod direct;
pub mod proxy;
pub mod selector;

pub use channel::{BusChannel, PendingReply, PrivilegedChannel, ReplySlot};
pub use direct::DirectTransport;
pub use proxy::ProxyTransport;
pub use reqwest::Method;
pub use selector::{Route, TransportSelector};

pub const LOGIN_PATH: &str = "/auth/login";
pub const SIGNUP_PATH: &str = "/auth/signup";

/// Message a proxied call settles with when the privileged process never answers.
pub const NO_RESPONSE_MESSAGE: &str = "No response from extension";
pub const MALFORMED_REPLY_MESSAGE: &str = "Malformed response from extension";

/// One logical request against the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiCall {
    pub method: Method,
    /// Path relative to the API base URL, including any query string.
    pub path: String,
    pub body: Option<Value>,
    /// Label used for the generic `"<operation> Error"` failure message.
    pub operation: Cow<'static, str>,
}

impl ApiCall {
    pub fn new(
        method: Method,
        path: impl Into<String>,
        operation: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            operation: operation.into(),
        }
    }

    pub fn get(path: impl Into<String>, operation: impl Into<Cow<'static, str>>) -> Self {
        Self::new(Method::GET, path, operation)
    }

    pub fn post(path: impl Into<String>, operation: impl Into<Cow<'static, str>>) -> Self {
        Self::new(Method::POST, path, operation)
    }

    pub fn put(path: impl Into<String>, operation: impl Into<Cow<'static, str>>) -> Self {
        Self::new(Method::PUT, path, operation)
    }

    pub fn patch(path: impl Into<String>, operation: impl Into<Cow<'static, str>>) -> Self {
        Self::new(Method::PATCH, path, operation)
    }

    pub fn delete(path: impl Into<String>, operation: impl Into<Cow<'static, str>>) -> Self {
        Self::new(Method::DELETE, path, operation)
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Login and signup run before a session exists and never carry one.
    pub fn is_credential_exchange(&self) -> bool {
        let path = self.path.split('?').next().unwrap_or_default();
        self.method == Method::POST && (path == LOGIN_PATH || path == SIGNUP_PATH)
    }

    pub fn fallback_error(&self) -> ApiReply {
        ApiReply::error(format!("{} Error", self.operation))
    }

    pub(crate) fn url(&self, base_url: &str) -> String {
        format!("{}{}", base_url.trim_end_matches('/'), self.path)
    }
}

#[derive(Debug, Error)]
pub enum ReplyError {
    #[error("{message}")]
    Rejected { message: String },
    #[error("reply field `{field}` is malformed: {reason}")]
    Malformed { field: String, reason: String },
}

/// Body a call resolved with: the backend's data, or an error-shaped object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApiReply(Value);

impl ApiReply {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self(serde_json::json!({ "message": message.into() }))
    }

    pub fn no_response() -> Self {
        Self::error(NO_RESPONSE_MESSAGE)
    }

    /// The `message` (or, for older endpoints, `error`) text, if any.
    pub fn message(&self) -> Option<&str> {
        self.0
            .get("message")
            .or_else(|| self.0.get("error"))
            .and_then(Value::as_str)
    }

    pub fn field(&self, key: &str) -> Option<&Value> {
        self.0.get(key).filter(|value| !value.is_null())
    }

    pub fn decode_field<T: DeserializeOwned>(&self, key: &str) -> Result<T, ReplyError> {
        let value = self.field(key).ok_or_else(|| ReplyError::Rejected {
            message: self
                .message()
                .map(str::to_string)
                .unwrap_or_else(|| format!("reply has no `{key}`")),
        })?;
        serde_json::from_value(value.clone()).map_err(|err| ReplyError::Malformed {
            field: key.to_string(),
            reason: err.to_string(),
        })
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }
}

impl From<Value> for ApiReply {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends `call` and resolves with whatever came back. Never fails.
    async fn send(&self, call: ApiCall) -> ApiReply;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    async fn send(&self, call: ApiCall) -> ApiReply {
        (**self).send(call).await
    }
}

/// Probe for whether the privileged message channel can be reached from the
/// current execution context.
pub trait TransportCapability: Send + Sync {
    fn privileged_channel_reachable(&self) -> bool;
}

impl<F> TransportCapability for F
where
    F: Fn() -> bool + Send + Sync,
{
    fn privileged_channel_reachable(&self) -> bool {
        (self)()
    }
}

/// Capability that can be flipped at runtime, e.g. once the extension
/// announces itself.
#[derive(Debug, Default)]
pub struct CapabilityFlag(AtomicBool);

impl CapabilityFlag {
    pub fn new(reachable: bool) -> Self {
        Self(AtomicBool::new(reachable))
    }

    pub fn set(&self, reachable: bool) {
        self.0.store(reachable, Ordering::SeqCst);
    }
}

impl TransportCapability for CapabilityFlag {
    fn privileged_channel_reachable(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
