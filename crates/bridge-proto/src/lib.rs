//! Message envelopes exchanged between the sidebar frame, the host page and
//! the extension's privileged process.
//!
//! Every post is a JSON object with a string `type` tag. Fields the bridge
//! does not know are kept in [`Envelope::extra`].

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// `source` tag carried by posts that originate in the sidebar dashboard.
pub const SOURCE_DASHBOARD_IFRAME: &str = "DASHBOARD_IFRAME";

pub const HEADER_CONTENT_TYPE: &str = "Content-Type";
pub const HEADER_AUTHORIZATION: &str = "Authorization";
pub const CONTENT_TYPE_JSON: &str = "application/json";

#[derive(Debug, Error)]
pub enum ProtoError {
    #[error("malformed envelope: {0}")]
    Malformed(String),
    #[error("envelope is missing a string `type` tag")]
    MissingType,
    #[error("failed to encode envelope: {0}")]
    Encode(String),
}

/// Protocol tags understood by the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    ApiRequest,
    ScrapeJobRequestFromDashboard,
    ScrapeJobResponse,
    StartFillFromIframe,
    AutoApplyStatusUpdate,
    FillSuccess,
    FillFailed,
}

impl MessageType {
    pub const ALL: [MessageType; 7] = [
        MessageType::ApiRequest,
        MessageType::ScrapeJobRequestFromDashboard,
        MessageType::ScrapeJobResponse,
        MessageType::StartFillFromIframe,
        MessageType::AutoApplyStatusUpdate,
        MessageType::FillSuccess,
        MessageType::FillFailed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MessageType::ApiRequest => "API_REQUEST",
            MessageType::ScrapeJobRequestFromDashboard => "SCRAPE_JOB_REQUEST_FROM_DASHBOARD",
            MessageType::ScrapeJobResponse => "SCRAPE_JOB_RESPONSE",
            MessageType::StartFillFromIframe => "START_FILL_FROM_IFRAME",
            MessageType::AutoApplyStatusUpdate => "AUTO_APPLY_STATUS_UPDATE",
            MessageType::FillSuccess => "FILL_SUCCESS",
            MessageType::FillFailed => "FILL_FAILED",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageType {
    type Err = ProtoError;

    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        MessageType::ALL
            .into_iter()
            .find(|kind| kind.as_str() == tag)
            .ok_or_else(|| ProtoError::Malformed(format!("unknown message type {tag}")))
    }
}

/// Wire envelope. Unknown top-level fields are kept in `extra` and written
/// back unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub r#type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    /// Only set by channels whose substrate can carry more than one reply.
    #[serde(
        rename = "correlationId",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub correlation_id: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Envelope {
    pub fn new(kind: MessageType) -> Self {
        Self {
            r#type: kind.as_str().to_string(),
            source: None,
            payload: None,
            headers: None,
            url: None,
            method: None,
            body: None,
            correlation_id: None,
            extra: Map::new(),
        }
    }

    pub fn api_request(
        url: impl Into<String>,
        method: impl Into<String>,
        body: Option<Value>,
        headers: BTreeMap<String, String>,
    ) -> Self {
        Self {
            url: Some(url.into()),
            method: Some(method.into()),
            body,
            headers: Some(headers),
            ..Self::new(MessageType::ApiRequest)
        }
    }

    pub fn scrape_request() -> Self {
        Self {
            source: Some(SOURCE_DASHBOARD_IFRAME.to_string()),
            ..Self::new(MessageType::ScrapeJobRequestFromDashboard)
        }
    }

    pub fn scrape_response(payload: Value) -> Self {
        Self {
            payload: Some(payload),
            ..Self::new(MessageType::ScrapeJobResponse)
        }
    }

    pub fn start_fill(profile: &FillProfile) -> Result<Self, ProtoError> {
        let profile =
            serde_json::to_value(profile).map_err(|err| ProtoError::Encode(err.to_string()))?;
        Ok(Self {
            source: Some(SOURCE_DASHBOARD_IFRAME.to_string()),
            payload: Some(serde_json::json!({ "profile": profile })),
            ..Self::new(MessageType::StartFillFromIframe)
        })
    }

    pub fn status_update(status: impl Into<String>) -> Self {
        Self {
            payload: Some(serde_json::json!({ "status": status.into() })),
            ..Self::new(MessageType::AutoApplyStatusUpdate)
        }
    }

    pub fn fill_success() -> Self {
        Self {
            payload: Some(Value::Object(Map::new())),
            ..Self::new(MessageType::FillSuccess)
        }
    }

    pub fn fill_failed() -> Self {
        Self {
            payload: Some(Value::Object(Map::new())),
            ..Self::new(MessageType::FillFailed)
        }
    }

    /// Decodes a raw post. Anything that is not an object with a string
    /// `type` is malformed; an unrecognized tag is not.
    pub fn decode(raw: &[u8]) -> Result<Self, ProtoError> {
        let value: Value =
            serde_json::from_slice(raw).map_err(|err| ProtoError::Malformed(err.to_string()))?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self, ProtoError> {
        let Value::Object(fields) = &value else {
            return Err(ProtoError::Malformed("expected a JSON object".into()));
        };
        if !matches!(fields.get("type"), Some(Value::String(_))) {
            return Err(ProtoError::MissingType);
        }
        serde_json::from_value(value).map_err(|err| ProtoError::Malformed(err.to_string()))
    }

    pub fn encode(&self) -> Result<Vec<u8>, ProtoError> {
        serde_json::to_vec(self).map_err(|err| ProtoError::Encode(err.to_string()))
    }

    /// The recognized protocol tag, or `None` for unrelated traffic.
    pub fn kind(&self) -> Option<MessageType> {
        self.r#type.parse().ok()
    }

    pub fn is(&self, kind: MessageType) -> bool {
        self.r#type == kind.as_str()
    }

    /// Status text of an `AUTO_APPLY_STATUS_UPDATE`, read from the payload or,
    /// for host scripts that post it flat, from the envelope itself.
    pub fn status_text(&self) -> Option<&str> {
        self.payload
            .as_ref()
            .and_then(|payload| payload.get("status"))
            .or_else(|| self.extra.get("status"))
            .and_then(Value::as_str)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .as_ref()
            .and_then(|headers| headers.get(name))
            .map(String::as_str)
    }
}

/// Reply from the privileged process to an `API_REQUEST`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxyReply {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(
        rename = "correlationId",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub correlation_id: Option<String>,
}

impl ProxyReply {
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            correlation_id: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            correlation_id: None,
        }
    }

    pub fn from_value(value: Value) -> Result<Self, ProtoError> {
        serde_json::from_value(value).map_err(|err| ProtoError::Malformed(err.to_string()))
    }
}

/// Profile handed to the host page when an autofill is started.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FillProfile {
    pub user_id: String,
    pub name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resume_url: Option<String>,
}
