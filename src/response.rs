//! Normalized gateway responses.

use http::{HeaderMap, StatusCode};
use serde_json::Value;

use crate::constants::{EXPIRED_TOKEN_REASON, HEADER_APNS_ID};

/// A fully buffered response from one request stream.
#[derive(Debug, Clone)]
pub struct Response {
    /// Numeric HTTP status.
    pub status: u16,
    /// Canonical reason phrase for [`Response::status`].
    pub status_text: String,
    /// Response headers. Lookups are case-insensitive and names may repeat.
    pub headers: HeaderMap,
    /// Parsed JSON body, `None` when the gateway sent no body.
    pub body: Option<Value>,
}

impl Response {
    /// Builds a response, deriving the status text from the code.
    pub fn new(status: u16, headers: HeaderMap, body: Option<Value>) -> Self {
        Self {
            status,
            status_text: status_text(status).to_string(),
            headers,
            body,
        }
    }

    /// Whether the gateway accepted the notification.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// The `reason` field of an error body, if any.
    pub fn reason(&self) -> Option<&str> {
        self.body.as_ref()?.get("reason")?.as_str()
    }

    /// The `apns-id` the gateway assigned to this notification.
    pub fn apns_id(&self) -> Option<&str> {
        self.headers.get(HEADER_APNS_ID)?.to_str().ok()
    }

    /// Whether the gateway rejected the provider token as too old.
    ///
    /// Callers that see this should invalidate the cached token
    /// (see [`crate::PushClient::invalidate_token`]) before the next send.
    pub fn is_expired_token(&self) -> bool {
        self.status == 403 && self.reason() == Some(EXPIRED_TOKEN_REASON)
    }
}

/// Canonical reason phrase for a status code, `"Unknown"` if there is none.
pub fn status_text(status: u16) -> &'static str {
    StatusCode::from_u16(status)
        .ok()
        .and_then(|code| code.canonical_reason())
        .unwrap_or("Unknown")
}
