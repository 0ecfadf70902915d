//! Notifications as handed to the client.
//!
//! Payload construction is up to the caller; a notification only carries the
//! routing fields that become request headers plus an already-built JSON
//! payload.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::DEFAULT_PUSH_TYPE;

/// When the gateway may stop trying to deliver a notification.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Expiration {
    /// Absolute UNIX timestamp in seconds. `0` means "deliver once or drop".
    Epoch(i64),
    /// Absolute point in time.
    At(DateTime<Utc>),
}

impl Expiration {
    /// Expiration as whole epoch seconds.
    pub fn as_epoch_seconds(&self) -> i64 {
        match self {
            Self::Epoch(secs) => *secs,
            Self::At(at) => at.timestamp(),
        }
    }
}

impl From<i64> for Expiration {
    fn from(secs: i64) -> Self {
        Self::Epoch(secs)
    }
}

impl From<DateTime<Utc>> for Expiration {
    fn from(at: DateTime<Utc>) -> Self {
        Self::At(at)
    }
}

/// Optional per-notification routing fields.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NotificationOptions {
    /// Topic; falls back to the client's default topic when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    /// Delivery deadline.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration: Option<Expiration>,
    /// Notifications sharing a collapse id replace each other on the device.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collapse_id: Option<String>,
}

/// A notification addressed to one device.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// Hex device token issued to the app by the platform.
    pub device_token: String,
    /// Value of the `apns-push-type` header.
    pub push_type: String,
    /// Delivery priority; the client sends `0` when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<u8>,
    /// Optional routing fields.
    #[serde(default)]
    pub options: NotificationOptions,
    payload: Value,
}

impl Notification {
    /// Create an `alert` notification for `device_token` carrying `payload`.
    pub fn new(device_token: impl Into<String>, payload: Value) -> Self {
        Self {
            device_token: device_token.into(),
            push_type: DEFAULT_PUSH_TYPE.to_string(),
            priority: None,
            options: NotificationOptions::default(),
            payload,
        }
    }

    /// Set the push type (`alert`, `background`, `voip`, ...).
    pub fn with_push_type(mut self, push_type: impl Into<String>) -> Self {
        self.push_type = push_type.into();
        self
    }

    /// Set the delivery priority.
    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Set the topic, overriding the client default.
    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.options.topic = Some(topic.into());
        self
    }

    /// Set the expiration, either epoch seconds or a `DateTime<Utc>`.
    pub fn with_expiration(mut self, expiration: impl Into<Expiration>) -> Self {
        self.options.expiration = Some(expiration.into());
        self
    }

    /// Set the collapse id.
    pub fn with_collapse_id(mut self, collapse_id: impl Into<String>) -> Self {
        self.options.collapse_id = Some(collapse_id.into());
        self
    }

    /// The payload exactly as it will be sent.
    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// Serialize the payload into the request body.
    pub fn to_body(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(&self.payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let n = Notification::new("abcd", json!({"aps": {"alert": "hi"}}));
        assert_eq!(n.push_type, "alert");
        assert_eq!(n.priority, None);
        assert_eq!(n.options, NotificationOptions::default());
    }

    #[test]
    fn test_expiration_normalizes_dates() {
        let at = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(Expiration::from(at).as_epoch_seconds(), 1_893_456_000);
        assert_eq!(Expiration::from(1_700_000_000_i64).as_epoch_seconds(), 1_700_000_000);
    }

    #[test]
    fn test_builder_sets_options() {
        let n = Notification::new("abcd", json!({}))
            .with_push_type("background")
            .with_priority(5)
            .with_topic("com.example.app")
            .with_expiration(60_i64)
            .with_collapse_id("score");
        assert_eq!(n.push_type, "background");
        assert_eq!(n.priority, Some(5));
        assert_eq!(n.options.topic.as_deref(), Some("com.example.app"));
        assert_eq!(n.options.expiration, Some(Expiration::Epoch(60)));
        assert_eq!(n.options.collapse_id.as_deref(), Some("score"));
    }

    #[test]
    fn test_body_is_payload_json() {
        let n = Notification::new("abcd", json!({"aps": {"badge": 3}}));
        let body = n.to_body().expect("serialize");
        assert_eq!(body, br#"{"aps":{"badge":3}}"#);
    }
}
