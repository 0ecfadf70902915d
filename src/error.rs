//! Error type shared by the connection, the token signer and the client.

use std::time::Duration;

use thiserror::Error;

/// Boxed error used where the underlying cause comes from several crates.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur while delivering a notification.
///
/// Each variant is scoped to a single request except [`PushError::Connection`],
/// which only occurs while constructing a client.
#[derive(Error, Debug)]
pub enum PushError {
    /// The notification was rejected before any I/O took place.
    #[error("invalid notification: {0}")]
    Validation(String),
    /// The session to the gateway could not be established.
    #[error("failed to connect to {authority}: {source}")]
    Connection {
        /// Authority the client tried to reach.
        authority: String,
        /// Underlying TCP, TLS or HTTP/2 handshake failure.
        #[source]
        source: BoxError,
    },
    /// The request stream failed while waiting for headers or body.
    #[error("stream error: {0}")]
    Transport(#[from] hyper::Error),
    /// No response headers arrived within the configured window.
    #[error("no response headers within {0:?}")]
    Timeout(Duration),
    /// The response body is non-empty but not valid UTF-8 JSON.
    #[error("undecodable response body: {0}")]
    Decode(#[source] BoxError),
    /// Signing the provider token failed.
    #[error("provider token error: {0}")]
    Credential(String),
    /// The notification payload could not be serialized.
    #[error("payload serialization failed: {0}")]
    Payload(#[source] serde_json::Error),
    /// Client configuration is unusable (bad endpoint, unreadable key).
    #[error("configuration error: {0}")]
    Config(String),
}

impl PushError {
    /// Whether this error was raised before touching the network.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Whether the request timed out waiting for response headers.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}
