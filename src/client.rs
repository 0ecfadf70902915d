//! Push client: turns notifications into authenticated requests.
//!
//! A `PushClient` owns one [`Connection`] and one [`TokenSigner`]. Each send
//! validates the notification, asks the signer for a current token, builds
//! the `/3/device/<token>` request and hands it to the connection.
//!
//! # Credential expiry
//!
//! The client never inspects replies to decide when the provider token is
//! stale. A caller that sees [`Response::is_expired_token`] (or learns of
//! expiry any other way) calls [`PushClient::invalidate_token`], or holds on
//! to [`PushClient::signer`] and calls `invalidate` there.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::future::join_all;
use http::header::{HeaderName, HeaderValue, AUTHORIZATION};
use http::{HeaderMap, Method};
use p256::ecdsa::SigningKey;

use crate::config::Config;
use crate::connection::{Connection, RequestOptions};
use crate::constants::{
    API_VERSION, DEFAULT_PRIORITY, DEVICE_RESOURCE, HEADER_COLLAPSE_ID, HEADER_EXPIRATION,
    HEADER_PRIORITY, HEADER_PUSH_TYPE, HEADER_TOPIC,
};
use crate::error::PushError;
use crate::notification::Notification;
use crate::response::Response;
use crate::token::TokenSigner;

/// Sends notifications over a single multiplexed session.
#[derive(Debug)]
pub struct PushClient {
    connection: Connection,
    signer: Arc<TokenSigner>,
    default_topic: Option<String>,
    request_timeout: Option<Duration>,
}

impl PushClient {
    /// Connect using the `.p8` key named by [`Config::key_path`].
    pub async fn connect(config: &Config) -> Result<Self, PushError> {
        let pem = config
            .read_signing_key()
            .map_err(|e| PushError::Config(format!("{e:#}")))?;
        let signer = TokenSigner::from_pkcs8_pem(
            &config.team_id,
            &config.key_id,
            &pem,
            config.token_rotation(),
        )?;
        Self::with_signer(config, signer).await
    }

    /// Connect using an already loaded signing key.
    pub async fn with_signing_key(config: &Config, key: SigningKey) -> Result<Self, PushError> {
        let signer = TokenSigner::new(
            &config.team_id,
            &config.key_id,
            key,
            config.token_rotation(),
        );
        Self::with_signer(config, signer).await
    }

    async fn with_signer(config: &Config, signer: TokenSigner) -> Result<Self, PushError> {
        if config.connections > 1 {
            log::debug!(
                "[Apns] {} connections requested; all streams share one HTTP/2 session",
                config.connections
            );
        }

        let connection = Connection::open(config.endpoint.authority()).await?;
        log::info!(
            "[Apns] Client ready (endpoint: {}, team: {})",
            config.endpoint,
            config.team_id
        );

        Ok(Self {
            connection,
            signer: Arc::new(signer),
            default_topic: config.default_topic.clone(),
            request_timeout: config.request_timeout(),
        })
    }

    /// Send one notification.
    ///
    /// A notification with an empty or non-alphanumeric device token fails
    /// with [`PushError::Validation`] before any network activity. Non-2xx replies
    /// are returned as `Ok` responses; inspect [`Response::status`].
    pub async fn send(&self, notification: &Notification) -> Result<Response, PushError> {
        validate(notification)?;

        let token = self.signer.token()?;
        let headers = build_headers(notification, &token, self.default_topic.as_deref())?;
        let body = notification.to_body().map_err(PushError::Payload)?;
        let path = device_path(&notification.device_token);

        let response = self
            .connection
            .request(
                &path,
                RequestOptions {
                    method: Some(Method::POST),
                    headers,
                    body: Some(Bytes::from(body)),
                    timeout: self.request_timeout,
                },
            )
            .await?;

        if response.is_success() {
            log::debug!(
                "[Apns] Delivered to {} (apns-id: {})",
                short_token(&notification.device_token),
                response.apns_id().unwrap_or("-")
            );
        } else {
            log::warn!(
                "[Apns] {} rejected: {} {} ({})",
                short_token(&notification.device_token),
                response.status,
                response.status_text,
                response.reason().unwrap_or("no reason")
            );
        }

        Ok(response)
    }

    /// Send every notification concurrently.
    ///
    /// The result has one entry per input, in input order. A failing
    /// notification does not affect the others.
    pub async fn send_many(&self, notifications: &[Notification]) -> Vec<Result<Response, PushError>> {
        join_all(notifications.iter().map(|n| self.send(n))).await
    }

    /// Discard the cached provider token; the next send signs a new one.
    pub fn invalidate_token(&self) {
        self.signer.invalidate();
    }

    /// Shared handle to the token signer, for layers that detect expiry.
    pub fn signer(&self) -> Arc<TokenSigner> {
        Arc::clone(&self.signer)
    }

    /// The underlying session.
    pub fn connection(&self) -> &Connection {
        &self.connection
    }
}

fn validate(notification: &Notification) -> Result<(), PushError> {
    let device_token = &notification.device_token;
    if device_token.is_empty() {
        return Err(PushError::Validation("device token is required".to_string()));
    }
    // The token becomes a bare path segment.
    if !device_token.bytes().all(|b| b.is_ascii_alphanumeric()) {
        return Err(PushError::Validation(format!(
            "device token {device_token:?} must contain only ASCII letters and digits"
        )));
    }
    Ok(())
}

/// Request path for a device: `/3/device/<device_token>`.
pub fn device_path(device_token: &str) -> String {
    format!("/{API_VERSION}/{DEVICE_RESOURCE}/{device_token}")
}

/// Request headers for `notification`, authorized with `token`.
///
/// `apns-topic` falls back to `default_topic` and is omitted if neither is
/// set. `apns-expiration` and `apns-collapse-id` appear only when the
/// notification sets them.
pub fn build_headers(
    notification: &Notification,
    token: &str,
    default_topic: Option<&str>,
) -> Result<HeaderMap, PushError> {
    let mut headers = HeaderMap::new();
    headers.insert(AUTHORIZATION, header_value(&format!("bearer {token}"))?);
    headers.insert(
        HeaderName::from_static(HEADER_PUSH_TYPE),
        header_value(&notification.push_type)?,
    );
    headers.insert(
        HeaderName::from_static(HEADER_PRIORITY),
        HeaderValue::from(u16::from(notification.priority.unwrap_or(DEFAULT_PRIORITY))),
    );

    let options = &notification.options;
    if let Some(topic) = options.topic.as_deref().or(default_topic) {
        headers.insert(HeaderName::from_static(HEADER_TOPIC), header_value(topic)?);
    }
    if let Some(expiration) = &options.expiration {
        headers.insert(
            HeaderName::from_static(HEADER_EXPIRATION),
            HeaderValue::from(expiration.as_epoch_seconds()),
        );
    }
    if let Some(collapse_id) = &options.collapse_id {
        headers.insert(
            HeaderName::from_static(HEADER_COLLAPSE_ID),
            header_value(collapse_id)?,
        );
    }

    Ok(headers)
}

fn header_value(value: &str) -> Result<HeaderValue, PushError> {
    HeaderValue::from_str(value)
        .map_err(|e| PushError::Validation(format!("invalid header value {value:?}: {e}")))
}

fn short_token(device_token: &str) -> &str {
    device_token.get(..8).unwrap_or(device_token)
}
