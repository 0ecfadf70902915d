//! apns-h2 - token-authenticated push notifications over HTTP/2.
//!
//! This crate delivers JSON notifications to individual devices through a
//! push gateway speaking the APNs provider API. One client keeps one HTTP/2
//! session open and multiplexes every request over it, authenticating each
//! request with a cached ES256 provider token.
//!
//! # Architecture
//!
//! - **Connection** - One persistent HTTP/2 session; one stream per request
//! - **TokenSigner** - Signs, caches and invalidates the provider token
//! - **PushClient** - Builds requests from notifications, single and batch send
//!
//! # Example
//!
//! ```rust,no_run
//! use apns_h2::{Config, Notification, PushClient};
//! use serde_json::json;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = Config::load()?;
//! let client = PushClient::connect(&config).await?;
//!
//! let notification = Notification::new("a1b2c3d4e5f6", json!({"aps": {"alert": "Hello"}}))
//!     .with_topic("com.example.app");
//! let response = client.send(&notification).await?;
//! if response.is_expired_token() {
//!     client.invalidate_token();
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod connection;
pub mod constants;
pub mod error;
pub mod notification;
pub mod response;
pub mod token;

// Re-export commonly used types
pub use client::PushClient;
pub use config::{Config, Endpoint};
pub use connection::{Connection, RequestOptions};
pub use error::PushError;
pub use notification::{Expiration, Notification, NotificationOptions};
pub use response::Response;
pub use token::TokenSigner;
