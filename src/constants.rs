//! Protocol and runtime constants for apns-h2.
//!
//! Centralizes the wire-contract strings and the default intervals so the
//! request builder, the token signer and the config loader agree on them.
//!
//! # Categories
//!
//! - **Endpoints**: Service authorities and request path segments
//! - **Headers**: Request header names of the wire contract
//! - **Credentials**: Provider token rotation
//! - **Defaults**: Values used when a notification leaves a field unset

use std::time::Duration;

// ============================================================================
// Endpoints
// ============================================================================

/// Production push gateway.
pub const PRODUCTION_AUTHORITY: &str = "https://api.push.apple.com:443";

/// Development (sandbox) push gateway.
pub const SANDBOX_AUTHORITY: &str = "https://api.sandbox.push.apple.com:443";

/// API version segment of every request path.
pub const API_VERSION: &str = "3";

/// Resource segment of every request path.
pub const DEVICE_RESOURCE: &str = "device";

// ============================================================================
// Headers
// ============================================================================

/// Push type header (`alert`, `background`, `voip`, ...).
pub const HEADER_PUSH_TYPE: &str = "apns-push-type";

/// Delivery priority header.
pub const HEADER_PRIORITY: &str = "apns-priority";

/// Topic header, usually the app bundle identifier.
pub const HEADER_TOPIC: &str = "apns-topic";

/// Expiration header, integer epoch seconds.
pub const HEADER_EXPIRATION: &str = "apns-expiration";

/// Collapse identifier header.
pub const HEADER_COLLAPSE_ID: &str = "apns-collapse-id";

/// Unique id the service assigns to each accepted notification.
pub const HEADER_APNS_ID: &str = "apns-id";

// ============================================================================
// Credentials
// ============================================================================

/// Maximum age of a cached provider token.
///
/// The service rejects tokens older than one hour; 55 minutes leaves room
/// for clock skew between us and the gateway.
pub const TOKEN_ROTATION_INTERVAL: Duration = Duration::from_secs(55 * 60);

/// JWS algorithm name of the provider token.
pub const TOKEN_ALGORITHM: &str = "ES256";

/// `reason` value the service returns for a stale provider token.
pub const EXPIRED_TOKEN_REASON: &str = "ExpiredProviderToken";

// ============================================================================
// Defaults
// ============================================================================

/// Priority sent when a notification does not set one.
pub const DEFAULT_PRIORITY: u8 = 0;

/// Push type used by [`crate::Notification::new`].
pub const DEFAULT_PUSH_TYPE: &str = "alert";

/// Nominal connection count reported by a default [`crate::Config`].
///
/// Only one session is ever opened; the value is accepted for configuration
/// compatibility.
pub const DEFAULT_CONNECTIONS: usize = 1;
