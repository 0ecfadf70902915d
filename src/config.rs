//! Configuration loading.
//!
//! A [`Config`] is read from a JSON file and then patched from `APNS_*`
//! environment variables, so deployments can keep the key path and team id
//! in a file and inject secrets or per-host overrides through the
//! environment.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::constants::{
    DEFAULT_CONNECTIONS, PRODUCTION_AUTHORITY, SANDBOX_AUTHORITY, TOKEN_ROTATION_INTERVAL,
};

/// Which gateway the client talks to.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Endpoint {
    /// Production gateway (default).
    #[default]
    Production,
    /// Development gateway for apps signed with a development profile.
    Sandbox,
    /// Any other gateway, e.g. `http://127.0.0.1:8443` for a local h2c mock.
    Custom(String),
}

impl Endpoint {
    /// `scheme://host:port` of the gateway.
    pub fn authority(&self) -> &str {
        match self {
            Self::Production => PRODUCTION_AUTHORITY,
            Self::Sandbox => SANDBOX_AUTHORITY,
            Self::Custom(url) => url,
        }
    }

    /// `production`/`prod`, `sandbox`/`development`/`dev`, or a URL.
    pub fn from_name(name: &str) -> Self {
        match name {
            "production" | "prod" => Self::Production,
            "sandbox" | "development" | "dev" => Self::Sandbox,
            other => Self::Custom(other.to_string()),
        }
    }
}

impl FromStr for Endpoint {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from_name(s))
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Production => write!(f, "production"),
            Self::Sandbox => write!(f, "sandbox"),
            Self::Custom(url) => write!(f, "{url}"),
        }
    }
}

fn default_connections() -> usize {
    DEFAULT_CONNECTIONS
}

fn default_token_rotation_secs() -> u64 {
    TOKEN_ROTATION_INTERVAL.as_secs()
}

/// Construction-time settings for a [`crate::PushClient`].
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Config {
    /// Team identifier, the `iss` claim of the provider token.
    pub team_id: String,
    /// Identifier of the signing key, the `kid` header of the provider token.
    pub key_id: String,
    /// Path to the PKCS#8 (`.p8`) signing key.
    #[serde(default)]
    pub key_path: PathBuf,
    /// Topic used when a notification does not name one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_topic: Option<String>,
    /// Gateway to connect to.
    #[serde(default)]
    pub endpoint: Endpoint,
    /// Header wait timeout per request, in milliseconds. No timeout if unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout_ms: Option<u64>,
    /// Connection-count hint. A client always uses exactly one session.
    #[serde(default = "default_connections")]
    pub connections: usize,
    /// Maximum provider token age in seconds.
    #[serde(default = "default_token_rotation_secs")]
    pub token_rotation_secs: u64,
}

impl Config {
    /// Minimal config for `team_id` and `key_id`, everything else default.
    pub fn new(team_id: impl Into<String>, key_id: impl Into<String>) -> Self {
        Self {
            team_id: team_id.into(),
            key_id: key_id.into(),
            key_path: PathBuf::new(),
            default_topic: None,
            endpoint: Endpoint::default(),
            request_timeout_ms: None,
            connections: DEFAULT_CONNECTIONS,
            token_rotation_secs: TOKEN_ROTATION_INTERVAL.as_secs(),
        }
    }

    /// Default config file location.
    ///
    /// Priority:
    /// 1. `APNS_CONFIG` env var
    /// 2. `<platform config dir>/apns-h2/config.json`
    pub fn default_path() -> Result<PathBuf> {
        if let Ok(path) = std::env::var("APNS_CONFIG") {
            return Ok(PathBuf::from(path));
        }
        Ok(dirs::config_dir()
            .context("Could not determine config directory")?
            .join("apns-h2")
            .join("config.json"))
    }

    /// Load from the default location, then apply environment overrides.
    ///
    /// A missing file is not an error as long as the environment supplies
    /// the required fields.
    pub fn load() -> Result<Self> {
        let path = Self::default_path()?;
        let mut config = if path.exists() {
            Self::load_from_file(&path)?
        } else {
            log::debug!("[Config] No config file at {}, using environment only", path.display());
            Self::new("", "")
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Parse a config file without applying overrides.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    /// Patch fields from `APNS_*` environment variables.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(team_id) = std::env::var("APNS_TEAM_ID") {
            self.team_id = team_id;
        }

        if let Ok(key_id) = std::env::var("APNS_KEY_ID") {
            self.key_id = key_id;
        }

        if let Ok(key_path) = std::env::var("APNS_KEY_PATH") {
            self.key_path = PathBuf::from(key_path);
        }

        if let Ok(topic) = std::env::var("APNS_TOPIC") {
            self.default_topic = Some(topic);
        }

        if let Ok(endpoint) = std::env::var("APNS_ENV") {
            self.endpoint = Endpoint::from_name(&endpoint);
        }

        if let Ok(timeout) = std::env::var("APNS_TIMEOUT_MS") {
            if let Ok(ms) = timeout.parse::<u64>() {
                self.request_timeout_ms = Some(ms);
            }
        }
    }

    /// Check that the fields a client cannot work without are present.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(!self.team_id.is_empty(), "team_id is required (or set APNS_TEAM_ID)");
        anyhow::ensure!(!self.key_id.is_empty(), "key_id is required (or set APNS_KEY_ID)");
        Ok(())
    }

    /// Header wait timeout as a `Duration`.
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }

    /// Token rotation interval as a `Duration`.
    pub fn token_rotation(&self) -> Duration {
        Duration::from_secs(self.token_rotation_secs)
    }

    /// Read the PEM signing key from [`Config::key_path`].
    pub fn read_signing_key(&self) -> Result<String> {
        anyhow::ensure!(
            !self.key_path.as_os_str().is_empty(),
            "key_path is required (or set APNS_KEY_PATH)"
        );
        std::fs::read_to_string(&self.key_path)
            .with_context(|| format!("Failed to read signing key {}", self.key_path.display()))
    }
}
