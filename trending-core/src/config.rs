//! Runtime configuration.
//!
//! Loaded from an optional TOML file, then overlaid with `REDDIT_*`
//! environment variables. Every field has a default so an empty file is a
//! valid configuration.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const ENV_CLIENT_ID: &str = "REDDIT_CLIENT_ID";
pub const ENV_CLIENT_SECRET: &str = "REDDIT_CLIENT_SECRET";
pub const ENV_USER_AGENT: &str = "REDDIT_USER_AGENT";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrendingConfig {
    pub user_agent: String,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    /// Posts returned per fetch.
    pub top_n: usize,
    /// `limit` sent to the authenticated listing endpoint.
    pub oauth_fetch_limit: u32,
    pub min_request_interval_ms: u64,
    pub request_timeout_secs: u64,
}

impl Default for TrendingConfig {
    fn default() -> Self {
        Self {
            user_agent: concat!("trending/", env!("CARGO_PKG_VERSION")).to_string(),
            client_id: None,
            client_secret: None,
            top_n: 5,
            oauth_fetch_limit: 25,
            min_request_interval_ms: 1200,
            request_timeout_secs: 10,
        }
    }
}

impl TrendingConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
            path: path.display().to_string(),
        })?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    /// Overlays credentials and user agent from the process environment.
    pub fn apply_env(self) -> Self {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    pub fn apply_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(client_id) = lookup(ENV_CLIENT_ID) {
            self.client_id = Some(client_id);
        }
        if let Some(client_secret) = lookup(ENV_CLIENT_SECRET) {
            self.client_secret = Some(client_secret);
        }
        if let Some(user_agent) = lookup(ENV_USER_AGENT) {
            self.user_agent = user_agent;
        }
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.user_agent.trim().is_empty() {
            return Err(ConfigError::ValidationFailed {
                reason: "user_agent must not be empty".to_string(),
            });
        }
        if self.top_n == 0 {
            return Err(ConfigError::InvalidValue {
                field: "top_n".to_string(),
                value: self.top_n.to_string(),
            });
        }
        if self.min_request_interval_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "min_request_interval_ms".to_string(),
                value: self.min_request_interval_ms.to_string(),
            });
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "request_timeout_secs".to_string(),
                value: self.request_timeout_secs.to_string(),
            });
        }
        Ok(())
    }

    /// Client id and secret, when both are configured and non-empty.
    pub fn credentials(&self) -> Option<(String, String)> {
        match (&self.client_id, &self.client_secret) {
            (Some(id), Some(secret)) if !id.trim().is_empty() && !secret.trim().is_empty() => {
                Some((id.trim().to_string(), secret.trim().to_string()))
            }
            _ => None,
        }
    }

    pub fn min_request_interval(&self) -> Duration {
        Duration::from_millis(self.min_request_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
