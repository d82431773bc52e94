// Live channel configuration file.
//
// Location: `~/.sherpa/live.toml`. Session tokens are never stored here;
// they are passed to `connect` by whoever owns the session.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::channel::backoff::ReconnectPolicy;

/// Environment variable that overrides `api_url`.
pub const API_URL_ENV: &str = "SHERPA_API_URL";

pub const DEFAULT_API_URL: &str = "http://localhost:3001";
pub const DEFAULT_WS_PATH: &str = "/api/ws";
pub const DEFAULT_TOKEN_PARAM: &str = "token";

/// Root directory for Sherpa client state: `~/.sherpa/`.
pub fn config_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".sherpa"))
}

/// Path to the live channel config: `~/.sherpa/live.toml`.
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("live.toml"))
}

/// Connection settings for the live channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct LiveConfig {
    /// REST base URL; the live endpoint is derived from it.
    pub api_url: String,
    /// Path of the push endpoint on the API host.
    pub ws_path: String,
    /// Query parameter carrying the bearer token.
    pub token_param: String,
    pub reconnect: ReconnectConfig,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.into(),
            ws_path: DEFAULT_WS_PATH.into(),
            token_param: DEFAULT_TOKEN_PARAM.into(),
            reconnect: ReconnectConfig::default(),
        }
    }
}

/// Reconnect backoff bounds, in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ReconnectConfig {
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self { initial_delay_ms: 1_000, max_delay_ms: 30_000 }
    }
}

impl LiveConfig {
    /// Load from `~/.sherpa/live.toml`, then apply environment overrides.
    /// Falls back to defaults if the file doesn't exist or can't be parsed.
    pub fn load() -> Self {
        let mut config =
            config_path().and_then(|p| Self::load_from(&p).ok()).unwrap_or_default();
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config
    }

    /// Load from a specific path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// Save to a specific path (creates parent directories).
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(API_URL_ENV).filter(|value| !value.trim().is_empty()) {
            self.api_url = url;
        }
    }

    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy::new(
            Duration::from_millis(self.reconnect.initial_delay_ms),
            Duration::from_millis(self.reconnect.max_delay_ms),
        )
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("config serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}
